use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EnergyUnit {
    #[default]
    #[serde(rename = "eV")]
    ElectronVolt,
    #[serde(rename = "meV")]
    MilliElectronVolt,
    #[serde(rename = "Ry")]
    Rydberg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LengthUnit {
    #[default]
    #[serde(rename = "Ang")]
    Angstrom,
    #[serde(rename = "Bohr")]
    Bohr,
}

static ENERGY_UNITS: phf::Map<&'static str, EnergyUnit> = phf_map! {
    "eV" => EnergyUnit::ElectronVolt,
    "e" => EnergyUnit::ElectronVolt,
    "meV" => EnergyUnit::MilliElectronVolt,
    "m" => EnergyUnit::MilliElectronVolt,
    "Ry" => EnergyUnit::Rydberg,
    "r" => EnergyUnit::Rydberg,
};

static LENGTH_UNITS: phf::Map<&'static str, LengthUnit> = phf_map! {
    "Ang" => LengthUnit::Angstrom,
    "Angstrom" => LengthUnit::Angstrom,
    "a" => LengthUnit::Angstrom,
    "Bohr" => LengthUnit::Bohr,
    "b" => LengthUnit::Bohr,
};

impl EnergyUnit {
    /// Single-letter tag used in exchange files.
    pub fn tag(&self) -> char {
        match self {
            EnergyUnit::ElectronVolt => 'e',
            EnergyUnit::MilliElectronVolt => 'm',
            EnergyUnit::Rydberg => 'r',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EnergyUnit::ElectronVolt => "eV",
            EnergyUnit::MilliElectronVolt => "meV",
            EnergyUnit::Rydberg => "Ry",
        }
    }
}

impl LengthUnit {
    pub fn tag(&self) -> char {
        match self {
            LengthUnit::Angstrom => 'a',
            LengthUnit::Bohr => 'b',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LengthUnit::Angstrom => "Ang",
            LengthUnit::Bohr => "Bohr",
        }
    }
}

impl FromStr for EnergyUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ENERGY_UNITS
            .get(s.trim())
            .copied()
            .ok_or_else(|| format!("unknown energy unit '{}'", s))
    }
}

impl FromStr for LengthUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LENGTH_UNITS
            .get(s.trim())
            .copied()
            .ok_or_else(|| format!("unknown length unit '{}'", s))
    }
}

impl fmt::Display for EnergyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
