use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use grogu::core::contour::ContourParams;
use grogu::core::io::magnopy::MagnopyOptions;
use grogu::core::models::entity::{EntitySpec, ShellSelection};
use grogu::core::models::pair::PairSpec;
use grogu::engine::config::{
    self as core_config, AtomSelector, EntityRequest, EntityTemplate, ExchangeConfig,
    ReferenceOrientation, SystemSetup,
};
use nalgebra::Vector3;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// `"All"` or a list of angular momenta.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum PartialShell {
    Keyword(String),
    Channels(Vec<usize>),
}

impl TryFrom<PartialShell> for ShellSelection {
    type Error = CliError;

    fn try_from(p: PartialShell) -> Result<Self> {
        match p {
            PartialShell::Keyword(k) if k == "All" => Ok(ShellSelection::All),
            PartialShell::Keyword(k) => Err(CliError::Config(format!(
                "Invalid shell selection '{}'. Expected \"All\" or a list of angular momenta.",
                k
            ))),
            PartialShell::Channels(channels) => Ok(ShellSelection::Channels(channels)),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum PartialAtom {
    Index(usize),
    Species(String),
}

impl From<PartialAtom> for AtomSelector {
    fn from(p: PartialAtom) -> Self {
        match p {
            PartialAtom::Index(i) => AtomSelector::Index(i),
            PartialAtom::Species(s) => AtomSelector::Species(s),
        }
    }
}

/// Either a tag or a structured `{atom, l | orb}` record.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialEntity {
    tag: Option<String>,
    atom: Option<Vec<usize>>,
    l: Option<Vec<PartialShell>>,
    orb: Option<Vec<Vec<usize>>>,
}

impl TryFrom<PartialEntity> for EntityRequest {
    type Error = CliError;

    fn try_from(p: PartialEntity) -> Result<Self> {
        match (p.tag, p.atom) {
            (Some(tag), None) if p.l.is_none() && p.orb.is_none() => Ok(EntityRequest::Tag(tag)),
            (None, Some(atom)) => {
                let l = p
                    .l
                    .map(|shells| {
                        shells
                            .into_iter()
                            .map(ShellSelection::try_from)
                            .collect::<Result<Vec<_>>>()
                    })
                    .transpose()?;
                Ok(EntityRequest::Spec(EntitySpec { atom, l, orb: p.orb }))
            }
            _ => Err(CliError::Config(
                "Each entity needs either `tag` alone or `atom` with an optional `l` or `orb`."
                    .to_string(),
            )),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialPair {
    ai: usize,
    aj: usize,
    #[serde(default)]
    ruc: [i32; 3],
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
enum PartialSetup {
    Explicit {
        entities: Vec<PartialEntity>,
        #[serde(default)]
        pairs: Vec<PartialPair>,
    },
    Range {
        radius: f64,
        #[serde(default)]
        atomic_subset: Vec<PartialAtom>,
        l: Option<PartialShell>,
        orb: Option<Vec<usize>>,
    },
}

impl TryFrom<PartialSetup> for SystemSetup {
    type Error = CliError;

    fn try_from(p: PartialSetup) -> Result<Self> {
        match p {
            PartialSetup::Explicit { entities, pairs } => Ok(SystemSetup::Explicit {
                entities: entities
                    .into_iter()
                    .map(EntityRequest::try_from)
                    .collect::<Result<_>>()?,
                pairs: pairs
                    .into_iter()
                    .map(|p| PairSpec::new(p.ai, p.aj, p.ruc))
                    .collect(),
            }),
            PartialSetup::Range {
                radius,
                atomic_subset,
                l,
                orb,
            } => Ok(SystemSetup::FromRange {
                radius,
                atomic_subset: atomic_subset.into_iter().map(Into::into).collect(),
                kwargs_for_mag_ent: EntityTemplate {
                    l: l.map(ShellSelection::try_from).transpose()?,
                    orb,
                },
            }),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialContourConfig {
    eset: Option<usize>,
    esetp: Option<f64>,
    emin: Option<f64>,
    emax: Option<f64>,
    emin_shift: Option<f64>,
    emax_shift: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialOrientation {
    o: [f64; 3],
    vw: [[f64; 3]; 2],
}

impl From<PartialOrientation> for ReferenceOrientation {
    fn from(p: PartialOrientation) -> Self {
        ReferenceOrientation::new(p.o.into(), p.vw[0].into(), p.vw[1].into())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialOutputConfig {
    precision: Option<usize>,
    comments: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialRunConfig {
    kset: Option<[usize; 3]>,
    contour: Option<PartialContourConfig>,
    scf_xcf_orientation: Option<[f64; 3]>,
    ref_xcf_orientations: Option<Vec<PartialOrientation>>,
    setup: Option<PartialSetup>,
    include_self_pairs: Option<bool>,
    max_pairs_per_loop: Option<usize>,
    max_g_per_loop: Option<usize>,
    greens_function_solver: Option<String>,
    spin_model: Option<String>,
    low_memory_mode: Option<bool>,
    output: Option<PartialOutputConfig>,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| CliError::RunFile {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<(ExchangeConfig, MagnopyOptions)> {
        self.apply_set_values(&args.set_values)?;

        let setup: SystemSetup = self
            .setup
            .take()
            .ok_or_else(|| CliError::Config("`setup` section is required.".to_string()))?
            .try_into()?;

        let contour_config = self.contour.take().unwrap_or_default();
        let defaults = ContourParams::default();
        let contour = ContourParams {
            eset: args.eset.or(contour_config.eset).unwrap_or(defaults.eset),
            esetp: args.esetp.or(contour_config.esetp).unwrap_or(defaults.esetp),
            emin: contour_config.emin.or(defaults.emin),
            emax: contour_config.emax.unwrap_or(defaults.emax),
            emin_shift: contour_config.emin_shift.unwrap_or(defaults.emin_shift),
            emax_shift: contour_config.emax_shift.unwrap_or(defaults.emax_shift),
        };

        let kset = match &args.kset {
            Some(values) => Some(<[usize; 3]>::try_from(values.as_slice()).map_err(|_| {
                CliError::Argument(format!("--kset takes three values, got {}", values.len()))
            })?),
            None => self.kset,
        };

        let solver = match (args.solver, &self.greens_function_solver) {
            (Some(solver), _) => Some(solver),
            (None, Some(name)) => Some(parse_named("greens-function-solver", name)?),
            (None, None) => None,
        };
        let spin_model = match (args.spin_model, &self.spin_model) {
            (Some(model), _) => Some(model),
            (None, Some(name)) => Some(parse_named("spin-model", name)?),
            (None, None) => None,
        };

        let mut builder = core_config::ExchangeConfigBuilder::new()
            .setup(setup)
            .contour(contour)
            .include_self_pairs(self.include_self_pairs.unwrap_or(false))
            .low_memory_mode(self.low_memory_mode.unwrap_or(true));
        if let Some(kset) = kset {
            builder = builder.kset(kset);
        }
        if let Some(o) = self.scf_xcf_orientation {
            builder = builder.scf_orientation(Vector3::from(o));
        }
        if let Some(orientations) = self.ref_xcf_orientations.take() {
            builder = builder.ref_orientations(orientations.into_iter().map(Into::into).collect());
        }
        if let Some(n) = self.max_pairs_per_loop {
            builder = builder.max_pairs_per_loop(n);
        }
        if let Some(n) = self.max_g_per_loop {
            builder = builder.max_g_per_loop(n);
        }
        if let Some(solver) = solver {
            builder = builder.solver(solver);
        }
        if let Some(model) = spin_model {
            builder = builder.spin_model(model);
        }
        let config = builder.build().map_err(|e| CliError::Config(e.to_string()))?;

        let output = self.output.take().unwrap_or_default();
        let options = MagnopyOptions {
            precision: args.precision.or(output.precision),
            comments: !args.no_comments && output.comments.unwrap_or(true),
        };
        Ok((config, options))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value_str) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;

            match key {
                "contour.eset" => {
                    self.contour_mut().eset = Some(parse_value(key, value_str)?);
                }
                "contour.esetp" => {
                    self.contour_mut().esetp = Some(parse_value(key, value_str)?);
                }
                "contour.emin" => {
                    self.contour_mut().emin = Some(parse_value(key, value_str)?);
                }
                "contour.emax" => {
                    self.contour_mut().emax = Some(parse_value(key, value_str)?);
                }
                "contour.emin-shift" => {
                    self.contour_mut().emin_shift = Some(parse_value(key, value_str)?);
                }
                "contour.emax-shift" => {
                    self.contour_mut().emax_shift = Some(parse_value(key, value_str)?);
                }
                "max-pairs-per-loop" => {
                    self.max_pairs_per_loop = Some(parse_value(key, value_str)?);
                }
                "max-g-per-loop" => {
                    self.max_g_per_loop = Some(parse_value(key, value_str)?);
                }
                "include-self-pairs" => {
                    self.include_self_pairs = Some(parse_value(key, value_str)?);
                }
                "low-memory-mode" => {
                    self.low_memory_mode = Some(parse_value(key, value_str)?);
                }
                "greens-function-solver" => {
                    self.greens_function_solver = Some(value_str.to_string());
                }
                "spin-model" => {
                    self.spin_model = Some(value_str.to_string());
                }
                "setup.radius" => match &mut self.setup {
                    Some(PartialSetup::Range { radius, .. }) => {
                        *radius = parse_value(key, value_str)?;
                    }
                    _ => {
                        return Err(CliError::Config(
                            "`setup.radius` can only be set for a range setup.".to_string(),
                        ));
                    }
                },
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    fn contour_mut(&mut self) -> &mut PartialContourConfig {
        self.contour.get_or_insert_with(Default::default)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn parse_named<T: FromStr<Err = String>>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|e| CliError::Config(format!("Invalid value for {}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use grogu::engine::config::{SolverMode, SpinModel};
    use once_cell::sync::Lazy;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    const EXPLICIT_SETUP: &str = r#"
        [setup]
        type = "explicit"
        entities = [{ atom = [0], l = ["All"] }, { tag = "1Fe(l:2)" }]
        pairs = [{ ai = 0, aj = 1, ruc = [0, 0, 0] }]
    "#;

    fn write_config_file(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn run_args(config_path: &Path, extra: &[&str]) -> RunArgs {
        let mut args = vec![
            "grogu",
            "run",
            "-m",
            "model.toml",
            "-o",
            "out.txt",
            "-c",
            config_path.to_str().unwrap(),
        ];
        args.extend_from_slice(extra);
        match Cli::parse_from(args).command {
            Commands::Run(args) => args,
            _ => panic!("Expected 'run' subcommand"),
        }
    }

    fn merge(name: &str, content: &str, extra: &[&str]) -> Result<(ExchangeConfig, MagnopyOptions)> {
        let path = write_config_file(name, content);
        let args = run_args(&path, extra);
        PartialRunConfig::from_file(&path)?.merge_with_cli(&args)
    }

    #[test]
    fn load_from_file_and_merge_with_defaults() {
        let (config, options) = merge("defaults.toml", EXPLICIT_SETUP, &[]).unwrap();

        assert_eq!(config.kspace.len(), 1);
        assert_eq!(config.contour, ContourParams::default());
        assert_eq!(config.solver, SolverMode::Parallel);
        assert_eq!(config.spin_model, SpinModel::GeneralisedFit);
        assert!(config.low_memory_mode);
        assert_eq!(config.ref_orientations, ReferenceOrientation::defaults());
        assert!(options.comments);
        assert_eq!(options.precision, None);

        let SystemSetup::Explicit { entities, pairs } = config.setup else {
            panic!("Expected an explicit setup");
        };
        assert_eq!(
            entities[0],
            EntityRequest::Spec(EntitySpec {
                atom: vec![0],
                l: Some(vec![ShellSelection::All]),
                orb: None,
            })
        );
        assert_eq!(entities[1], EntityRequest::Tag("1Fe(l:2)".to_string()));
        assert_eq!(pairs, vec![PairSpec::new(0, 1, [0, 0, 0])]);
    }

    #[test]
    fn cli_args_override_file_values() {
        let content = format!(
            r#"
            kset = [2, 2, 2]
            greens-function-solver = "Parallel"

            [contour]
            eset = 100 # Will be overridden
            emin = -10.0

            {EXPLICIT_SETUP}
            "#
        );
        let (config, options) = merge(
            "override.toml",
            &content,
            &["--kset", "4", "1", "1", "--eset", "30", "--solver", "sequential", "--no-comments"],
        )
        .unwrap();

        assert_eq!(config.kspace.dimensions(), Some([4, 1, 1]));
        assert_eq!(config.contour.eset, 30);
        assert_eq!(config.contour.emin, Some(-10.0));
        assert_eq!(config.solver, SolverMode::Sequential);
        assert!(!options.comments);
    }

    #[test]
    fn set_value_overrides_file_and_defaults() {
        let content = r#"
            max-pairs-per-loop = 10 # Will be overridden by --set

            [setup]
            type = "range"
            radius = 3.0
            atomic-subset = ["Fe", 2]
            l = [2]
        "#;
        let (config, _) = merge(
            "set.toml",
            content,
            &[
                "-S",
                "max-pairs-per-loop=4",
                "-S",
                "contour.esetp=1000",
                "-S",
                "setup.radius=5.5",
                "-S",
                "spin-model=generalised-grogu",
            ],
        )
        .unwrap();

        assert_eq!(config.max_pairs_per_loop, Some(4));
        assert_eq!(config.contour.esetp, 1000.0);
        assert_eq!(config.spin_model, SpinModel::GeneralisedGrogu);
        let SystemSetup::FromRange {
            radius,
            atomic_subset,
            kwargs_for_mag_ent,
        } = config.setup
        else {
            panic!("Expected a range setup");
        };
        assert_eq!(radius, 5.5);
        assert_eq!(
            atomic_subset,
            vec![AtomSelector::Species("Fe".to_string()), AtomSelector::Index(2)]
        );
        assert_eq!(kwargs_for_mag_ent.l, Some(ShellSelection::Channels(vec![2])));
    }

    #[test]
    fn custom_orientations_are_read() {
        let content = format!(
            r#"
            scf-xcf-orientation = [1.0, 0.0, 0.0]
            ref-xcf-orientations = [
                {{ o = [1.0, 0.0, 0.0], vw = [[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] }},
                {{ o = [0.0, 1.0, 0.0], vw = [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]] }},
                {{ o = [0.0, 0.0, 1.0], vw = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] }},
            ]
            {EXPLICIT_SETUP}
            "#
        );
        let (config, _) = merge("orientations.toml", &content, &[]).unwrap();
        assert_eq!(config.scf_orientation, Vector3::x());
        assert_eq!(config.ref_orientations, ReferenceOrientation::defaults());
    }

    #[test]
    fn missing_setup_returns_error() {
        let result = merge("missing.toml", "kset = [1, 1, 1]", &[]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("setup")));
    }

    #[test]
    fn invalid_values_are_reported() {
        let bad_key = merge("bad_key.toml", EXPLICIT_SETUP, &["-S", "contour.nope=1"]);
        assert!(matches!(bad_key, Err(CliError::Config(msg)) if msg.contains("contour.nope")));

        let bad_value = merge("bad_value.toml", EXPLICIT_SETUP, &["-S", "contour.eset=many"]);
        assert!(matches!(bad_value, Err(CliError::Config(_))));

        let bad_solver = merge(
            "bad_solver.toml",
            &format!("greens-function-solver = \"gpu\"\n{EXPLICIT_SETUP}"),
            &[],
        );
        assert!(matches!(bad_solver, Err(CliError::Config(msg)) if msg.contains("gpu")));

        let unknown_field = merge("unknown.toml", &format!("radius = 3.0\n{EXPLICIT_SETUP}"), &[]);
        assert!(matches!(unknown_field, Err(CliError::RunFile { .. })));
    }

    #[test]
    fn entities_need_a_tag_or_atoms() {
        let content = r#"
            [setup]
            type = "explicit"
            entities = [{ tag = "0Fe(l:2)", atom = [0] }]
        "#;
        assert!(matches!(
            merge("entity.toml", content, &[]),
            Err(CliError::Config(_))
        ));
    }
}
