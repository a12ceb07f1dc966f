//! Compact entity tags such as `0Te(l:1-2)` or `0Fe(o:1)--1Fe(o:1-2)`.
//!
//! Each `--` separated part names one atom: its index, its species and either an
//! orbital selection (`o:` followed by dash separated indices) or a shell selection
//! (`l:` followed by dash separated channels, or `All`). All parts of a tag must use
//! the same selector kind.

use super::magnopy::{AtomRecord, ExchangeRecord};
use crate::core::models::entity::{EntitySpec, ShellSelection};
use crate::core::models::layout::Layout;
use crate::core::models::pair::PairSpec;
use nalgebra::Vector3;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TagError {
    #[error("Tag is empty")]
    Empty,
    #[error("Tag part '{fragment}' does not start with an atom index")]
    MissingAtomIndex { fragment: String },
    #[error("Tag part '{fragment}' has no species name")]
    MissingSpecies { fragment: String },
    #[error("Tag part '{fragment}' has no '(<kind>:<selection>)' selector")]
    MissingSelector { fragment: String },
    #[error("Unknown selector kind '{kind}' in '{fragment}', expected 'o' or 'l'")]
    UnknownSelector { kind: String, fragment: String },
    #[error("Invalid selection '{selection}' in '{fragment}'")]
    InvalidSelection { selection: String, fragment: String },
    #[error("Tag '{tag}' mixes orbital and shell selectors")]
    MixedSelectors { tag: String },
    #[error("Exchange record refers to '{tag}', which is not listed among the atoms")]
    UnknownTag { tag: String },
    #[error("No atom of the layout sits at {position:?} (tag '{tag}')")]
    NoAtomAt { tag: String, position: [f64; 3] },
}

enum Selector {
    Orbitals(Vec<usize>),
    Shells(ShellSelection),
}

/// Parses a tag into the entity selection it describes.
pub fn decipher(tag: &str) -> Result<EntitySpec, TagError> {
    if tag.trim().is_empty() {
        return Err(TagError::Empty);
    }

    let mut atom = Vec::new();
    let mut orbitals = Vec::new();
    let mut shells = Vec::new();
    for fragment in tag.split("--") {
        let (index, selector) = parse_part(fragment)?;
        atom.push(index);
        match selector {
            Selector::Orbitals(o) => orbitals.push(o),
            Selector::Shells(l) => shells.push(l),
        }
    }

    match (orbitals.is_empty(), shells.is_empty()) {
        (false, false) => Err(TagError::MixedSelectors {
            tag: tag.to_string(),
        }),
        (true, _) => Ok(EntitySpec {
            atom,
            l: Some(shells),
            orb: None,
        }),
        (false, true) => Ok(EntitySpec {
            atom,
            l: None,
            orb: Some(orbitals),
        }),
    }
}

fn parse_part(fragment: &str) -> Result<(usize, Selector), TagError> {
    let owned = || fragment.to_string();

    let digits = fragment
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(fragment.len());
    if digits == 0 {
        return Err(TagError::MissingAtomIndex { fragment: owned() });
    }
    let index = fragment[..digits]
        .parse()
        .map_err(|_| TagError::MissingAtomIndex { fragment: owned() })?;

    let rest = &fragment[digits..];
    let letters = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    if letters == 0 {
        return Err(TagError::MissingSpecies { fragment: owned() });
    }

    let body = rest[letters..]
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| TagError::MissingSelector { fragment: owned() })?;
    let (kind, selection) = body
        .split_once(':')
        .ok_or_else(|| TagError::MissingSelector { fragment: owned() })?;

    let invalid = || TagError::InvalidSelection {
        selection: selection.to_string(),
        fragment: owned(),
    };
    let selector = match kind {
        "o" => Selector::Orbitals(parse_indices(selection).ok_or_else(invalid)?),
        "l" if selection == "All" => Selector::Shells(ShellSelection::All),
        "l" => Selector::Shells(ShellSelection::Channels(
            parse_indices(selection).ok_or_else(invalid)?,
        )),
        _ => {
            return Err(TagError::UnknownSelector {
                kind: kind.to_string(),
                fragment: owned(),
            });
        }
    };
    Ok((index, selector))
}

fn parse_indices(selection: &str) -> Option<Vec<usize>> {
    selection
        .split('-')
        .map(|s| {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                s.parse().ok()
            }
        })
        .collect()
}

/// Rebuilds entity and pair requests from the tags of exchange records.
///
/// Entities are created in order of first appearance.
pub fn decipher_all_by_tag(
    records: &[ExchangeRecord],
) -> Result<(Vec<EntitySpec>, Vec<PairSpec>), TagError> {
    let mut tags: Vec<String> = Vec::new();
    let mut entities = Vec::new();
    let mut lookup = |tag: &str| -> Result<usize, TagError> {
        if let Some(index) = tags.iter().position(|t| t == tag) {
            return Ok(index);
        }
        entities.push(decipher(tag)?);
        tags.push(tag.to_string());
        Ok(tags.len() - 1)
    };

    let mut pairs = Vec::with_capacity(records.len());
    for record in records {
        let ai = lookup(&record.tag1)?;
        let aj = lookup(&record.tag2)?;
        pairs.push(PairSpec {
            ai,
            aj,
            ruc: record.ruc,
        });
    }
    Ok((entities, pairs))
}

/// Matches atom records to layout atoms by position, one entity per record.
///
/// Pair records refer to atom records by tag.
pub fn decipher_all_by_pos(
    layout: &Layout,
    atoms: &[AtomRecord],
    records: &[ExchangeRecord],
    tolerance: f64,
) -> Result<(Vec<EntitySpec>, Vec<PairSpec>), TagError> {
    let entities = atoms
        .iter()
        .map(|record| {
            layout
                .find_atom_at(&record.xyz, tolerance)
                .map(EntitySpec::atom)
                .ok_or_else(|| TagError::NoAtomAt {
                    tag: record.tag.clone(),
                    position: position_array(&record.xyz),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let index_of = |tag: &str| {
        atoms
            .iter()
            .position(|a| a.tag == tag)
            .ok_or_else(|| TagError::UnknownTag {
                tag: tag.to_string(),
            })
    };
    let pairs = records
        .iter()
        .map(|record| {
            Ok(PairSpec {
                ai: index_of(&record.tag1)?,
                aj: index_of(&record.tag2)?,
                ruc: record.ruc,
            })
        })
        .collect::<Result<Vec<_>, TagError>>()?;
    Ok((entities, pairs))
}

fn position_array(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}
