use crate::cli::CheckTagArgs;
use crate::error::{CliError, Result};
use grogu::core::io::tag::decipher;
use grogu::core::models::entity::{EntitySpec, ShellSelection};
use tracing::debug;

pub fn run(args: CheckTagArgs) -> Result<()> {
    let mut failures = 0;
    for tag in &args.tags {
        match decipher(tag) {
            Ok(spec) => {
                debug!(tag = %tag, ?spec, "Tag parsed.");
                println!("✓ {}  ->  {}", tag, describe(&spec));
            }
            Err(e) => {
                failures += 1;
                eprintln!("✗ {}  ->  {}", tag, e);
            }
        }
    }

    if failures > 0 {
        return Err(CliError::Argument(format!(
            "{} of {} tag(s) could not be parsed",
            failures,
            args.tags.len()
        )));
    }
    Ok(())
}

/// `atom=[0, 1] l=None orb=[[1], [1, 2]]`
fn describe(spec: &EntitySpec) -> String {
    let l = match &spec.l {
        None => "None".to_string(),
        Some(shells) => {
            let shells: Vec<String> = shells
                .iter()
                .map(|shell| match shell {
                    ShellSelection::All => "All".to_string(),
                    ShellSelection::Channels(channels) => format!("{:?}", channels),
                })
                .collect();
            format!("[{}]", shells.join(", "))
        }
    };
    let orb = match &spec.orb {
        None => "None".to_string(),
        Some(orbitals) => format!("{:?}", orbitals),
    };
    format!("atom={:?} l={} orb={}", spec.atom, l, orb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tags: &[&str]) -> CheckTagArgs {
        CheckTagArgs {
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn describes_shell_and_orbital_selections() {
        let spec = decipher("0Te(l:1-2)").unwrap();
        assert_eq!(describe(&spec), "atom=[0] l=[[1, 2]] orb=None");

        let spec = decipher("0Te(o:1)--1Te(o:1-2)").unwrap();
        assert_eq!(describe(&spec), "atom=[0, 1] l=None orb=[[1], [1, 2]]");

        let spec = decipher("3Fe(l:All)").unwrap();
        assert_eq!(describe(&spec), "atom=[3] l=[All] orb=None");
    }

    #[test]
    fn valid_tags_succeed() {
        assert!(run(args(&["0Te(l:1-2)", "1Fe(o:3)"])).is_ok());
    }

    #[test]
    fn every_invalid_tag_is_counted() {
        let result = run(args(&["0Te(a:1)", "0Te(l:1)", "Te(o:1)"]));
        match result {
            Err(CliError::Argument(msg)) => assert!(msg.starts_with("2 of 3")),
            other => panic!("Expected an argument error, got {:?}", other),
        }
    }
}
