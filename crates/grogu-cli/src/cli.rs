use clap::{Args, Parser, Subcommand};
use grogu::engine::config::{SolverMode, SpinModel};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Grogu Developers",
    version,
    about = "grogu - Magnetic exchange and anisotropy tensors from tight-binding Hamiltonians using the magnetic force theorem.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute exchange and anisotropy tensors and write them as a magnopy file.
    Run(RunArgs),
    /// Parse magnetic entity tags and print the selections they describe.
    CheckTag(CheckTagArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Path to the tight-binding model description (TOML).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub model: PathBuf,

    /// Path to the run configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path for the output exchange file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    // --- Sampling Overrides ---
    /// Override the k-point mesh.
    #[arg(long, num_args = 3, value_names = ["NX", "NY", "NZ"])]
    pub kset: Option<Vec<usize>>,

    /// Override the number of contour points.
    #[arg(long, value_name = "INT")]
    pub eset: Option<usize>,

    /// Override the contour stretching parameter.
    #[arg(long, value_name = "FLOAT")]
    pub esetp: Option<f64>,

    // --- Solver Overrides ---
    /// Override the Green's function solver ('parallel' or 'sequential').
    #[arg(long, value_name = "MODE")]
    pub solver: Option<SolverMode>,

    /// Override the spin model ('generalised-fit' or 'generalised-grogu').
    #[arg(long, value_name = "MODEL")]
    pub spin_model: Option<SpinModel>,

    // --- Output Overrides ---
    /// Number of decimals written for every value.
    #[arg(long, value_name = "INT")]
    pub precision: Option<usize>,

    /// Do not write the run parameters as comments.
    #[arg(long)]
    pub no_comments: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S contour.eset=200
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `check-tag` subcommand.
#[derive(Args, Debug)]
pub struct CheckTagArgs {
    /// Tags such as '0Fe(l:2)' or '0Te(o:1)--1Te(o:1-2)'.
    #[arg(required = true, value_name = "TAG")]
    pub tags: Vec<String>,
}
