//! tfscan cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; tfscan ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a terraform root module and print every resolved block
    ///
    /// Modules are followed: local sources relative to their caller, everything else through
    /// `.terraform/modules` (run `terraform init` first).
    Resolve(ResolveCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct ResolveCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Root module directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Load variables from a .tfvars file
    ///
    /// Can be specified multiple times, later files win.
    /// terraform.tfvars and *.auto.tfvars are always loaded first.
    #[clap(long = "var-file")]
    pub var_files: Vec<PathBuf>,

    /// Set a variable (name=value)
    ///
    /// The value is read as an HCL expression (`["a"]`, `{ x = 1 }`) and falls back to a
    /// plain string.
    #[clap(long = "var", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Value of terraform.workspace
    #[clap(long = "workspace", default_value = "default")]
    pub workspace: String,
}

fn parse_var(input: &str) -> Result<(String, String), String> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {input:?}"))?;
    Ok((name.trim().to_string(), value.to_string()))
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,

    /// Root module directory
    #[arg(short = 'p', long = "path", default_value = ".")]
    pub path: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    Documents,
    Blocks,
}
