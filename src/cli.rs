use clap::Parser;
use std::path::PathBuf;

use crate::validator::CheckingLevel;

/// Validator for DSPL dataset packages
#[derive(Parser, Debug, Clone)]
#[command(name = "dspl-validate")]
#[command(about = "Check a DSPL dataset (XML descriptor or zip package) against the DSPL schema, model rules and its data")]
#[command(version)]
pub struct Cli {
    /// DSPL descriptor or zip archive containing exactly one
    #[arg(help = "DSPL XML file or zip archive to check")]
    pub path: PathBuf,

    /// How much checking to perform
    #[arg(
        short = 'l',
        long = "checking-level",
        alias = "checking_level",
        value_enum,
        help = "Checking level [default: full]"
    )]
    pub checking_level: Option<CheckingLevel>,

    /// XML Schema used instead of the bundled DSPL schema
    #[arg(short = 's', long = "schema-file")]
    pub schema_file: Option<PathBuf>,

    /// List every error and issue, and log debug output to stderr
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Configuration file (TOML or JSON)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
