use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "peownerfinder")]
#[command(about = "Researches company ownership and flags private-equity owned accounts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at ./config/peownerfinder.toml
    #[arg(long, global = true)]
    pub init: bool,

    /// Verbose logging (use -v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also append execution logs to a file (specify file path)
    #[arg(long, global = true)]
    pub log_file: Option<String>,

    /// Path to the configuration file (defaults to ./config/peownerfinder.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the web server (default)
    Serve {
        /// Address to bind, overrides config
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Analyze one spreadsheet in the foreground and write the report workbook
    Analyze {
        /// Spreadsheet with a "Company Name" column (.xlsx, .xls, .ods or .csv)
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Output path, .xlsx or .csv (defaults to Analysis_Report_<id>.xlsx)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Maximum in-flight research calls, overrides config
        #[arg(short = 'j', long, value_name = "N")]
        concurrency: Option<usize>,
    },

    /// Inspect or extend the known PE firm registry
    Firms {
        #[command(subcommand)]
        action: FirmsCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum FirmsCommands {
    /// List every known PE firm
    List,

    /// Add firms to the registry (case-insensitive duplicates are ignored)
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },
}
