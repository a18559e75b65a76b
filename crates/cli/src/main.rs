mod commands;
mod logging;

use std::path::{Path, PathBuf};
use std::process;

use certify_core::Config;
use clap::{Parser, Subcommand, ValueEnum};

use crate::logging::LogFormat;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Certificate issuance toolchain.
#[derive(Parser)]
#[command(
    name = "certify",
    version,
    about = "Issue QR-verifiable completion certificates"
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "CERTIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log filter used when RUST_LOG is unset (e.g. "info", "certify_core=debug")
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log line format on stderr
    #[arg(long, global = true, default_value = "human", value_enum)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue certificates for every participant in a roster CSV
    Issue {
        /// Path to the roster CSV file
        roster: PathBuf,
        /// Document layout TOML (built-in layout when omitted)
        #[arg(long)]
        layout: Option<PathBuf>,
        /// Where to write the outcome report
        #[arg(long, default_value = "report.csv")]
        report: PathBuf,
        /// Queue delivery messages for issued certificates in this directory
        #[arg(long)]
        outbox: Option<PathBuf>,
    },

    /// Print the certificate ID and verification URL for an identity
    Id {
        /// Participant full name
        #[arg(long)]
        name: String,
        /// Course name
        #[arg(long)]
        course: String,
        /// Participant email (may be omitted)
        #[arg(long, default_value = "")]
        email: String,
    },

    /// Check a certificate ID against an identity by recomputing it
    Verify {
        /// Certificate ID to check
        id: String,
        /// Participant full name
        #[arg(long)]
        name: String,
        /// Course name
        #[arg(long)]
        course: String,
        /// Participant email (may be omitted)
        #[arg(long, default_value = "")]
        email: String,
    },

    /// Read the verification URL back from a QR image
    VerifyQr {
        /// Path to the QR code PNG
        image: PathBuf,
        /// Also check the decoded ID against this participant name
        #[arg(long, requires = "course")]
        name: Option<String>,
        /// Course name for the identity check
        #[arg(long, requires = "name")]
        course: Option<String>,
        /// Participant email for the identity check
        #[arg(long, default_value = "")]
        email: String,
    },

    /// Create roster files
    Roster {
        #[command(subcommand)]
        command: RosterCommands,
    },

    /// Inspect document layouts
    Layout {
        #[command(subcommand)]
        command: LayoutCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum RosterCommands {
    /// Write a roster with two example participants
    Sample {
        /// Output CSV path
        path: PathBuf,
    },
    /// Write a roster of randomly generated participants
    Random {
        /// Output CSV path
        path: PathBuf,
        /// Number of participants
        #[arg(long, default_value = "5")]
        count: u32,
        /// Seed for reproducible rosters
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Subcommand)]
pub(crate) enum LayoutCommands {
    /// Print the built-in layout TOML
    Default,
    /// Check a layout file
    Check {
        /// Path to the layout TOML
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.log_format, &cli.log_level);

    match cli.command {
        Commands::Issue {
            roster,
            layout,
            report,
            outbox,
        } => {
            let config = load_config(cli.config.as_deref(), cli.output, cli.quiet);
            commands::issue::cmd_issue(
                config,
                &roster,
                layout.as_deref(),
                &report,
                outbox.as_deref(),
                cli.output,
                cli.quiet,
            );
        }
        Commands::Id {
            name,
            course,
            email,
        } => {
            let config = load_config(cli.config.as_deref(), cli.output, cli.quiet);
            commands::id::cmd_id(&config, &name, &course, &email, cli.output);
        }
        Commands::Verify {
            id,
            name,
            course,
            email,
        } => {
            let config = load_config(cli.config.as_deref(), cli.output, cli.quiet);
            commands::id::cmd_verify(&config, &id, &name, &course, &email, cli.output, cli.quiet);
        }
        Commands::VerifyQr {
            image,
            name,
            course,
            email,
        } => {
            let config = load_config(cli.config.as_deref(), cli.output, cli.quiet);
            let identity = name.zip(course);
            commands::id::cmd_verify_qr(
                &config,
                &image,
                identity.as_ref().map(|(n, c)| (n.as_str(), c.as_str(), email.as_str())),
                cli.output,
                cli.quiet,
            );
        }
        Commands::Roster { command } => {
            commands::roster::cmd_roster(command, cli.output, cli.quiet);
        }
        Commands::Layout { command } => {
            commands::layout::cmd_layout(command, cli.output, cli.quiet);
        }
    }
}

/// Load configuration from `path` (defaults when absent), overlay
/// `CERTIFY_*` environment variables and validate. Exits on error.
fn load_config(path: Option<&Path>, output: OutputFormat, quiet: bool) -> Config {
    let loaded = match path {
        Some(p) => Config::load(p),
        None => Ok(Config::default()),
    };
    let result = loaded.and_then(|mut config| {
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    });
    match result {
        Ok(config) => config,
        Err(e) => {
            report_error(&format!("configuration error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

/// Print a JSON value to stdout, pretty-printed.
pub(crate) fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => {
            eprintln!("error serializing output: {}", e);
            process::exit(1);
        }
    }
}
