use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use proofcheck::config::{Config, ProofEntry};
use proofcheck::error::ProofError;
use proofcheck::output::OutputFormat;
use proofcheck::SignatureKind;

#[derive(Parser)]
#[command(
    name = "proofcheck",
    about = "Fetch and verify signed proofs",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and verify proofs
    Check {
        /// Config file path
        #[arg(long, short = 'c', default_value = ".proofcheck.toml")]
        config: PathBuf,

        /// Check a single proof at this URL instead of the configured ones
        #[arg(long, requires = "pubkey")]
        url: Option<String>,

        /// Armored public key file for --url
        #[arg(long, requires = "url")]
        pubkey: Option<PathBuf>,

        /// Signature kind for --url (pgp)
        #[arg(long, default_value = "pgp")]
        kind: String,

        /// Literal request to send for tcp:// URLs
        #[arg(long)]
        request: Option<String>,

        /// Override the fetch timeout, in seconds (0 disables)
        #[arg(long, env = "PROOFCHECK_TIMEOUT")]
        timeout: Option<u64>,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Generate a starter .proofcheck.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

struct CheckArgs {
    config: PathBuf,
    url: Option<String>,
    pubkey: Option<PathBuf>,
    kind: String,
    request: Option<String>,
    timeout: Option<u64>,
    format: String,
    output: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            config,
            url,
            pubkey,
            kind,
            request,
            timeout,
            format,
            output,
        } => cmd_check(CheckArgs {
            config,
            url,
            pubkey,
            kind,
            request,
            timeout,
            format,
            output,
        }),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn cmd_check(args: CheckArgs) -> Result<i32, ProofError> {
    let format = OutputFormat::from_str_lenient(&args.format).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", args.format);
        OutputFormat::Console
    });

    let mut config = Config::load(&args.config)?;

    if let Some(timeout) = args.timeout {
        config.fetch.timeout_secs = timeout;
    }

    if let (Some(url), Some(pubkey)) = (args.url, args.pubkey) {
        let kind = SignatureKind::from_str_lenient(&args.kind)
            .ok_or_else(|| ProofError::Config(format!("unknown signature kind '{}'", args.kind)))?;
        config.proofs = vec![ProofEntry {
            url,
            pubkey,
            kind,
            max_age_secs: 0,
            request: args.request,
        }];
    }

    let reports = proofcheck::check_all(&config)?;
    let rendered = proofcheck::render_report(&reports, format)?;

    match args.output {
        Some(out) => std::fs::write(&out, &rendered)?,
        None => print!("{}", rendered),
    }

    // Exit code: 0 = all verified, 1 = at least one proof failed
    Ok(if reports.iter().all(|r| r.verified) { 0 } else { 1 })
}

fn cmd_init(force: bool) -> Result<i32, ProofError> {
    let path = PathBuf::from(".proofcheck.toml");

    if path.exists() && !force {
        eprintln!(".proofcheck.toml already exists. Use --force to overwrite.");
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created .proofcheck.toml");

    Ok(0)
}
