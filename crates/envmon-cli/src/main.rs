use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use envmon_audit::VerifyResult;
use envmon_schemas::ProformaStatus;
use envmon_workflow::lifecycle::is_locked;
use envmon_workflow::{next_status, LifecycleEvent};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::stats::StatsArgs;

#[derive(Parser)]
#[command(name = "envmon")]
#[command(about = "Environmental monitoring desk CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an aggregate (sum, average, min, max, median, standardDeviation, range)
    #[command(allow_negative_numbers = true)]
    Stats {
        /// Aggregate function name
        function: String,
        /// Inline values; ignored when --csv is given
        values: Vec<f64>,
        /// CSV export to read the column from
        #[arg(long, requires = "column")]
        csv: Option<PathBuf>,
        /// Header name of the numeric column
        #[arg(long)]
        column: Option<String>,
        /// Decimals in the formatted result (default from config, else 2)
        #[arg(long)]
        decimals: Option<usize>,
        /// Config layers in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Check a single proforma status transition
    Lifecycle {
        /// Current status, e.g. in_progress
        #[arg(long)]
        from: String,
        /// Event, e.g. send_for_review
        #[arg(long)]
        event: String,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> local)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },

    /// Classify an ISO certificate expiry date
    CertStatus {
        /// Expiry date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        expiry: String,
        /// Reference time; defaults to the current time
        #[arg(long)]
        now: Option<String>,
        /// Days before expiry that count as expiring (default from config, else 90)
        #[arg(long = "warning-days")]
        warning_days: Option<i64>,
        /// Config layers in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of an audit JSONL file
    Verify {
        /// Path to audit.jsonl
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    // Dev-only convenience: load .env.local if present.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Stats {
            function,
            values,
            csv,
            column,
            decimals,
            config_paths,
        } => {
            let settings = commands::load_settings(&config_paths)?;
            let out = commands::stats::run(StatsArgs {
                function,
                values,
                csv,
                column,
                decimals: decimals.unwrap_or(settings.result_decimals),
            })?;
            for line in out.lines() {
                println!("{line}");
            }
        }
        Commands::Lifecycle { from, event } => {
            let Some(from) = ProformaStatus::parse(&from) else {
                bail!(
                    "invalid --from '{}'. expected one of: {}",
                    from,
                    ProformaStatus::ALL.map(|s| s.as_str()).join(" | ")
                );
            };
            let Some(event) = LifecycleEvent::parse(&event) else {
                bail!(
                    "invalid --event '{}'. expected one of: {}",
                    event,
                    LifecycleEvent::ALL.map(|e| e.as_str()).join(" | ")
                );
            };
            let to = next_status(from, event)?;
            println!("from={from}");
            println!("event={event}");
            println!("to={to}");
            println!("locked={}", is_locked(to));
        }
        Commands::ConfigHash { paths } => {
            let loaded = envmon_config::load_layered_yaml(&paths[..])?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => {
                let result = envmon_audit::verify_hash_chain(&path)
                    .with_context(|| format!("verify audit log {}", path.display()))?;
                match result {
                    VerifyResult::Valid { lines } => {
                        println!("audit_valid=true");
                        println!("lines={lines}");
                    }
                    VerifyResult::Broken { line, reason } => {
                        println!("audit_valid=false");
                        println!("line={line}");
                        println!("reason={reason}");
                        bail!("AUDIT_CHAIN_BROKEN path={} line={}", path.display(), line);
                    }
                }
            }
        },
        Commands::CertStatus {
            expiry,
            now,
            warning_days,
            config_paths,
        } => {
            let settings = commands::load_settings(&config_paths)?;
            let warning_days = warning_days.unwrap_or(settings.expiry_warning_days);
            if warning_days < 0 {
                bail!("--warning-days must be >= 0, got {warning_days}");
            }
            let expiry = commands::parse_utc(&expiry).context("--expiry")?;
            let now = match now {
                Some(s) => commands::parse_utc(&s).context("--now")?,
                None => Utc::now(),
            };
            let (_, lines) = commands::certs::status_lines(expiry, now, warning_days);
            for line in lines {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    // stdout carries key=value output; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
