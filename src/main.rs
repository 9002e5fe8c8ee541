//! Moon APNS: push notification client for the legacy binary gateway
//!
//! Sends notifications in batches over mutually-authenticated TLS and reads
//! the feedback service for devices that should no longer be addressed.
//!
//! Usage:
//!   moon-apns --cert push.p12 send --token <hex> --message "Hello"
//!   moon-apns --cert push.p12 --sandbox send --token <hex> --token <hex> --badge 2
//!   moon-apns --cert push.p12 feedback            # one JSON line per entry
//!
//! The certificate passphrase comes from `--passphrase` or the
//! MOON_APNS_PASSPHRASE environment variable.

use std::path::PathBuf;

use anyhow::{Context, bail};
use apns_protocol::Payload;
use apns_transport::PushClient;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "moon-apns", about = "Moon APNS, push notification client")]
struct Cli {
    /// Use the sandbox gateway and feedback hosts
    #[arg(long)]
    sandbox: bool,

    /// PKCS#12 client certificate bundle (DER)
    #[arg(long)]
    cert: PathBuf,

    /// Passphrase for the certificate bundle
    #[arg(long, env = "MOON_APNS_PASSPHRASE", default_value = "", hide_env_values = true)]
    passphrase: String,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.moon-apns/logs/moon-apns.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one notification to each device token; prints rejected tokens
    Send {
        /// Device token, 64 hex characters (repeatable)
        #[arg(long = "token", required = true)]
        tokens: Vec<String>,

        /// Alert body
        #[arg(long)]
        message: Option<String>,

        /// Badge number
        #[arg(long)]
        badge: Option<u32>,

        /// Sound name
        #[arg(long)]
        sound: Option<String>,

        /// Custom top-level field as key=value; repeating a key makes an array
        #[arg(long = "custom", value_name = "KEY=VALUE")]
        custom: Vec<String>,
    },

    /// Read the feedback service and print the retained entries
    Feedback,
}

fn init_logging(verbose: bool, log_file: Option<&str>) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(log_file_arg) = log_file {
        let log_path = if log_file_arg == "DEFAULT" {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
            PathBuf::from(home).join(".moon-apns/logs/moon-apns.log")
        } else {
            PathBuf::from(log_file_arg)
        };

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("opening log file {}", log_path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        // stdout carries command output
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Group `key=value` arguments by key, keeping first-seen key order. Values
/// that parse as JSON (numbers, booleans) keep their type.
fn parse_custom(args: &[String]) -> anyhow::Result<Vec<(String, Vec<Value>)>> {
    let mut fields: Vec<(String, Vec<Value>)> = Vec::new();
    for arg in args {
        let Some((key, raw)) = arg.split_once('=') else {
            bail!("custom field {arg:?} is not in key=value form");
        };
        let value = serde_json::from_str::<Value>(raw)
            .ok()
            .filter(|v| !v.is_object() && !v.is_array() && !v.is_null())
            .unwrap_or_else(|| Value::String(raw.to_string()));

        match fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => values.push(value),
            None => fields.push((key.to_string(), vec![value])),
        }
    }
    Ok(fields)
}

fn build_payloads(
    tokens: &[String],
    message: Option<&str>,
    badge: Option<u32>,
    sound: Option<&str>,
    custom: &[(String, Vec<Value>)],
) -> anyhow::Result<Vec<Payload>> {
    tokens
        .iter()
        .map(|token| {
            let mut payload = match message {
                Some(body) => Payload::with_alert(token.as_str(), body),
                None => Payload::new(token.as_str()),
            };
            payload.badge = badge;
            payload.sound = sound.map(str::to_string);
            for (key, values) in custom {
                payload
                    .add_custom(key.as_str(), values.iter().cloned())
                    .with_context(|| format!("custom field {key:?}"))?;
            }
            Ok(payload)
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let passphrase = SecretString::from(cli.passphrase);
    let client = PushClient::from_pkcs12_file(cli.sandbox, &cli.cert, &passphrase)
        .with_context(|| format!("loading client certificate {}", cli.cert.display()))?;
    info!(
        "Using {:?} gateway {} and feedback {}",
        client.config().environment,
        client.config().gateway,
        client.config().feedback
    );

    match cli.command {
        Command::Send {
            tokens,
            message,
            badge,
            sound,
            custom,
        } => {
            let custom = parse_custom(&custom)?;
            let payloads =
                build_payloads(&tokens, message.as_deref(), badge, sound.as_deref(), &custom)?;

            let report = client.send_batch_report(&payloads).await;
            for token in &report.rejected {
                println!("{token}");
            }
            if report.failed > 0 {
                error!("{} notification(s) could not be delivered to the gateway", report.failed);
            }
            if report.skipped > 0 {
                warn!("{} notification(s) skipped before sending", report.skipped);
            }
        }
        Command::Feedback => {
            let entries = client.fetch_feedback().await.context("reading feedback service")?;
            for entry in &entries {
                println!("{}", serde_json::to_string(entry)?);
            }
        }
    }

    Ok(())
}
