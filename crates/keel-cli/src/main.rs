//! Keel CLI: drive the quota-aware persistence core from a terminal.

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use keel_config::{CliOverrides, KeelConfig};
use keel_credentials::{PointerStore, rotate};
use keel_media::{MediaError, prepare_attachment};
use keel_session::{SessionStore, apply_policy, estimate_data_url_bytes};
use keel_types::AttachmentPayload;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "keel",
    version,
    about = "Quota-aware session, credential and attachment tooling"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Override the hard ceiling on stored sessions
    #[arg(long, global = true)]
    max_sessions: Option<usize>,

    /// Override the largest image dimension kept on upload
    #[arg(long, global = true)]
    max_dimension: Option<u32>,

    /// Override the lossy encoding quality (0.0 - 1.0)
    #[arg(long, global = true)]
    quality: Option<f32>,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect and prune stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Run a file through the upload guard and image compressor
    Attach {
        file: PathBuf,
        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
        /// Provider whose upload ceiling applies
        #[arg(long)]
        provider: Option<String>,
        /// Write the prepared attachment here
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Rotate provider credentials
    Credential {
        #[command(subcommand)]
        action: CredentialAction,
    },
    /// Print the decoded byte size of a base64 value or data URL
    Estimate { value: String },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List stored sessions, newest first
    List,
    /// Apply the storage policy and delete evicted sessions
    Prune {
        /// Show what would be evicted without deleting anything
        #[arg(long)]
        dry_run: bool,
        /// Provider whose storage policy applies
        #[arg(long)]
        provider: Option<String>,
    },
}

#[derive(Subcommand)]
enum CredentialAction {
    /// Select the next credential for a provider and advance its pointer
    Next {
        #[arg(long)]
        provider: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = KeelConfig::load(CliOverrides {
        max_sessions: cli.max_sessions,
        max_dimension: cli.max_dimension,
        quality: cli.quality,
    })
    .context("Failed to load configuration")?;
    tracing::debug!("Using config dir {}", config.config_dir.display());

    match cli.command {
        Command::Sessions { action } => match action {
            SessionsAction::List => list_sessions(&config).await,
            SessionsAction::Prune { dry_run, provider } => {
                prune_sessions(&config, provider.as_deref(), dry_run).await
            }
        },
        Command::Attach {
            file,
            mime,
            provider,
            out,
        } => attach(&config, &file, mime, provider.as_deref(), out.as_deref()).await,
        Command::Credential {
            action: CredentialAction::Next { provider },
        } => next_credential(&config, &provider).await,
        Command::Estimate { value } => {
            println!("{}", estimate_data_url_bytes(&value));
            Ok(())
        }
    }
}

async fn open_store(config: &KeelConfig) -> Result<SessionStore> {
    SessionStore::new(config.config_dir.clone())
        .await
        .context("Failed to open session store")
}

async fn list_sessions(config: &KeelConfig) -> Result<()> {
    let store = open_store(config).await?;
    let summaries = store.list().await?;
    if summaries.is_empty() {
        eprintln!("No saved sessions.");
        return Ok(());
    }

    let total: u64 = summaries.iter().map(|s| s.byte_size).sum();
    eprintln!(
        "{} sessions, {} bytes (threshold: {})",
        summaries.len(),
        total,
        format_threshold(config.policy.storage_threshold_bytes)
    );
    for s in &summaries {
        let label_str = match s.label.as_deref() {
            Some(label) if !label.is_empty() => format!(" [{label}]"),
            _ => String::new(),
        };
        println!(
            "  {} {:>8}  {:>3} msgs  {:>9} B{}  {}",
            s.short_id(),
            s.age(),
            s.message_count,
            s.byte_size,
            label_str,
            if s.preview.is_empty() {
                "(empty)"
            } else {
                &s.preview
            }
        );
    }
    Ok(())
}

async fn prune_sessions(config: &KeelConfig, provider: Option<&str>, dry_run: bool) -> Result<()> {
    let store = open_store(config).await?;
    let policy = config.policy_for(provider);

    let outcome = if dry_run {
        apply_policy(store.load_all().await?, &policy)?
    } else {
        store.enforce_policy(&policy).await?
    };

    let verb = if dry_run { "Would evict" } else { "Evicted" };
    eprintln!(
        "{verb} {} sessions; {} retained ({} bytes).",
        outcome.evicted_count(),
        outcome.sessions.len(),
        outcome.retained_bytes
    );
    for id in &outcome.evicted {
        println!("  {id}");
    }
    Ok(())
}

async fn attach(
    config: &KeelConfig,
    file: &Path,
    mime: Option<String>,
    provider: Option<&str>,
    out: Option<&Path>,
) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mime_type = mime.unwrap_or_else(|| guess_mime(file).to_string());
    let payload = AttachmentPayload::new(mime_type, STANDARD.encode(&bytes));

    let guard = config.upload_guard(provider);
    let prepared = match prepare_attachment(payload, &guard, &config.compression).await {
        Ok(prepared) => prepared,
        Err(MediaError::SizeRejected { size, limit }) => {
            bail!("File too large: {size} bytes (limit {limit} bytes)")
        }
        Err(e) => return Err(e).context("Attachment rejected"),
    };

    let dimensions = match prepared.dimensions {
        Some((w, h)) => format!(", {w}x{h}"),
        None => String::new(),
    };
    eprintln!(
        "{}: {} → {} bytes ({}{}{})",
        file.display(),
        bytes.len(),
        prepared.byte_size,
        prepared.payload.mime_type,
        dimensions,
        if prepared.compressed { ", compressed" } else { "" }
    );

    if let Some(out) = out {
        let data = STANDARD
            .decode(&prepared.payload.data)
            .context("Prepared payload is not valid base64")?;
        tokio::fs::write(out, data)
            .await
            .with_context(|| format!("Failed to write {}", out.display()))?;
    }
    Ok(())
}

async fn next_credential(config: &KeelConfig, provider: &str) -> Result<()> {
    let field = config.credential_field(provider)?;
    let store = PointerStore::new(&config.config_dir);
    let rotation = rotate(&store, provider, &field).await?;
    println!(
        "{provider}: credential #{} ({}), next pointer {}",
        rotation.index + 1,
        rotation.masked(),
        rotation.next_pointer
    );
    Ok(())
}

fn format_threshold(threshold: Option<u64>) -> String {
    match threshold {
        Some(bytes) => format!("{bytes} bytes"),
        None => "unlimited".to_string(),
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guess_mime_by_extension() {
        assert_eq!(guess_mime(Path::new("a.PNG")), "image/png");
        assert_eq!(guess_mime(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("notes.md")), "text/plain");
        assert_eq!(guess_mime(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn cli_parses_prune() {
        let cli = Cli::try_parse_from(["keel", "sessions", "prune", "--dry-run"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Sessions {
                action: SessionsAction::Prune { dry_run: true, .. }
            }
        ));
    }

    #[test]
    fn cli_requires_provider_for_credentials() {
        assert!(Cli::try_parse_from(["keel", "credential", "next"]).is_err());
    }

    #[test]
    fn threshold_formatting() {
        assert_eq!(format_threshold(None), "unlimited");
        assert_eq!(format_threshold(Some(10)), "10 bytes");
    }
}
