use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use replacer_core::{ProviderRegistry, Replacer, ReplacerSettings};
use replacer_providers::{GcpSettings, MetadataClient};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod review;

use review::Reviewer;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Wait up to SECS for the metadata server before doing anything else
    #[arg(long, global = true, value_name = "SECS")]
    wait_for_metadata: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Substitute every directive in a document
    Replace {
        /// Input file (reads stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file path (optional, prints to stdout if not provided)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Default provider for directives that do not name one
        #[arg(short, long)]
        provider: Option<String>,

        /// Configuration entry (format: key=value, short keys are namespaced)
        #[arg(long)]
        set: Vec<String>,

        /// Substitute values as JSON string literals
        #[arg(long)]
        escape: bool,

        /// Leave directives with unknown keys in place
        #[arg(long)]
        ignore_unknown: bool,
    },

    /// Review a ConfigMap or Secret JSON document and print the verdict
    Review {
        /// Path to the resource document
        #[arg(short, long)]
        resource: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(secs) = cli.wait_for_metadata {
        info!("Waiting up to {}s for the metadata server", secs);
        MetadataClient::new(&GcpSettings::from_env())?
            .wait_until_ready(Duration::from_secs(secs))
            .await
            .context("Metadata server is not available")?;
    }

    let registry = Arc::new(ProviderRegistry::new());
    replacer_providers::register_all(&registry);
    let settings = ReplacerSettings::from_env();
    debug!("Registered providers: {:?}", registry.names());

    match cli.command {
        Commands::Replace { input, output, provider, set, escape, ignore_unknown } => {
            let text = read_input(input.as_ref()).await?;

            let mut config = HashMap::new();
            let namespaced = |key: &str| namespaced_key(&settings.namespace, key);
            if let Some(provider) = provider {
                config.insert(namespaced("provider"), provider);
            }
            if escape {
                config.insert(namespaced("escape_replacements"), "true".to_string());
            }
            if ignore_unknown {
                config.insert(namespaced("ignore_unknown_keys"), "true".to_string());
            }
            for entry in &set {
                let Some((key, value)) = entry.split_once('=') else {
                    bail!("Invalid --set entry '{}', expected key=value", entry);
                };
                config.insert(namespaced(key.trim()), value.to_string());
            }

            let mut replacer = Replacer::with_settings(registry, config, settings)
                .context("Failed to configure replacer")?;
            let result = replacer.replace_all(&text).await.context("Replacement failed")?;

            if let Some(out_path) = output {
                tokio::fs::write(&out_path, &result)
                    .await
                    .context("Failed to write output file")?;
                info!("Success! Output written to {:?}", out_path);
            } else {
                print!("{}", result);
            }
        }
        Commands::Review { resource } => {
            let document = tokio::fs::read_to_string(&resource)
                .await
                .with_context(|| format!("Failed to read {:?}", resource))?;

            let verdict = Reviewer::new(registry, settings).review_json(&document).await;
            println!("{}", serde_json::to_string_pretty(&verdict)?);

            if !verdict.allowed {
                bail!("Resource rejected: {}", verdict.message);
            }
        }
    }

    Ok(())
}

async fn read_input(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path)),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// Keys containing a `/` are taken as-is; anything else goes under `namespace`.
fn namespaced_key(namespace: &str, key: &str) -> String {
    if key.contains('/') {
        key.to_string()
    } else {
        format!("{}{}", namespace, key)
    }
}
