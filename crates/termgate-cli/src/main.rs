//! Termgate CLI
//!
//! Command-line access to the terminology gateway.
//!
//! Usage:
//! ```bash
//! # Check the service account can log in
//! termgate --config termgate.yaml login
//!
//! # Fetch a resource (env vars override the config file)
//! TERMGATE_AUTH_PASSWORD=secret termgate --config termgate.yaml get /refsets/123
//!
//! # Download an export
//! termgate --config termgate.yaml download /exports/7 --output export.zip
//!
//! # Show how a search would be sent
//! termgate normalize --kind refset --query diabetes --active-only
//! ```

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use termgate_config_file::GatewayConfig;
use termgate_core::{EntityKind, SearchRequest};
use termgate_egress::TerminologyGateway;
use termgate_search::normalize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "termgate")]
#[command(about = "Termgate - Terminology server gateway", long_about = None)]
struct Cli {
    /// Path to a YAML or TOML configuration file
    #[arg(long, short, env = "TERMGATE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Force a fresh login and report the outcome
    Login,
    /// GET a resource and print the response
    Get {
        /// Path relative to the base URL, or an absolute URL
        path: String,

        /// Accept-Language override
        #[arg(long)]
        language: Option<String>,
    },
    /// Stream a file download to disk
    Download {
        path: String,

        #[arg(long, short)]
        output: PathBuf,

        #[arg(long)]
        language: Option<String>,
    },
    /// Print the normalised form of a search request
    Normalize {
        /// Entity kind (project, refset, translation, concept, edition, team, user)
        #[arg(long)]
        kind: EntityKind,

        #[arg(long)]
        query: Option<String>,

        #[arg(long)]
        active_only: bool,

        #[arg(long)]
        offset: Option<u32>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        sort_field: Option<String>,

        #[arg(long)]
        ascending: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = GatewayConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    termgate_observability::init_logging(&config.logging.level, config.logging.json)
        .context("Failed to initialise logging")?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Login => login(&config).await,
        Commands::Get { path, language } => get(&config, &path, language.as_deref()).await,
        Commands::Download {
            path,
            output,
            language,
        } => download(&config, &path, &output, language.as_deref()).await,
        Commands::Normalize {
            kind,
            query,
            active_only,
            offset,
            limit,
            sort_field,
            ascending,
        } => {
            let mut request = SearchRequest::new().with_active_only(active_only);
            request.query = query;
            request.offset = offset;
            if let Some(limit) = limit {
                request = request.with_limit(limit);
            }
            request.sort_field = sort_field;
            request.ascending = ascending.then_some(true);

            let normalized = normalize(&request, kind);
            println!("{}", serde_json::to_string_pretty(&normalized)?);
            Ok(())
        }
    }
}

fn connect(config: &GatewayConfig) -> anyhow::Result<TerminologyGateway> {
    config.validate()?;
    Ok(TerminologyGateway::new(config.to_terminology_config())?)
}

async fn login(config: &GatewayConfig) -> anyhow::Result<()> {
    let gateway = connect(config)?;
    let sessions = gateway
        .sessions()
        .context("Terminology gateway is disabled")?;

    if sessions.mode().is_disabled() {
        println!("Authentication is disabled (auth endpoint 'none')");
        return Ok(());
    }

    let session = sessions.acquire(true).await?;
    info!(generation = session.generation(), "Login succeeded");
    println!(
        "Logged in as {} (token length: {} chars, expires {})",
        config.auth.username,
        session.token().len(),
        session.expires_at().to_rfc3339()
    );
    Ok(())
}

async fn get(config: &GatewayConfig, path: &str, language: Option<&str>) -> anyhow::Result<()> {
    let gateway = connect(config)?;
    let response = gateway.get(path, language).await?;

    println!("{}", response.status);
    match response.json::<serde_json::Value>() {
        Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        Err(_) => println!("{}", response.text()),
    }

    if !response.is_success() {
        bail!("{} returned {}", response.url, response.status);
    }
    Ok(())
}

async fn download(
    config: &GatewayConfig,
    path: &str,
    output: &Path,
    language: Option<&str>,
) -> anyhow::Result<()> {
    let gateway = connect(config)?;
    let download = gateway.download(path, language).await?.error_for_status()?;
    let content_type = download.content_type().unwrap_or("unknown").to_string();

    let mut file = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut stream = download.into_stream();
    let mut written = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;

    println!(
        "Wrote {} bytes ({}) to {}",
        written,
        content_type,
        output.display()
    );
    Ok(())
}
