//! OTK CLI - call OpenAPI operations as tools

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use otk_core::{DefaultToolContext, OtkConfig, Tool};
use otk_openapi::{OpenApiToolset, RestApiTool, ToolsetOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "otk")]
#[command(about = "Turn an OpenAPI document into callable tools", long_about = None)]
#[command(version)]
struct Cli {
    /// OpenAPI document, local path or http(s) URL
    #[arg(short, long, global = true)]
    spec: Option<String>,

    /// Base URL for API requests (overrides the document's servers)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Pre-supplied access credential
    #[arg(long, global = true)]
    token: Option<String>,

    /// Config file (defaults to otk.toml in the current directory tree)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the generated tools
    Tools,
    /// Print a tool's parameter JSON schema
    Schema {
        /// Tool name
        tool: String,
    },
    /// Acquire a credential interactively
    Auth,
    /// Invoke a tool
    Call {
        /// Tool name
        tool: String,

        /// Parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => OtkConfig::load_from(path)?,
        None => OtkConfig::load()?,
    };
    otk_telemetry::init_telemetry(&config.observability);

    let toolset = open_toolset(&cli, &config).await?;

    match cli.command {
        Commands::Tools => {
            for tool in toolset.rest_tools() {
                let definition = tool.definition();
                println!(
                    "{:<32} {:<6} {}\n{:<32} {}",
                    definition.name,
                    definition.method,
                    definition.path,
                    "",
                    definition.description
                );
            }
        }
        Commands::Schema { tool } => {
            let tool = find_tool(&toolset, &tool)?;
            println!("{}", serde_json::to_string_pretty(&tool.schema())?);
        }
        Commands::Auth => {
            if !toolset.requires_auth() {
                println!("No tool requires authentication.");
                return Ok(());
            }
            toolset.authenticate().await?;
            println!("Authenticated ({}).", toolset.session_auth().kind());
        }
        Commands::Call { tool, params } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("--params must be a JSON object")?;
            if !params.is_object() {
                bail!("--params must be a JSON object");
            }

            let tool = find_tool(&toolset, &tool)?;
            let definition = tool.definition();
            if toolset.auth().requires_auth(Some(&definition.auth))
                && !toolset.auth().is_authenticated()
            {
                toolset.auth().authenticate(Some(&definition.auth)).await?;
            }

            let response = tool
                .execute(Arc::new(DefaultToolContext::generate()), params)
                .await?;
            println!("{}", serde_json::to_string_pretty(&response.result)?);
        }
    }

    Ok(())
}

fn find_tool(toolset: &OpenApiToolset, name: &str) -> otk_core::Result<Arc<RestApiTool>> {
    toolset
        .get_tool(name)
        .ok_or_else(|| otk_core::Error::ToolNotFound(name.to_string()))
}

async fn open_toolset(cli: &Cli, config: &OtkConfig) -> Result<OpenApiToolset> {
    let source = cli
        .spec
        .clone()
        .or_else(|| config.spec.source.clone())
        .context("No OpenAPI document given; pass --spec or set [spec].source in otk.toml")?;

    let mut options = ToolsetOptions::from_config(config);
    if let Some(base_url) = &cli.base_url {
        options = options.with_base_url(base_url.clone());
    }
    if let Some(token) = &cli.token {
        options = options.with_access_token(token.clone());
    }

    debug!("Opening toolset from {}", source);
    let toolset = OpenApiToolset::load(&source, options).await?;
    Ok(toolset)
}
