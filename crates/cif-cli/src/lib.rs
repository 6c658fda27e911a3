//! # cif-cli — Admin Asset Command-Line Interface
//!
//! ## Subcommands
//!
//! - `list` — Committed identifiers of a context, in commit order
//! - `upload` — Upload files through the lifecycle controller
//! - `revert` — Remove an uploaded asset
//! - `fetch` — Download an asset to a file
//! - `save-page` — Replace the markdown of a content page
//!
//! Argument parsing lives here next to the handlers; handlers delegate to
//! `cif-client` and write their report to the given writer.

pub mod assets;
pub mod pages;

use std::io::Write;

use clap::{Args, Parser, Subcommand};
use cif_client::{AssetClient, ClientConfig};
use cif_core::AssetContext;

/// Admin asset CLI for the comparison interface.
#[derive(Parser, Debug)]
#[command(name = "cif", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub conn: ConnectionArgs,
    #[command(subcommand)]
    pub command: Commands,
}

/// Where to connect. Flags override the `CIF_*` environment.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Service root URL.
    #[arg(long, global = true, env = "CIF_BASE_URL")]
    pub base_url: Option<String>,
    /// Upload context.
    #[arg(long, global = true, env = "CIF_CONTEXT")]
    pub context: Option<String>,
    /// Admin bearer credential, `{admin_id}:{secret}` or `{secret}`.
    #[arg(long, global = true, env = "CIF_ADMIN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List committed identifiers.
    List(assets::ListArgs),
    /// Upload image files.
    Upload(assets::UploadArgs),
    /// Revert an uploaded asset.
    Revert(assets::RevertArgs),
    /// Download an asset.
    Fetch(assets::FetchArgs),
    /// Replace a content page with the contents of a markdown file.
    SavePage(pages::SavePageArgs),
}

impl ConnectionArgs {
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = ClientConfig::from_env()?;
        if let Some(base_url) = &self.base_url {
            config = ClientConfig {
                base_url: ClientConfig::new(base_url)?.base_url,
                ..config
            };
        }
        if let Some(context) = &self.context {
            config = config.with_context(AssetContext::parse(context)?);
        }
        if let Some(token) = &self.token {
            config = config.with_admin_token(token.clone());
        }
        Ok(config)
    }
}

/// Run one command, writing its report to `out`.
pub async fn run(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let config = cli.conn.client_config()?;
    tracing::debug!(config = ?config, "connecting");
    let client = AssetClient::new(config)?;

    match cli.command {
        Commands::List(args) => assets::list(&client, &args, out).await,
        Commands::Upload(args) => assets::upload(client, &args, out).await,
        Commands::Revert(args) => assets::revert(&client, &args, out).await,
        Commands::Fetch(args) => assets::fetch(&client, &args, out).await,
        Commands::SavePage(args) => pages::save_page(&client, &args, out).await,
    }
}
