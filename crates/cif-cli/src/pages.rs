//! # Page Subcommand

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use cif_client::{AssetClient, FormSubmitter};
use cif_core::PageKind;

#[derive(Args, Debug)]
pub struct SavePageArgs {
    /// introduction, ethics, thank_you or site_policies.
    pub page: PageKind,
    /// Markdown file with the new page text.
    pub file: PathBuf,
}

pub async fn save_page(client: &AssetClient, args: &SavePageArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let md_text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let token = client.fetch_csrf_token().await?;
    let saved = FormSubmitter::new(client.clone(), token)
        .save_page(args.page, &md_text)
        .await?;
    if saved.changed {
        writeln!(out, "saved {} (revision {})", args.page, saved.revision)?;
    } else {
        writeln!(out, "{} unchanged (revision {})", args.page, saved.revision)?;
    }
    Ok(())
}
