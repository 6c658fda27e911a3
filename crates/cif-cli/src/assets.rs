//! # Asset Subcommands
//!
//! `list`, `upload`, `revert` and `fetch`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;
use cif_client::{AssetClient, FormSubmitter, LifecycleController, UploadFile};
use cif_core::AssetId;
use cif_state::EntryState;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Read the legacy pipe-delimited list instead of the structured one.
    #[arg(long)]
    pub legacy: bool,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// PNG or JPEG files to upload.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Confirm the context's uploads once every file committed.
    #[arg(long)]
    pub confirm: bool,
}

#[derive(Args, Debug)]
pub struct RevertArgs {
    pub identifier: AssetId,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    pub identifier: AssetId,
    /// Destination file.
    #[arg(short, long)]
    pub output: PathBuf,
}

pub async fn list(client: &AssetClient, args: &ListArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let ids = if args.legacy {
        client.current_files().await?
    } else {
        client.list_current().await?
    };
    for id in ids {
        writeln!(out, "{id}")?;
    }
    Ok(())
}

/// Upload every file concurrently, report one line per file and fail
/// if any file was rejected.
pub async fn upload(client: AssetClient, args: &UploadArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let controller = LifecycleController::boot(client).await?;

    let mut added = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        added.push(controller.add_file(file));
    }
    controller.settle().await;

    let mut failed = 0usize;
    for id in added {
        let Some(entry) = controller.entry(id) else {
            continue;
        };
        let name = entry.file_name.as_deref().unwrap_or("?");
        match (&entry.state, &entry.identifier, &entry.rejection) {
            (EntryState::Committed, Some(identifier), _) => writeln!(out, "{name} -> {identifier}")?,
            (_, _, Some(rejection)) => {
                failed += 1;
                let hint = if rejection.retryable { " (retry later)" } else { "" };
                writeln!(out, "{name}: rejected: {}{hint}", rejection.message)?;
            }
            (state, _, _) => {
                failed += 1;
                writeln!(out, "{name}: {state}")?;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} files were not uploaded", args.files.len());
    }

    if args.confirm {
        let form = FormSubmitter::new(controller.client().clone(), controller.token().clone());
        let confirmed = form.confirm_uploads().await?;
        writeln!(out, "confirmed {confirmed} uploads")?;
    }
    Ok(())
}

pub async fn revert(client: &AssetClient, args: &RevertArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let token = client.fetch_csrf_token().await?;
    if client.revert(&token, &args.identifier).await? {
        writeln!(out, "reverted {}", args.identifier)?;
    } else {
        writeln!(out, "{} was already absent", args.identifier)?;
    }
    Ok(())
}

pub async fn fetch(client: &AssetClient, args: &FetchArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let asset = client.load(&args.identifier).await?;
    tokio::fs::write(&args.output, &asset.bytes)
        .await
        .with_context(|| format!("writing {}", args.output.display()))?;
    writeln!(
        out,
        "wrote {} bytes ({}) to {}",
        asset.bytes.len(),
        asset.content_type.as_deref().unwrap_or("unknown type"),
        args.output.display()
    )?;
    Ok(())
}
