//! File commands over the account's WebDAV root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tabled::Tabled;

use nextlink_api::HttpTransport;
use nextlink_core::{CancellationToken, Resource, Session};

use crate::cli::{GetArgs, GlobalOpts, LsArgs, MkdirArgs, PutArgs};
use crate::error::CliError;
use crate::output;

// ── Table row ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Type")]
    content_type: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

impl From<&Resource> for ResourceRow {
    fn from(r: &Resource) -> Self {
        let name = if r.is_collection {
            format!("{}/", r.name())
        } else {
            r.name().to_owned()
        };
        Self {
            name,
            size: if r.is_collection {
                "-".into()
            } else {
                ByteSize::b(r.size).to_string()
            },
            content_type: r.content_type.clone().unwrap_or_else(|| "-".into()),
            modified: r.last_modified.as_ref().map_or_else(|| "-".into(), format_time),
        }
    }
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

// ── Handlers ─────────────────────────────────────────────────────────

pub async fn list(
    session: &Session<HttpTransport>,
    args: &LsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let entries = session
        .list_directory(&args.path)
        .await
        .map_err(|e| CliError::from_core(e, session.account_id(), &args.path))?;

    let out = output::render_list(
        &global.output,
        &entries,
        |r| ResourceRow::from(r),
        |r| r.name().to_owned(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn mkdir(
    session: &Session<HttpTransport>,
    args: &MkdirArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session
        .create_directory(&args.path)
        .await
        .map_err(|e| CliError::from_core(e, session.account_id(), &args.path))?;

    if !global.quiet {
        eprintln!("Created {}", session.dav_path(&args.path));
    }
    Ok(())
}

pub async fn put(
    session: &Session<HttpTransport>,
    args: &PutArgs,
    cancel: &CancellationToken,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let remote = match &args.remote {
        Some(remote) => remote.clone(),
        None => file_name(&args.local)?,
    };
    let data = Bytes::from(tokio::fs::read(&args.local).await?);
    let size = ByteSize::b(u64::try_from(data.len()).unwrap_or(u64::MAX));

    let spinner = spinner(global, format!("Uploading {remote} ({size})"));
    let result = session
        .upload(&remote, data, args.content_type.as_deref(), cancel)
        .await;
    spinner.finish_and_clear();
    result.map_err(|e| CliError::from_core(e, session.account_id(), &remote))?;

    if !global.quiet {
        eprintln!("Uploaded {size} to {}", session.dav_path(&remote));
    }
    Ok(())
}

pub async fn get(
    session: &Session<HttpTransport>,
    args: &GetArgs,
    cancel: &CancellationToken,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let spinner = spinner(global, format!("Downloading {}", args.remote));
    let result = session.download(&args.remote, cancel).await;
    spinner.finish_and_clear();
    let body = result.map_err(|e| CliError::from_core(e, session.account_id(), &args.remote))?;

    let target = match &args.local {
        Some(path) => path.clone(),
        None => PathBuf::from(remote_name(&args.remote)?),
    };
    if target.as_os_str() == "-" {
        use tokio::io::AsyncWriteExt;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&body).await?;
        stdout.flush().await?;
        return Ok(());
    }

    tokio::fs::write(&target, &body).await?;
    if !global.quiet {
        let size = ByteSize::b(u64::try_from(body.len()).unwrap_or(u64::MAX));
        eprintln!("Saved {size} to {}", target.display());
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────

fn spinner(global: &GlobalOpts, message: String) -> ProgressBar {
    if global.quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn file_name(local: &Path) -> Result<String, CliError> {
    local
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| CliError::Validation {
            field: "local".into(),
            reason: format!("{} has no file name", local.display()),
        })
}

fn remote_name(remote: &str) -> Result<String, CliError> {
    remote
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| CliError::Validation {
            field: "remote".into(),
            reason: format!("'{remote}' does not name a file"),
        })
}
