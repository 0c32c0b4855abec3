//! Temp-file housekeeping and process lifecycle hooks
//!
//! Uploaded content images live in the work directory as
//! `{user_id}_content.{ext}`; anything derived from them shares that stem.

use crate::session::{SessionStore, StorageError};
use crate::state_machine::UserId;
use crate::transport::ChatTransport;
use std::path::{Path, PathBuf};

/// Extension used for stored uploads
pub const CONTENT_EXT: &str = "jpg";

/// Where a user's uploaded content image is stored
pub fn content_path(work_dir: &Path, user_id: UserId) -> PathBuf {
    work_dir.join(format!("{user_id}_content.{CONTENT_EXT}"))
}

fn user_prefix(user_id: UserId) -> String {
    format!("{user_id}_content.")
}

/// Whether a file name looks like some user's temp content file
pub fn is_content_file(name: &str) -> bool {
    let Some((id, rest)) = name.split_once('_') else {
        return false;
    };
    !id.is_empty()
        && id.trim_start_matches('-').chars().all(|c| c.is_ascii_digit())
        && rest.starts_with("content.")
}

/// Delete the files in `work_dir` whose names satisfy `matches`
async fn purge_matching(
    work_dir: &Path,
    matches: impl Fn(&str) -> bool,
) -> Result<usize, StorageError> {
    let mut entries = match tokio::fs::read_dir(work_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StorageError::io(work_dir, e)),
    };

    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(work_dir, e))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !matches(name) {
            continue;
        }
        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            // Raced with another purge
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(&path, e)),
        }
    }
    Ok(removed)
}

/// Remove every temp file belonging to one user
pub async fn purge_user_files(work_dir: &Path, user_id: UserId) -> Result<usize, StorageError> {
    let prefix = user_prefix(user_id);
    let removed = purge_matching(work_dir, |name| name.starts_with(&prefix)).await?;
    if removed > 0 {
        tracing::debug!(user_id, removed, "Purged user temp files");
    }
    Ok(removed)
}

/// Remove every user's temp files
pub async fn purge_all(work_dir: &Path) -> Result<usize, StorageError> {
    purge_matching(work_dir, is_content_file).await
}

/// Startup housekeeping: clear stray files from a previous run, register the webhook
pub async fn on_startup<T: ChatTransport + ?Sized>(
    work_dir: &Path,
    transport: &T,
    webhook_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::warn!("Starting up...");

    tokio::fs::create_dir_all(work_dir)
        .await
        .map_err(|e| StorageError::io(work_dir, e))?;
    let stray = purge_all(work_dir).await?;
    if stray > 0 {
        tracing::info!(removed = stray, "Removed stray content files");
    }

    transport.set_webhook(webhook_url).await?;
    tracing::info!("Webhook registered");
    Ok(())
}

/// Shutdown housekeeping; failures are logged, never fatal
pub async fn on_shutdown<S, T>(work_dir: &Path, store: &S, transport: &T)
where
    S: SessionStore + ?Sized,
    T: ChatTransport + ?Sized,
{
    tracing::warn!("Shutting down...");

    match purge_all(work_dir).await {
        Ok(removed) => tracing::info!(removed, "Purged content files"),
        Err(e) => tracing::error!(error = %e, "Failed to purge content files"),
    }

    if let Err(e) = store.close().await {
        tracing::error!(error = %e, "Failed to close session store");
    }

    if let Err(e) = transport.delete_webhook().await {
        tracing::warn!(error = %e, "Failed to delete webhook");
    }
}

/// Resolves once the process is asked to stop (SIGTERM or Ctrl-C)
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => tracing::info!("Received SIGINT - shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C - shutting down"),
        },
        () = terminate => tracing::info!("Received SIGTERM - shutting down"),
    }
}
