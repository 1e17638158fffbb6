//! Subcommands and their JSON output.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::TimeDelta;
use clap::Subcommand;
use depot_core::Storage;
use depot_core::storage::naming::split_file_name;
use depot_shared::FileId;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a local file.
    Upload {
        /// File to upload.
        path: PathBuf,
        /// Stored name, defaults to the file stem.
        #[arg(long)]
        name: Option<String>,
    },
    /// Show metadata of a stored file.
    Info {
        /// File identifier.
        id: String,
    },
    /// Print metadata and base64 content.
    Get {
        /// File identifier.
        id: String,
    },
    /// Write the content of a stored file to a local path.
    Download {
        /// File identifier.
        id: String,
        /// Destination path, created or truncated.
        dest: PathBuf,
    },
    /// Generate a time bounded public URL.
    Link {
        /// File identifier.
        id: String,
        /// Link lifetime; zero uses the configured default.
        #[arg(long, default_value_t = 0)]
        expiry_secs: i64,
    },
    /// Delete a stored file.
    Delete {
        /// File identifier.
        id: String,
    },
}

/// Stem and extension of the final path component.
fn name_parts(path: &Path) -> (String, String) {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_file_name(&file_name);
    (stem.to_string(), ext.to_string())
}

impl Command {
    /// Run the command against `storage`.
    pub async fn run(self, storage: &dyn Storage) -> anyhow::Result<Value> {
        let output = match self {
            Self::Upload { path, name } => {
                let (stem, ext) = name_parts(&path);
                let mut file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?;
                let info = storage
                    .upload(&mut file, name.as_deref().unwrap_or(&stem), &ext)
                    .await?;
                info!(file_id = %info.file_id, size = info.file_size, "uploaded");
                serde_json::to_value(info)?
            }
            Self::Info { id } => serde_json::to_value(storage.file_info(&FileId::new(id)).await?)?,
            Self::Get { id } => serde_json::to_value(storage.get(&FileId::new(id)).await?)?,
            Self::Download { id, dest } => {
                let id = FileId::new(id);
                let file = storage.download(&id, &dest).await?;
                let bytes = file.metadata().await?.len();
                json!({
                    "file_id": id,
                    "destination": dest.display().to_string(),
                    "bytes": bytes,
                })
            }
            Self::Link { id, expiry_secs } => {
                let link = storage
                    .public_link(&FileId::new(id), TimeDelta::seconds(expiry_secs))
                    .await?;
                serde_json::to_value(link)?
            }
            Self::Delete { id } => {
                let id = FileId::new(id);
                storage.delete(&id).await?;
                json!({ "file_id": id, "deleted": true })
            }
        };
        Ok(output)
    }
}
