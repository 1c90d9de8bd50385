//! Artifact collection from a workspace's output directory

use base64::{engine::general_purpose, Engine as _};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::Error;
use crate::sandbox::executor::{MimeKind, OutputFile};

/// Default cap on a single collected file
pub const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// MIME type for an image extension, `None` for everything else
fn image_mime_type(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Classify a file name into its encoding and MIME type
pub fn classify(name: &str) -> (MimeKind, &'static str) {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match image_mime_type(&extension) {
        Some(mime) => (MimeKind::Image, mime),
        None => (MimeKind::Text, "text/plain"),
    }
}

/// Scans an output directory and encodes what it finds
#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    max_file_bytes: u64,
}

impl Default for ArtifactCollector {
    fn default() -> Self {
        ArtifactCollector::new(MAX_FILE_BYTES)
    }
}

impl ArtifactCollector {
    pub fn new(max_file_bytes: u64) -> Self {
        ArtifactCollector { max_file_bytes }
    }

    /// Collect regular files under the size cap, sorted by name.
    ///
    /// A missing directory yields nothing. Directories, symbolic links,
    /// oversized files and unreadable files are skipped without affecting
    /// the rest.
    pub async fn collect(&self, output_dir: &Path) -> Vec<OutputFile> {
        let mut entries = match tokio::fs::read_dir(output_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to list {}: {}", output_dir.display(), e);
                }
                return Vec::new();
            }
        };

        let mut files = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to list {}: {}", output_dir.display(), e);
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            // Links are written by the sandboxed code and may point anywhere on the host
            let metadata = match tokio::fs::symlink_metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping artifact {}: {}", name, e);
                    continue;
                }
            };

            if !metadata.file_type().is_file() {
                if metadata.file_type().is_symlink() {
                    warn!("Skipping artifact {}: symbolic link", name);
                }
                continue;
            }
            if metadata.len() >= self.max_file_bytes {
                debug!(
                    "Skipping artifact {} ({} bytes exceeds cap of {})",
                    name,
                    metadata.len(),
                    self.max_file_bytes
                );
                continue;
            }

            match read_artifact(&entry.path(), &name).await {
                Ok(file) => files.push(file),
                Err(e) => warn!("{}", e),
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }
}

async fn read_artifact(path: &Path, name: &str) -> Result<OutputFile, Error> {
    let (kind, mime_type) = classify(name);
    let read_error = |reason: String| Error::ArtifactRead {
        name: name.to_string(),
        reason,
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| read_error(e.to_string()))?;

    let content = match kind {
        MimeKind::Image => general_purpose::STANDARD.encode(&bytes),
        MimeKind::Text => String::from_utf8(bytes).map_err(|e| read_error(e.to_string()))?,
    };

    Ok(OutputFile {
        name: name.to_string(),
        content,
        mime_type: mime_type.to_string(),
        kind,
    })
}
