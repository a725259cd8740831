//! On-disk attachment storage.
//!
//! Files land under `<root>/ticket_<id>/<uuid>_<name>`; the database keeps
//! the resulting path plus display metadata.

use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::errors::HelpdeskError;

/// A file received with a ticket form.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub original_filename: String,
    /// Display name; falls back to the original filename when blank.
    pub new_filename: Option<String>,
    pub description: String,
    pub bytes: Vec<u8>,
}

impl NewUpload {
    pub fn new(original_filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            original_filename: original_filename.into(),
            new_filename: None,
            description: String::new(),
            bytes,
        }
    }
}

/// Rename or re-describe an existing attachment.
#[derive(Debug, Clone)]
pub struct AttachmentEdit {
    pub id: i64,
    pub new_filename: String,
    pub description: String,
}

/// All attachment changes submitted with one ticket save.
#[derive(Debug, Clone, Default)]
pub struct AttachmentBatch {
    pub uploads: Vec<NewUpload>,
    pub edits: Vec<AttachmentEdit>,
    pub delete_ids: Vec<i64>,
}

impl AttachmentBatch {
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.edits.is_empty() && self.delete_ids.is_empty()
    }
}

/// Metadata of a file written by `FileStore::save`.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub original_filename: String,
    pub new_filename: String,
    pub description: String,
    pub file_path: String,
    pub mimetype: String,
    pub bytes: i64,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    max_bytes: u64,
}

impl FileStore {
    pub fn new(root: PathBuf, max_bytes: u64) -> Self {
        Self { root, max_bytes }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an upload to disk. Rejects empty names and files over the
    /// configured size limit.
    pub fn save(&self, ticket_id: i64, upload: &NewUpload) -> Result<StoredFile, HelpdeskError> {
        let original = upload.original_filename.trim();
        if original.is_empty() {
            return Err(HelpdeskError::BadRequest(
                "Uploaded file has no name".to_string(),
            ));
        }
        if upload.bytes.len() as u64 > self.max_bytes {
            return Err(HelpdeskError::BadRequest(format!(
                "File \"{}\" is larger than the {} byte limit",
                original, self.max_bytes
            )));
        }

        let dir = self.root.join(format!("ticket_{}", ticket_id));
        std::fs::create_dir_all(&dir).map_err(|source| HelpdeskError::Storage {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(format!("{}_{}", Uuid::new_v4().simple(), sanitize(original)));
        std::fs::write(&path, &upload.bytes).map_err(|source| HelpdeskError::Storage {
            path: path.clone(),
            source,
        })?;
        debug!(ticket_id, path = %path.display(), "stored attachment");

        let new_filename = upload
            .new_filename
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(original)
            .to_string();
        let mimetype = mime_guess::from_path(original)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(StoredFile {
            original_filename: original.to_string(),
            new_filename,
            description: upload.description.trim().to_string(),
            file_path: path.to_string_lossy().into_owned(),
            mimetype,
            bytes: upload.bytes.len() as i64,
        })
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub fn remove(&self, path: &str) -> Result<(), HelpdeskError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(HelpdeskError::Storage {
                path: PathBuf::from(path),
                source,
            }),
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
