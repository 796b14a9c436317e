// src/sidecar.rs
//! Sidecar store: comment threads kept next to a document in
//! `<document>.comments.json`, keyed by the hash of the content they were
//! last saved against.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::SidecarError;
use crate::models::Comment;
use crate::outline::Outline;
use crate::threads::for_each_comment_mut;
use crate::validation::ValidationReport;

/// Version written by this crate
pub const SIDECAR_VERSION: &str = "2.0";
pub const SIDECAR_EXTENSION: &str = "comments.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarEnvelope {
    pub version: String,
    pub document_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub threads: Vec<Comment>,
}

impl SidecarEnvelope {
    pub fn from_document(document: &Document) -> Self {
        Self {
            version: SIDECAR_VERSION.to_string(),
            document_hash: document.document_hash.clone(),
            last_validated: document.last_validated,
            threads: document.threads.clone(),
        }
    }

    /// Parse and version-check an envelope. Comment timestamps are
    /// truncated to whole seconds to match what markers can encode.
    pub fn from_json(json: &str) -> Result<Self, SidecarError> {
        let mut envelope: Self = serde_json::from_str(json)?;
        check_version_compatibility(&envelope.version)?;
        for_each_comment_mut(&mut envelope.threads, &mut |c| {
            c.created_at = c.created_at.trunc_subsecs(0);
        });
        Ok(envelope)
    }

    pub fn to_json(&self) -> Result<String, SidecarError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, SidecarError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), SidecarError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        debug!("Wrote {} thread(s) to {}", self.threads.len(), path.display());
        Ok(())
    }

    /// Turn the stored threads back into a document over `content`,
    /// validating them if the content changed since they were saved
    pub fn into_document(
        self,
        content: impl Into<String>,
        outline: Option<&dyn Outline>,
    ) -> (Document, Option<ValidationReport>) {
        let stored_validation = self.last_validated;
        let (mut document, report) =
            Document::from_stored(content, self.threads, Some(self.document_hash.as_str()), outline);
        if report.is_none() {
            document.last_validated = stored_validation;
        }
        (document, report)
    }
}

/// Readers accept any envelope with the same major version
pub fn check_version_compatibility(version: &str) -> Result<(), SidecarError> {
    fn major(v: &str) -> Option<u32> {
        v.split('.').next()?.trim().parse().ok()
    }

    match (major(version), major(SIDECAR_VERSION)) {
        (Some(found), Some(ours)) if found == ours => Ok(()),
        _ => Err(SidecarError::UnsupportedVersion {
            found: version.to_string(),
            supported: SIDECAR_VERSION.to_string(),
        }),
    }
}

/// `notes.md` -> `notes.md.comments.json`
pub fn sidecar_path_for<P: AsRef<Path>>(document_path: P) -> PathBuf {
    let document_path = document_path.as_ref();
    let mut name = document_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    document_path.with_file_name(name)
}

/// Load a document and its sidecar. A missing sidecar means no comments.
pub fn load_document<P: AsRef<Path>>(
    document_path: P,
    outline: Option<&dyn Outline>,
) -> Result<(Document, Option<ValidationReport>), SidecarError> {
    let document_path = document_path.as_ref();
    let content = fs::read_to_string(document_path)?;
    let sidecar = sidecar_path_for(document_path);

    if !sidecar.exists() {
        debug!("No sidecar for {}", document_path.display());
        return Ok((Document::new(content), None));
    }

    let envelope = SidecarEnvelope::load_from_path(&sidecar)?;
    let (document, report) = envelope.into_document(content, outline);
    if let Some(report) = &report {
        info!(
            "{} changed since its comments were saved, {} issue(s)",
            document_path.display(),
            report.issues.len()
        );
    }
    Ok((document, report))
}

/// Write the document content and its sidecar
pub fn save_document<P: AsRef<Path>>(document_path: P, document: &Document) -> Result<(), SidecarError> {
    let document_path = document_path.as_ref();
    fs::write(document_path, &document.content)?;
    SidecarEnvelope::from_document(document).save_to_path(sidecar_path_for(document_path))
}
