// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Mission namespaces: one directory per mission under a common root.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::StoreError;

use super::templates::{default_template, REQUIRED_DOCUMENTS};
use super::{validate_name, DocumentStore, StoreOptions, DOCUMENT_EXTENSION};

/// The directory holding every mission.
#[derive(Debug, Clone)]
pub struct Missions {
    root: PathBuf,
    options: StoreOptions,
}

impl Missions {
    /// Create a handle over `root`. Nothing is created on disk yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, StoreOptions::default())
    }

    /// Create a handle whose stores use `options`.
    pub fn with_options(root: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    /// The missions root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a mission.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Check whether a mission exists.
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_dir()).unwrap_or(false)
    }

    /// Create a mission with every required document set to its template.
    pub async fn create(&self, name: &str) -> Result<DocumentStore, StoreError> {
        let dir = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::MissionExists(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        for document in REQUIRED_DOCUMENTS {
            let path = dir.join(format!("{document}.{DOCUMENT_EXTENSION}"));
            tokio::fs::write(&path, default_template(document)).await?;
        }

        info!(mission = name, path = %dir.display(), "Mission created");
        Ok(DocumentStore::with_options(dir, self.options))
    }

    /// Open an existing mission.
    pub fn open(&self, name: &str) -> Result<DocumentStore, StoreError> {
        let dir = self.path_for(name)?;
        if !dir.is_dir() {
            return Err(StoreError::MissionNotFound(name.to_string()));
        }
        Ok(DocumentStore::with_options(dir, self.options))
    }

    /// Names of all missions, sorted.
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete a mission and all of its documents.
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let dir = self.path_for(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(mission = name, "Mission deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::MissionNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
