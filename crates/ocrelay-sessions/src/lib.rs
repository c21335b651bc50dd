// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
//! Minimal session metadata store (§2's supporting-crate table): maps a chat
//! to the backend session it owns and the model binding prompts should use.
//! Command surfaces such as `/sessions` and `/new` are intentionally not
//! implemented here — only what `Submit` needs to resolve before dispatch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use ocrelay_config::{StorageConfig, StorageType};
use ocrelay_model::ModelBinding;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One chat's binding to a backend session and model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub chat_id: String,
    pub session_id: String,
    pub model: Option<ModelBinding>,
}

enum Backend {
    Memory,
    File(PathBuf),
}

/// Chat → session metadata, persisted per `storage.type` (§6.2).
pub struct SessionStore {
    backend: Backend,
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    pub fn open(config: &StorageConfig) -> anyhow::Result<Self> {
        match config.storage_type {
            StorageType::Memory => Ok(Self {
                backend: Backend::Memory,
                records: Mutex::new(HashMap::new()),
            }),
            StorageType::File => {
                let raw = config
                    .file_path
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("storage.type=file requires storage.file_path"))?;
                let path = PathBuf::from(shellexpand::tilde(raw).into_owned());
                let records = if path.is_file() {
                    let text = std::fs::read_to_string(&path)?;
                    serde_yaml::from_str(&text)?
                } else {
                    HashMap::new()
                };
                Ok(Self {
                    backend: Backend::File(path),
                    records: Mutex::new(records),
                })
            }
        }
    }

    /// The session/model binding tracked for `chat_id`, if any.
    pub fn get(&self, chat_id: &str) -> Option<SessionRecord> {
        self.records.lock().unwrap().get(chat_id).cloned()
    }

    /// Records or replaces the binding for `chat_id`, persisting immediately
    /// when file-backed — this store is small enough that batching writes
    /// isn't worth the complexity.
    pub fn upsert(&self, record: SessionRecord) {
        {
            let mut records = self.records.lock().unwrap();
            records.insert(record.chat_id.clone(), record);
        }
        self.persist();
    }

    fn persist(&self) {
        let Backend::File(path) = &self.backend else { return };
        let records = self.records.lock().unwrap();
        match serde_yaml::to_string(&*records) {
            Ok(text) => {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(path, text) {
                    warn!(path = %path.display(), error = %e, "failed to persist session store");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize session store"),
        }
    }
}
