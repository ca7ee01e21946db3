//! Per-chat toggle persistence (`group_settings.json`).
//!
//! Layout is a flat `{ "<chat jid>": { "multiTag": bool } }` document. Unseen chats
//! read as all-false. Every write is flushed to disk before `set` returns; a failed
//! flush leaves the in-memory value updated and is reported to the caller.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};

use crate::{domain::ChatId, errors::Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFlags {
    /// Re-broadcast every message with all participants silently mentioned.
    #[serde(default)]
    pub multi_tag: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatFlag {
    MultiTag,
}

impl ChatFlags {
    fn set(&mut self, flag: ChatFlag, value: bool) {
        match flag {
            ChatFlag::MultiTag => self.multi_tag = value,
        }
    }

    pub fn get(&self, flag: ChatFlag) -> bool {
        match flag {
            ChatFlag::MultiTag => self.multi_tag,
        }
    }
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    chats: Mutex<BTreeMap<ChatId, ChatFlags>>,
    /// Held from snapshot to rename, so files land in the order snapshots were taken.
    flush: Mutex<()>,
}

impl SettingsStore {
    /// Load the store from `path`. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let chats = match fs::read_to_string(&path) {
            Ok(txt) if txt.trim().is_empty() => BTreeMap::new(),
            Ok(txt) => serde_json::from_str(&txt)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Io(e)),
        };
        tracing::debug!(path = %path.display(), chats = chats.len(), "loaded chat settings");
        Ok(Self {
            path: Some(path),
            chats: Mutex::new(chats),
            flush: Mutex::new(()),
        })
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            chats: Mutex::new(BTreeMap::new()),
            flush: Mutex::new(()),
        }
    }

    pub fn get(&self, chat_id: &ChatId) -> ChatFlags {
        self.lock().get(chat_id).copied().unwrap_or_default()
    }

    pub fn set(&self, chat_id: &ChatId, flag: ChatFlag, value: bool) -> Result<()> {
        let _flush = self.flush.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = {
            let mut chats = self.lock();
            chats.entry(chat_id.clone()).or_default().set(flag, value);
            serde_json::to_string_pretty(&*chats)?
        };

        let Some(path) = &self.path else {
            return Ok(());
        };
        write_atomic(path, &snapshot).map_err(|source| Error::Persist {
            path: path.clone(),
            source,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ChatId, ChatFlags>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.chats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
