use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::Result;

/// Ids of messages that were already forwarded, grouped by source chat.
///
/// Message ids are only unique within one chat, so every lookup names the
/// chat. Stored as `{"<chat>": [ids]}`; a bare `[ids]` array (older files)
/// belongs to the default chat.
#[derive(Clone, Debug)]
pub struct ForwardLedger {
    path: PathBuf,
    chats: BTreeMap<String, BTreeSet<i32>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Stored {
    ByChat(BTreeMap<String, BTreeSet<i32>>),
    Flat(BTreeSet<i32>),
}

impl ForwardLedger {
    /// Load the ledger; a missing or unreadable file starts an empty ledger.
    pub fn load(path: impl Into<PathBuf>, default_chat: &str) -> Self {
        let path = path.into();
        let chats = match read_chats(&path, &chat_key(default_chat)) {
            Ok(chats) => chats,
            Err(e) => {
                tracing::warn!(
                    "could not read forwarded ledger {}: {e}; starting empty",
                    path.display()
                );
                BTreeMap::new()
            }
        };
        Self { path, chats }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, chat: &str, id: i32) -> bool {
        self.chats
            .get(&chat_key(chat))
            .is_some_and(|ids| ids.contains(&id))
    }

    /// Number of recorded ids across all chats.
    pub fn len(&self) -> usize {
        self.chats.values().map(BTreeSet::len).sum()
    }

    pub fn len_for(&self, chat: &str) -> usize {
        self.chats.get(&chat_key(chat)).map_or(0, BTreeSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add an id and persist the whole ledger.
    pub fn record(&mut self, chat: &str, id: i32) -> Result<()> {
        self.chats.entry(chat_key(chat)).or_default().insert(id);
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let txt = serde_json::to_string(&self.chats)?;
        std::fs::write(&self.path, txt)?;
        Ok(())
    }
}

/// Usernames are case-insensitive.
fn chat_key(chat: &str) -> String {
    chat.trim().trim_start_matches('@').to_lowercase()
}

fn read_chats(path: &Path, default_chat: &str) -> Result<BTreeMap<String, BTreeSet<i32>>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let txt = std::fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let stored: Stored = serde_json::from_str(&txt)?;
    let chats = match stored {
        Stored::ByChat(chats) => chats
            .into_iter()
            .map(|(chat, ids)| (chat_key(&chat), ids))
            .collect(),
        Stored::Flat(ids) => BTreeMap::from([(default_chat.to_string(), ids)]),
    };
    Ok(chats)
}
