// FILE: src/store.rs
//! The authoritative in-memory index: `FileId -> FileRecord`.
//!
//! Records live in a dense slot vector with an id -> slot map beside it, so
//! a page is a slice copy rather than a walk over the whole map. Removal
//! swap-removes, which moves the last record into the hole; enumeration
//! order is therefore stable only between mutations and cursors are
//! advisory.

use crate::gateway::{ClientMessage, Gateway};
use crate::identity::FileId;
use crate::record::FileRecord;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Default)]
struct Slots {
    records: Vec<FileRecord>,
    index: HashMap<FileId, usize>,
    /// Bumped on every mutation.
    generation: u64,
}

impl Slots {
    fn take(&mut self, id: &FileId) -> Option<FileRecord> {
        let slot = self.index.remove(id)?;
        let removed = self.records.swap_remove(slot);
        if let Some(moved) = self.records.get(slot) {
            let moved_id = moved.id.clone();
            self.index.insert(moved_id, slot);
        }
        self.generation += 1;
        Some(removed)
    }
}

/// One page of records.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub files: Vec<FileRecord>,
    /// Set only when the page came back full, even if that full page
    /// happened to end the enumeration.
    pub next_cursor: Option<usize>,
    #[serde(skip)]
    total: usize,
    #[serde(skip)]
    cursor: usize,
}

impl Page {
    /// Exact end-of-data signal, for in-process callers.
    pub fn has_more(&self) -> bool {
        self.cursor + self.files.len() < self.total
    }
}

/// Every record at one generation of the store.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub generation: u64,
    pub records: Vec<FileRecord>,
}

pub struct IndexStore {
    slots: RwLock<Slots>,
    last_scan: RwLock<Option<DateTime<Utc>>>,
    gateway: Gateway,
}

impl IndexStore {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
            last_scan: RwLock::new(None),
            gateway,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Upsert by id. The stored record is replaced wholesale, position
    /// included. Returns false, publishing nothing, when the stored record is
    /// already identical.
    pub fn add_or_replace(&self, record: FileRecord) -> bool {
        let mut slots = self.slots.write();

        let existing = slots.index.get(&record.id).copied();
        if existing.is_some_and(|slot| slots.records[slot] == record) {
            return false;
        }

        let message = ClientMessage::FileAdded { file: record.clone() };
        match existing {
            Some(slot) => {
                tracing::debug!("[Store] Replaced {}", record);
                slots.records[slot] = record;
            }
            None => {
                tracing::debug!("[Store] Added {}", record);
                let slot = slots.records.len();
                slots.index.insert(record.id.clone(), slot);
                slots.records.push(record);
            }
        }
        slots.generation += 1;

        // Published under the write lock so subscribers see mutation order
        self.gateway.publish(message);
        true
    }

    /// Removes the record if present. Unknown ids are a no-op.
    pub fn remove(&self, id: &FileId) -> Option<FileRecord> {
        let mut slots = self.slots.write();
        let removed = slots.take(id)?;
        tracing::debug!("[Store] Removed {}", removed);
        self.gateway.publish(ClientMessage::FileRemoved { id: id.clone() });
        Some(removed)
    }

    /// Removes every record below `dir`, one `FileRemoved` each.
    pub fn remove_under(&self, dir: &Path) -> Vec<FileRecord> {
        let mut slots = self.slots.write();
        let doomed: Vec<FileId> = slots
            .records
            .iter()
            .filter(|r| {
                let path = Path::new(&r.absolute_path);
                path != dir && path.starts_with(dir)
            })
            .map(|r| r.id.clone())
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(record) = slots.take(&id) {
                self.gateway.publish(ClientMessage::FileRemoved { id });
                removed.push(record);
            }
        }
        if !removed.is_empty() {
            tracing::debug!("[Store] Removed {} records under {}", removed.len(), dir.display());
        }
        removed
    }

    pub fn get(&self, id: &FileId) -> Option<FileRecord> {
        let slots = self.slots.read();
        slots.index.get(id).map(|&slot| slots.records[slot].clone())
    }

    /// Up to `limit` records starting at `cursor`.
    pub fn page(&self, cursor: usize, limit: usize) -> Page {
        let slots = self.slots.read();
        let total = slots.records.len();
        let start = cursor.min(total);
        let end = start.saturating_add(limit).min(total);
        let files = slots.records[start..end].to_vec();

        let next_cursor = if limit > 0 && files.len() == limit {
            Some(cursor + files.len())
        } else {
            None
        };

        Page { files, next_cursor, total, cursor }
    }

    pub fn count(&self) -> usize {
        self.slots.read().records.len()
    }

    pub fn generation(&self) -> u64 {
        self.slots.read().generation
    }

    /// A consistent copy of every record, tagged with its generation.
    pub fn snapshot(&self) -> Snapshot {
        let slots = self.slots.read();
        Snapshot { generation: slots.generation, records: slots.records.clone() }
    }

    pub fn last_scan_time(&self) -> Option<DateTime<Utc>> {
        *self.last_scan.read()
    }

    pub fn set_last_scan_time(&self, time: DateTime<Utc>) {
        *self.last_scan.write() = Some(time);
    }
}
