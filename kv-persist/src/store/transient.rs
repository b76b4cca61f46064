use std::{
    collections::BTreeMap,
    ops::Range,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use log::debug;

use crate::{
    error::Error,
    store::{Backend, Transaction},
    utils::scan_all,
};

/// Always-in-memory keyspace with the same transactional contract as TiKV.
///
/// Reads see the latest committed data plus the transaction's own writes.
/// Commit fails with [`Error::StaleObject`] if another transaction committed
/// one of the written keys in the meantime. Clones share one keyspace.
///
/// Deleted keys leave a tombstone until no open transaction started before
/// the delete.
#[derive(Clone, Default)]
pub struct TransientStore {
    inner: Arc<Mutex<Keyspace>>,
}

#[derive(Default)]
struct Keyspace {
    entries: BTreeMap<Vec<u8>, Versioned>,
    sequence: u64,
    // start sequence of every open transaction, with a count
    open: BTreeMap<u64, usize>,
}

struct Versioned {
    sequence: u64,
    // None marks a deleted key
    value: Option<Vec<u8>>,
}

impl Keyspace {
    fn enter(&mut self, start: u64) {
        *self.open.entry(start).or_default() += 1;
    }

    fn leave(&mut self, start: u64) {
        if let Some(count) = self.open.get_mut(&start) {
            *count -= 1;
            if *count == 0 {
                self.open.remove(&start);
            }
        }
    }

    /// Drops tombstones that no open transaction can conflict with.
    fn prune(&mut self) {
        let horizon = self.open.keys().next().copied().unwrap_or(self.sequence);
        self.entries
            .retain(|_, entry| entry.value.is_some() || entry.sequence > horizon);
    }
}

impl TransientStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn keyspace(&self) -> MutexGuard<'_, Keyspace> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live committed keys.
    pub fn len(&self) -> usize {
        self.keyspace()
            .entries
            .values()
            .filter(|v| v.value.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every committed key.
    pub fn clear(&self) {
        let mut keyspace = self.keyspace();
        keyspace.sequence += 1;
        let sequence = keyspace.sequence;
        for entry in keyspace.entries.values_mut() {
            entry.sequence = sequence;
            entry.value = None;
        }
        keyspace.prune();
    }

    fn committed(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.keyspace()
            .entries
            .get(key)
            .and_then(|v| v.value.clone())
    }
}

#[async_trait]
impl Backend for TransientStore {
    type Txn = TransientTransaction;

    async fn begin(&self) -> Result<TransientTransaction, Error> {
        let start = {
            let mut keyspace = self.keyspace();
            let start = keyspace.sequence;
            keyspace.enter(start);
            start
        };
        Ok(TransientTransaction {
            store: self.clone(),
            start,
            writes: BTreeMap::new(),
        })
    }

    fn name(&self) -> &'static str {
        "transient"
    }
}

pub struct TransientTransaction {
    store: TransientStore,
    start: u64,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

#[async_trait]
impl Transaction for TransientTransaction {
    async fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        match self.writes.get(&key) {
            Some(value) => Ok(value.clone()),
            None => Ok(self.store.committed(&key)),
        }
    }

    async fn get_latest(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        self.get(key).await
    }

    async fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), Error> {
        self.writes.insert(key, Some(value));
        Ok(())
    }

    async fn delete(&mut self, key: Vec<u8>) -> Result<(), Error> {
        self.writes.insert(key, None);
        Ok(())
    }

    async fn scan(
        &mut self,
        range: Range<Vec<u8>>,
        limit: u32,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        if range.start >= range.end {
            return Ok(Vec::new());
        }
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .store
            .keyspace()
            .entries
            .range(range.clone())
            .filter_map(|(k, v)| v.value.clone().map(|value| (k.clone(), value)))
            .collect();
        for (key, value) in self.writes.range(range) {
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        Ok(merged.into_iter().take(limit as usize).collect())
    }

    async fn delete_range(
        &mut self,
        range: Range<Vec<u8>>,
        page_size: u32,
    ) -> Result<u64, Error> {
        let keys = scan_all(self, range, page_size)
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect::<Vec<_>>();
        let deleted = keys.len() as u64;
        for key in keys {
            self.writes.insert(key, None);
        }
        Ok(deleted)
    }

    async fn commit(&mut self) -> Result<(), Error> {
        let writes = std::mem::take(&mut self.writes);
        let mut keyspace = self.store.keyspace();

        if let Some(key) = writes.keys().find(|key| {
            keyspace
                .entries
                .get(*key)
                .is_some_and(|v| v.sequence > self.start)
        }) {
            return Err(Error::StaleObject(String::from_utf8_lossy(key).into_owned()));
        }

        keyspace.sequence += 1;
        let sequence = keyspace.sequence;
        let written = writes.len();
        for (key, value) in writes {
            keyspace.entries.insert(key, Versioned { sequence, value });
        }
        keyspace.leave(self.start);
        keyspace.enter(sequence);
        keyspace.prune();
        self.start = sequence;
        debug!("transient commit #{}, {} keys written", sequence, written);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        self.writes.clear();
        Ok(())
    }
}

impl Drop for TransientTransaction {
    fn drop(&mut self) {
        self.store.keyspace().leave(self.start);
    }
}
