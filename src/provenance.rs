//! Block provenance cache: which content source owns a block id.
//!
//! The map is published through an [`ArcSwap`]. A rebuild assembles a fresh
//! map off to the side and stores it in one atomic pointer swap; readers
//! `load()` the current map without taking any lock and never see a
//! partial map.
//!
//! Readiness is generation based: [`invalidate`](ProvenanceCache::invalidate)
//! bumps the generation, and a rebuild only counts as current if no
//! invalidation landed while it was enumerating.

use crate::error::Result;
use crate::protocol::ProvenanceRecord;
use crate::types::BlockId;
use crate::world::ContentSources;
use arc_swap::ArcSwap;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type RecordMap = HashMap<BlockId, ProvenanceRecord>;

pub struct ProvenanceCache {
    records: ArcSwap<RecordMap>,
    /// Bumped by every invalidation.
    generation: AtomicU64,
    /// Generation the published map was built against.
    built_generation: AtomicU64,
    /// Serialises rebuilds; readers never touch it.
    rebuild_lock: Mutex<()>,
    base_group: String,
    base_name: String,
}

impl ProvenanceCache {
    /// `base_label` is the `"<group>:<name>"` reported for base content.
    pub fn new(base_label: &str) -> Self {
        let (base_group, base_name) = base_label
            .split_once(':')
            .unwrap_or((base_label, base_label));
        Self {
            records: ArcSwap::from_pointee(HashMap::new()),
            generation: AtomicU64::new(1),
            built_generation: AtomicU64::new(0),
            rebuild_lock: Mutex::new(()),
            base_group: base_group.to_string(),
            base_name: base_name.to_string(),
        }
    }

    pub fn base_label(&self) -> String {
        format!("{}:{}", self.base_group, self.base_name)
    }

    pub fn is_ready(&self) -> bool {
        self.built_generation.load(Ordering::Acquire) == self.generation.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.records.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current snapshot. Stays valid even if a rebuild swaps in a new map.
    pub fn snapshot(&self) -> Arc<RecordMap> {
        self.records.load_full()
    }

    /// Mark the cache stale; the next [`ensure_ready`](Self::ensure_ready)
    /// rebuilds it. Lookups keep serving the old map until then. A rebuild
    /// already in flight will not mark the cache ready.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Rebuild from every loaded content source and swap the result in.
    ///
    /// On enumeration failure the old map stays published and the cache
    /// stays not-ready.
    pub fn rebuild(&self, sources: &dyn ContentSources) -> Result<usize> {
        let _guard = self.rebuild_lock.lock();
        let generation = self.generation.load(Ordering::Acquire);

        let loaded = match sources.list_loaded() {
            Ok(loaded) => loaded,
            Err(e) => {
                self.invalidate();
                return Err(e);
            }
        };

        let mut fresh = RecordMap::new();
        for source in &loaded {
            let record = if source.is_base {
                ProvenanceRecord::new(&self.base_group, &self.base_name, true)
            } else {
                ProvenanceRecord::new(&source.group, &source.name, false)
            };
            for id in &source.owned_block_ids {
                fresh.insert(id.clone(), record.clone());
            }
        }

        let count = fresh.len();
        self.records.store(Arc::new(fresh));
        self.built_generation.store(generation, Ordering::Release);
        if self.is_ready() {
            debug!(
                "Provenance cache rebuilt: {} ids from {} sources",
                count,
                loaded.len()
            );
        } else {
            debug!("Provenance cache invalidated during rebuild, staying stale");
        }
        Ok(count)
    }

    /// Rebuild if not ready or empty. Failures are logged and swallowed so
    /// callers can go on resolving against `unknown` records. Returns
    /// whether the cache is ready afterwards.
    pub fn ensure_ready(&self, sources: &dyn ContentSources) -> bool {
        if self.is_ready() && !self.is_empty() {
            return true;
        }
        match self.rebuild(sources) {
            Ok(_) => self.is_ready(),
            Err(e) => {
                warn!("Provenance rebuild failed, will retry: {}", e);
                false
            }
        }
    }

    pub fn lookup(&self, id: &BlockId) -> ProvenanceRecord {
        self.records
            .load()
            .get(id)
            .cloned()
            .unwrap_or_else(ProvenanceRecord::unknown)
    }

    pub fn is_vanilla(&self, id: &BlockId) -> bool {
        self.lookup(id).is_base_content
    }

    /// Owner label for display. Unclaimed ids without a namespace count as
    /// base content; unclaimed namespaced ids are `unknown:unknown`.
    pub fn owner_label(&self, id: &BlockId) -> String {
        let record = self.lookup(id);
        if record.is_unknown() && id.namespace().is_none() {
            return self.base_label();
        }
        record.label()
    }
}
