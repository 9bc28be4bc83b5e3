//! Per-sequence frame cache with fixed slots
//!
//! Structure: `Vec<Option<VolumeFrame>>`, one slot per frame index.
//! - O(1) lookup, insert and clear by index
//! - A populated slot always holds a fully decoded frame
//! - Memory tracking via MemoryBudget
//!
//! Default policy keeps every frame until explicitly cleared. Bounded
//! policies evict the least-recently-used slot (IndexSet order), never the
//! pinned (currently displayed) one.

use indexmap::IndexSet;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::cache_man::MemoryBudget;
use crate::entities::VolumeFrame;

/// Cache retention policy
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePolicy {
    /// Keep every loaded frame until cleared (no eviction)
    #[default]
    KeepAll,
    /// Keep at most `max_frames` frames
    Lru { max_frames: usize },
    /// Keep at most `bytes` of voxel data
    MaxBytes { bytes: usize },
    /// Byte limit derived from available system memory
    MemoryBudget { fraction: f64, reserve_gb: f64 },
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

/// Fixed-size frame cache indexed by frame number
#[derive(Debug)]
pub struct FrameCache {
    slots: Vec<Option<VolumeFrame>>,
    policy: CachePolicy,
    /// Recency order, front = least recently used
    lru_order: IndexSet<usize>,
    budget: MemoryBudget,
    /// Slot that must survive eviction (displayed frame)
    pinned: Option<usize>,
    stats: CacheStats,
}

impl FrameCache {
    /// Create cache with `total_frames` empty slots
    pub fn new(total_frames: usize, policy: CachePolicy) -> Self {
        debug!("FrameCache created: {} slots, policy={:?}", total_frames, policy);
        Self {
            slots: (0..total_frames).map(|_| None).collect(),
            policy,
            lru_order: IndexSet::new(),
            budget: Self::budget_for(policy),
            pinned: None,
            stats: CacheStats::default(),
        }
    }

    fn budget_for(policy: CachePolicy) -> MemoryBudget {
        match policy {
            CachePolicy::MaxBytes { bytes } => MemoryBudget::with_limit(bytes),
            CachePolicy::MemoryBudget { fraction, reserve_gb } => MemoryBudget::from_system(fraction, reserve_gb),
            CachePolicy::KeepAll | CachePolicy::Lru { .. } => MemoryBudget::unlimited(),
        }
    }

    /// Number of slots (total frames)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Get frame without side effects. Never triggers a load.
    pub fn get(&self, index: usize) -> Option<&VolumeFrame> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Check presence for a load request: records hit/miss and refreshes
    /// LRU order on hit.
    pub fn lookup(&mut self, index: usize) -> bool {
        if self.contains(index) {
            self.stats.hits += 1;
            self.lru_order.shift_remove(&index);
            self.lru_order.insert(index);
            true
        } else {
            self.stats.misses += 1;
            false
        }
    }

    /// Insert frame, replacing any previous one in the slot.
    ///
    /// Returns false if index is out of range (frame dropped).
    pub fn insert(&mut self, index: usize, frame: VolumeFrame) -> bool {
        if index >= self.slots.len() {
            warn!("Cache insert out of range: {} (capacity {})", index, self.slots.len());
            return false;
        }

        // Release the old frame first so it doesn't count against the budget
        self.clear(index);

        let size = frame.mem();
        self.evict_until_fits(1, size);

        self.slots[index] = Some(frame);
        self.lru_order.insert(index);
        self.budget.add(size);

        debug!("Cached frame {} ({} bytes, {} cached)", index, size, self.len());
        true
    }

    /// Evict LRU slots until `frames` more frames of `bytes` total fit the policy
    fn evict_until_fits(&mut self, frames: usize, bytes: usize) {
        loop {
            let over_count = match self.policy {
                CachePolicy::Lru { max_frames } => self.len() + frames > max_frames.max(1),
                _ => false,
            };
            if !over_count && !self.budget.would_exceed(bytes) {
                break;
            }
            if !self.evict_oldest() {
                break;
            }
        }
    }

    /// Evict least recently used unpinned slot. Returns false if nothing evictable.
    fn evict_oldest(&mut self) -> bool {
        let pinned = self.pinned;
        let Some(pos) = self.lru_order.iter().position(|&idx| Some(idx) != pinned) else {
            return false;
        };
        let Some(index) = self.lru_order.shift_remove_index(pos) else {
            return false;
        };
        if let Some(frame) = self.slots[index].take() {
            self.budget.free(frame.mem());
            self.stats.evictions += 1;
            debug!("LRU evicted frame {} (freed {} bytes)", index, frame.mem());
        }
        true
    }

    /// Release a single frame, slot becomes empty
    pub fn clear(&mut self, index: usize) {
        if let Some(frame) = self.slots.get_mut(index).and_then(|s| s.take()) {
            self.budget.free(frame.mem());
            self.lru_order.shift_remove(&index);
            debug!("Cleared frame {} ({} bytes freed)", index, frame.mem());
        }
    }

    /// Release every populated slot
    pub fn clear_all(&mut self) {
        let count = self.len();
        let freed = self.budget.usage();
        for slot in &mut self.slots {
            *slot = None;
        }
        self.lru_order.clear();
        self.budget.reset();
        debug!("Cleared entire cache: {} frames, {} MB freed", count, freed / 1024 / 1024);
    }

    /// Mark the displayed frame so bounded policies never evict it
    pub fn pin(&mut self, index: Option<usize>) {
        self.pinned = index;
    }

    /// Change retention policy. Shrinks immediately if the new one is tighter.
    pub fn set_policy(&mut self, policy: CachePolicy) {
        if self.policy == policy {
            return;
        }
        debug!("Cache policy: {:?} -> {:?}", self.policy, policy);
        let usage = self.budget.usage();
        self.policy = policy;
        self.budget = Self::budget_for(policy);
        self.budget.add(usage);
        self.evict_until_fits(0, 0);
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of populated slots
    pub fn len(&self) -> usize {
        self.lru_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru_order.is_empty()
    }

    /// Bytes held by cached frames
    pub fn mem(&self) -> usize {
        self.budget.usage()
    }

    /// Indices of populated slots in ascending order
    pub fn populated(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
    }

    /// First empty slot at or after `from`
    pub fn first_empty_from(&self, from: usize) -> Option<usize> {
        (from..self.slots.len()).find(|&i| self.slots[i].is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Endianness, VolumeDims, VoxelFormat};

    fn make_frame(bytes: usize) -> VolumeFrame {
        VolumeFrame::new(vec![0u8; bytes], VolumeDims::new(bytes, 1, 1), VoxelFormat::Uint8, Endianness::Little)
            .unwrap()
    }

    #[test]
    fn test_cache_basic_operations() {
        let mut cache = FrameCache::new(4, CachePolicy::KeepAll);
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 4);

        assert!(cache.insert(2, make_frame(16)));
        assert!(cache.contains(2));
        assert!(!cache.contains(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.mem(), 16);

        // Replacing a slot doesn't leak memory accounting
        cache.insert(2, make_frame(8));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.mem(), 8);

        cache.clear(2);
        assert!(cache.get(2).is_none());
        assert_eq!(cache.mem(), 0);
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut cache = FrameCache::new(2, CachePolicy::KeepAll);
        assert!(!cache.insert(5, make_frame(4)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keep_all_never_evicts() {
        let mut cache = FrameCache::new(100, CachePolicy::KeepAll);
        for i in 0..100 {
            cache.insert(i, make_frame(64));
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.stats().evictions(), 0);
    }

    #[test]
    fn test_clear_all() {
        let mut cache = FrameCache::new(5, CachePolicy::KeepAll);
        for i in 0..5 {
            cache.insert(i, make_frame(4));
        }
        cache.clear_all();
        assert!(cache.is_empty());
        assert_eq!(cache.mem(), 0);
        assert_eq!(cache.populated().count(), 0);
        assert_eq!(cache.first_empty_from(0), Some(0));
    }

    #[test]
    fn test_lru_evicts_oldest_but_not_pinned() {
        let mut cache = FrameCache::new(10, CachePolicy::Lru { max_frames: 2 });
        cache.insert(0, make_frame(4));
        cache.pin(Some(0));
        cache.insert(1, make_frame(4));
        cache.insert(2, make_frame(4));

        // 0 is oldest but pinned, so 1 goes
        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert_eq!(cache.stats().evictions(), 1);
    }

    #[test]
    fn test_lookup_refreshes_recency() {
        let mut cache = FrameCache::new(10, CachePolicy::Lru { max_frames: 2 });
        cache.insert(0, make_frame(4));
        cache.insert(1, make_frame(4));
        assert!(cache.lookup(0));
        cache.insert(2, make_frame(4));

        assert!(cache.contains(0));
        assert!(!cache.contains(1));
    }

    #[test]
    fn test_byte_limit() {
        let mut cache = FrameCache::new(10, CachePolicy::MaxBytes { bytes: 20 });
        cache.insert(0, make_frame(8));
        cache.insert(1, make_frame(8));
        cache.insert(2, make_frame(8));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(0));
        assert!(cache.mem() <= 20);
    }

    #[test]
    fn test_statistics() {
        let mut cache = FrameCache::new(4, CachePolicy::KeepAll);
        cache.insert(0, make_frame(4));

        assert!(cache.lookup(0));
        assert!(!cache.lookup(3));
        let stats = cache.stats();
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_set_policy_shrinks() {
        let mut cache = FrameCache::new(6, CachePolicy::KeepAll);
        for i in 0..6 {
            cache.insert(i, make_frame(4));
        }
        cache.set_policy(CachePolicy::Lru { max_frames: 3 });
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.populated().collect::<Vec<_>>(), vec![3, 4, 5]);
    }
}
