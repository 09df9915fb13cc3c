use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;

use log::debug;

use crate::error::{Error, Result};

use super::{FrameId, Replacer};

/// Book-keeping for a single frame tracked by the replacer.
struct FrameEntry {
    /// Number of accesses recorded since the frame entered the replacer.
    access_count: usize,
    evictable: bool,
    /// The frame's key in either the history or the cache queue, depending
    /// on whether access_count has reached k yet.
    pos: u64,
}

/// LRUKReplacer implements the LRU-k replacement policy.
///
/// The LRU-k algorithm evicts a frame whose backward k-distance is maximum of
/// all frames. Backward k-distance is computed as the difference in time between
/// the current timestamp and the timestamp of k-th previous access.
///
/// A frame with less than k history references is given +inf as its backward
/// k-distance. When multiple frames have +inf backward k-distance, the victim
/// is the frame with the earliest first access.
pub struct LRUKReplacer {
    num_frames: usize,
    k: usize,
    /// Monotonic access clock, advanced on every recorded access.
    clock: u64,
    /// Number of tracked frames that are currently evictable.
    curr_size: usize,
    frames: HashMap<FrameId, FrameEntry>,
    /// Frames with fewer than k accesses, keyed by the time of their first
    /// access. The smallest key is the oldest frame.
    history: BTreeMap<u64, FrameId>,
    /// Frames with at least k accesses, keyed by the time of their most
    /// recent access. The smallest key is the coldest frame.
    cache: BTreeMap<u64, FrameId>,
}

impl LRUKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "replacer k should be larger than zero");
        LRUKReplacer {
            num_frames,
            k,
            clock: 0,
            curr_size: 0,
            frames: HashMap::new(),
            history: BTreeMap::new(),
            cache: BTreeMap::new(),
        }
    }

    /// Record the event that the given frame id is accessed at current timestamp.
    /// Create a new entry for access history if frame id has not been seen before.
    ///
    /// A frame enters the history queue on its first access and stays at its
    /// first-access position until its k-th access promotes it to the cache
    /// queue. From then on every access moves it to the hot end of the cache
    /// queue. New frames start out non-evictable.
    pub fn record_access(&mut self, frame_id: FrameId) -> Result<()> {
        if frame_id >= self.num_frames {
            return Err(Error::InvalidFrame(frame_id));
        }
        let at = self.clock;
        self.clock += 1;
        let k = self.k;
        match self.frames.get_mut(&frame_id) {
            None => {
                self.frames.insert(frame_id, FrameEntry {
                    access_count: 1,
                    evictable: false,
                    pos: at,
                });
                if k == 1 {
                    self.cache.insert(at, frame_id);
                } else {
                    self.history.insert(at, frame_id);
                }
            }
            Some(entry) => {
                entry.access_count += 1;
                if entry.access_count == k {
                    // the frame graduates from the history queue to the
                    // cache queue.
                    self.history.remove(&entry.pos);
                    entry.pos = at;
                    self.cache.insert(at, frame_id);
                } else if entry.access_count > k {
                    self.cache.remove(&entry.pos);
                    entry.pos = at;
                    self.cache.insert(at, frame_id);
                }
                // below k the frame keeps its first-access position, eviction
                // among such frames is ordered by the earliest access.
            }
        }
        Ok(())
    }

    /// Find the frame with the largest backward k-distance and evict that frame.
    /// Only frames that are marked as evictable are candidates for eviction.
    ///
    /// Successful eviction of a frame decrements the size of replacer and
    /// removes the frame's access history.
    ///
    /// Return the frame id if a frame is evicted successfully, None if no
    /// frames can be evicted.
    pub fn evict(&mut self) -> Option<FrameId> {
        if self.curr_size == 0 {
            return None;
        }
        // Frames still below k accesses have an infinite backward k-distance
        // and go first, oldest first access wins. Otherwise fall back to the
        // least recently accessed frame in the cache queue.
        let victim = self
            .history
            .values()
            .chain(self.cache.values())
            .copied()
            .find(|id| self.frames[id].evictable)?;
        self.drop_frame(victim);
        debug!("evicted frame {}", victim);
        Some(victim)
    }

    /// Toggle whether a frame is evictable or non-evictable. this function also
    /// control replacer size. Note that size is equal to number of evictable
    /// entries.
    ///
    /// For untracked frames this is a no-op, no entry may be created for a
    /// frame that has never been accessed.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let entry = self.frames.get_mut(&frame_id);
        if entry.is_none() {
            return;
        }
        let entry = entry.unwrap();
        if entry.evictable == evictable {
            return;
        }
        entry.evictable = evictable;
        if evictable {
            self.curr_size += 1;
        } else {
            self.curr_size -= 1;
        }
    }

    /// Check if a frame is evictable. if the frame is not tracked, return false.
    pub fn is_evictable(&self, frame_id: FrameId) -> bool {
        match self.frames.get(&frame_id) {
            Some(entry) => entry.evictable,
            None => false,
        }
    }

    /// Remove an evictable frame from replacer, along with its access history.
    /// This function also decrements the replacer size if removal is successful.
    ///
    /// Note that this is different from evicting a frame, which always remove
    /// the frame with the largest backward k-distance. This function removes
    /// specified frame id, no matter what its backward k-distance is.
    ///
    /// If remove is called on a non-evictable frame, return a FrameNotEvictable
    /// error. If the specified frame is not found, do nothing without return
    /// any error.
    pub fn remove(&mut self, frame_id: FrameId) -> Result<()> {
        let entry = self.frames.get(&frame_id);
        if entry.is_none() {
            return Ok(());
        }
        if !entry.unwrap().evictable {
            return Err(Error::FrameNotEvictable(frame_id));
        }
        self.drop_frame(frame_id);
        Ok(())
    }

    /// replacer size.
    pub fn size(&self) -> usize {
        self.curr_size
    }

    /// Clear all state of an evictable frame. Callers have checked that the
    /// frame is tracked and evictable.
    fn drop_frame(&mut self, frame_id: FrameId) {
        if let Some(entry) = self.frames.remove(&frame_id) {
            if entry.access_count < self.k {
                self.history.remove(&entry.pos);
            } else {
                self.cache.remove(&entry.pos);
            }
            self.curr_size -= 1;
        }
    }
}

/// SyncLRUKReplacer implements the thread-safe version of LRU-k replacement
/// policy, basically all the heavy lifting are happens in the LRUKReplacer.
pub struct SyncLRUKReplacer {
    inner: Mutex<LRUKReplacer>,
}

impl SyncLRUKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        let inner = Mutex::new(LRUKReplacer::new(num_frames, k));
        SyncLRUKReplacer { inner }
    }
}

impl Replacer for SyncLRUKReplacer {
    /// Record the event that the given frame id is accessed at current timestamp.
    /// Create a new entry for access history if frame id has not been seen before.
    fn record_access(&self, frame_id: FrameId) -> Result<()> {
        let mut guard = self.inner.lock()?;
        guard.record_access(frame_id)
    }

    /// Find the frame with the largest backward k-distance and evict that frame.
    /// Only frames that are marked as evictable are candidates for eviction.
    fn evict(&self) -> Option<FrameId> {
        let mut guard = self.inner.lock().unwrap();
        guard.evict()
    }

    /// Toggle whether a frame is evictable or non-evictable. this function also
    /// control replacer size. Note that size is equal to number of evictable
    /// entries.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut guard = self.inner.lock().unwrap();
        guard.set_evictable(frame_id, evictable)
    }

    /// Check if a frame is evictable. if the frame is not tracked, return false.
    fn is_evictable(&self, frame_id: FrameId) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.is_evictable(frame_id)
    }

    /// Remove an evictable frame from replacer, along with its access history.
    /// This function also decrements the replacer size if removal is successful.
    fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut guard = self.inner.lock()?;
        guard.remove(frame_id)
    }

    /// replacer size.
    fn size(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.size()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_record_access_bounds() -> Result<()> {
        let mut replacer = LRUKReplacer::new(7, 2);

        // frame ids are zero-indexed, 6 is the last valid one.
        replacer.record_access(6)?;
        let got = replacer.record_access(7);
        assert_eq!(Err(Error::InvalidFrame(7)), got);
        let got = replacer.record_access(42);
        assert_eq!(Err(Error::InvalidFrame(42)), got);

        Ok(())
    }

    #[test]
    fn test_evict_order() -> Result<()> {
        let mut replacer = LRUKReplacer::new(7, 2);

        // Scenario: access frames 1..6 once, then give 1, 2, 3 a second
        // access and 1 a third. Frames 4, 5, 6 stay below k and keep an
        // infinite backward k-distance.
        for frame_id in [1, 2, 3, 4, 5, 6, 1, 2, 3, 1] {
            replacer.record_access(frame_id)?;
        }
        for frame_id in 1..=6 {
            replacer.set_evictable(frame_id, true);
        }
        assert_eq!(6, replacer.size());

        // Scenario: frames 4, 5, 6 leave first in first-access order. Frames
        // 2, 3, 1 follow ordered by the recency of their latest access.
        for want in [4, 5, 6, 2, 3, 1] {
            assert_eq!(Some(want), replacer.evict());
        }
        assert_eq!(0, replacer.size());

        Ok(())
    }

    #[test]
    fn test_sub_k_access_keeps_first_access_order() -> Result<()> {
        let mut replacer = LRUKReplacer::new(7, 3);

        // Scenario: frame 1 is accessed twice, frame 2 once. Both stay below
        // k, so repeated accesses do not refresh their position. The victim
        // is ordered by the first access, frame 1 goes first.
        replacer.record_access(1)?;
        replacer.record_access(2)?;
        replacer.record_access(1)?;
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        assert_eq!(Some(1), replacer.evict());
        assert_eq!(Some(2), replacer.evict());

        Ok(())
    }

    #[test]
    fn test_k_equals_one() -> Result<()> {
        let mut replacer = LRUKReplacer::new(7, 1);

        // Scenario: with k = 1 the first access is already the k-th, frames
        // skip the history queue and are eligible through the cache queue
        // right away.
        replacer.record_access(1)?;
        replacer.record_access(2)?;
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);
        assert_eq!(2, replacer.size());

        // Scenario: a repeated access refreshes the frame's recency, plain
        // LRU order decides the victims.
        replacer.record_access(1)?;
        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(1), replacer.evict());
        assert_eq!(None, replacer.evict());

        Ok(())
    }

    #[test]
    fn test_pin_unpin() -> Result<()> {
        let mut replacer = LRUKReplacer::new(7, 3);

        // Scenario: three frames tracked but only frame 2 unpinned.
        replacer.record_access(1)?;
        replacer.record_access(2)?;
        replacer.record_access(3)?;
        replacer.set_evictable(2, true);
        assert_eq!(1, replacer.size());

        assert_eq!(Some(2), replacer.evict());
        assert_eq!(None, replacer.evict());
        assert_eq!(0, replacer.size());

        Ok(())
    }

    #[test]
    fn test_evict_clears_frame_state() -> Result<()> {
        let mut replacer = LRUKReplacer::new(7, 2);

        replacer.record_access(1)?;
        replacer.record_access(1)?;
        replacer.record_access(2)?;
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        // frame 2 has the infinite backward k-distance and goes first.
        assert_eq!(Some(2), replacer.evict());
        assert_eq!(false, replacer.is_evictable(2));

        // Scenario: the evicted frame re-enters as a fresh frame with an
        // empty access history, it lands in the history queue again and is
        // preferred over the cached frame 1.
        replacer.record_access(2)?;
        replacer.set_evictable(2, true);
        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(1), replacer.evict());

        Ok(())
    }

    #[test]
    fn test_remove() -> Result<()> {
        let mut replacer = LRUKReplacer::new(7, 2);

        // removing an untracked frame is a no-op.
        replacer.remove(1)?;
        assert_eq!(0, replacer.size());

        replacer.record_access(1)?;
        replacer.record_access(2)?;
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        // Scenario: removing a pinned frame is a caller bug.
        replacer.set_evictable(2, false);
        let got = replacer.remove(2);
        assert_eq!(Err(Error::FrameNotEvictable(2)), got);

        // Scenario: remove ignores the replace policy, frame 1 disappears
        // even though it is not the current victim candidate.
        replacer.remove(1)?;
        assert_eq!(0, replacer.size());
        assert_eq!(false, replacer.is_evictable(1));
        assert_eq!(None, replacer.evict());

        Ok(())
    }

    #[test]
    fn test_lruk_replacer() -> Result<()> {
        let mut lru_replacer = LRUKReplacer::new(7, 2);

        // Scenario: add six elements to the replacer. We have [1,2,3,4,5]. Frame 6 is non-evictable.
        lru_replacer.record_access(1)?;
        lru_replacer.record_access(2)?;
        lru_replacer.record_access(3)?;
        lru_replacer.record_access(4)?;
        lru_replacer.record_access(5)?;
        lru_replacer.record_access(6)?;
        lru_replacer.set_evictable(1, true);
        lru_replacer.set_evictable(2, true);
        lru_replacer.set_evictable(3, true);
        lru_replacer.set_evictable(4, true);
        lru_replacer.set_evictable(5, true);
        lru_replacer.set_evictable(6, false);
        assert_eq!(5, lru_replacer.size());

        // Scenario: Insert access history for frame 1. Now frame 1 has two access histories.
        // All other frames have max backward k-dist. The order of eviction is [2,3,4,5,1].
        lru_replacer.record_access(1)?;

        // Scenario: Evict three pages from the replacer. Elements with max k-distance should be
        // popped first based on LRU.
        let frame_id = lru_replacer.evict();
        assert_eq!(Some(2), frame_id);
        let frame_id = lru_replacer.evict();
        assert_eq!(Some(3), frame_id);
        let frame_id = lru_replacer.evict();
        assert_eq!(Some(4), frame_id);
        assert_eq!(2, lru_replacer.size());

        // Scenario: Now replacer has frames [5,1].
        // Insert new frames 3, 4, and update access history for 5. We should end with [3,1,5,4]
        lru_replacer.record_access(3)?;
        lru_replacer.record_access(4)?;
        lru_replacer.record_access(5)?;
        lru_replacer.record_access(4)?;
        lru_replacer.set_evictable(3, true);
        lru_replacer.set_evictable(4, true);
        assert_eq!(4, lru_replacer.size());

        // Scenario: continue looking for victims. We expect 3 to be evicted next.
        let frame_id = lru_replacer.evict();
        assert_eq!(Some(3), frame_id);
        assert_eq!(3, lru_replacer.size());

        // Set 6 to be evictable. 6 Should be evicted next since it has max backward k-dist.
        lru_replacer.set_evictable(6, true);
        assert_eq!(4, lru_replacer.size());
        let frame_id = lru_replacer.evict();
        assert_eq!(Some(6), frame_id);
        assert_eq!(3, lru_replacer.size());

        // Now we have [1,5,4]. Continue looking for victims.
        lru_replacer.set_evictable(1, false);
        assert_eq!(2, lru_replacer.size());
        let frame_id = lru_replacer.evict();
        assert_eq!(Some(5), frame_id);
        assert_eq!(1, lru_replacer.size());

        // Update access history for 1. Now we have [4,1]. Next victim is 4.
        lru_replacer.record_access(1)?;
        lru_replacer.record_access(1)?;
        lru_replacer.set_evictable(1, true);
        assert_eq!(2, lru_replacer.size());
        let frame_id = lru_replacer.evict();
        assert_eq!(Some(4), frame_id);

        assert_eq!(1, lru_replacer.size());
        let frame_id = lru_replacer.evict();
        assert_eq!(Some(1), frame_id);
        assert_eq!(0, lru_replacer.size());

        // These operations should not modify size
        let frame_id = lru_replacer.evict();
        assert_eq!(None, frame_id);
        assert_eq!(0, lru_replacer.size());
        lru_replacer.remove(1)?;
        assert_eq!(0, lru_replacer.size());

        Ok(())
    }

    #[test]
    fn test_sync_replacer_concurrent_access() -> Result<()> {
        let replacer = Arc::new(SyncLRUKReplacer::new(64, 2));

        // Scenario: four threads record disjoint frame ranges and mark them
        // evictable. Every frame must end up tracked exactly once.
        let mut threads = Vec::new();
        for t in 0..4 {
            let replacer = Arc::clone(&replacer);
            threads.push(std::thread::spawn(move || {
                for i in 0..16 {
                    let frame_id = t * 16 + i;
                    replacer.record_access(frame_id).unwrap();
                    replacer.set_evictable(frame_id, true);
                }
            }));
        }
        for th in threads {
            th.join().unwrap();
        }
        assert_eq!(64, replacer.size());

        let mut evicted = HashSet::new();
        while let Some(frame_id) = replacer.evict() {
            evicted.insert(frame_id);
        }
        assert_eq!(64, evicted.len());
        assert_eq!(0, replacer.size());

        Ok(())
    }
}
