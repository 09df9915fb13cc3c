use crate::error::Result;

pub mod replacer;

/// Index of a frame slot in the buffer pool, in range [0, num_frames).
pub type FrameId = usize;

/// Replacer tracks page usage for replacement in case of buffer pool is full.
pub trait Replacer {
    /// Record the event that the given frame id is accessed at current timestamp.
    /// Create a new entry for access history if frame id has not been seen before.
    ///
    /// Return an InvalidFrame error if the frame id is out of range.
    fn record_access(&self, frame_id: FrameId) -> Result<()>;

    /// Find the frame to evict with replace policy(e.g. backward k-distance). Only frames that
    /// are marked as evictable are candidates for eviction.
    ///
    /// Successful eviction of a frame should decrement the size of replacer and remove the frame's
    /// access history.
    ///
    /// Return the frame id if a frame is evicted successfully, None if no frames can be evicted.
    fn evict(&self) -> Option<FrameId>;

    /// Toggle whether a frame is evictable or non-evictable. this function also control replacer
    /// size. Note that size is equal to number of evictable entries.
    ///
    /// If a frame was previously evictable and is to be set to non-evictable, then size should
    /// decrement. If a frame was previously non-evictable and is to be set evictable, then size
    /// should increment.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Check if a frame is evictable. if the frame is not tracked, return false.
    fn is_evictable(&self, frame_id: FrameId) -> bool;

    /// Remove an evictable frame from replacer, along with its access history. This function
    /// should also decrement the replacer size if removal is successful.
    ///
    /// Note that this is different from evicting a frame without check replacer policy.
    ///
    /// If remove is called on a non-evictable frame, return a FrameNotEvictable error. If the
    /// specified frame is not found, do nothing without return any error.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// replacer size.
    fn size(&self) -> usize;
}
