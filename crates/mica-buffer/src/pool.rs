//! Fixed-size buffer pool with clock-sweep victim selection.

use crate::frame::{Frame, FrameId};
use mica_common::page::PAGE_SIZE;
use mica_common::{MicaError, Result};
use parking_lot::Mutex;
use sysinfo::System;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// A fixed array of page frames plus the clock-sweep cursor.
///
/// The pool itself only selects victims; reading pages in, writing dirty
/// pages out, and maintaining the page table are the pool manager's job.
pub struct BufferPool {
    /// Frames, fixed for the life of the pool.
    frames: Vec<Frame>,
    /// Next frame the clock hand examines.
    next_victim: Mutex<usize>,
}

impl BufferPool {
    /// Creates a new buffer pool.
    ///
    /// # Panics
    ///
    /// Panics if `config.num_frames` is zero.
    pub fn new(config: BufferPoolConfig) -> Self {
        assert!(config.num_frames > 0, "buffer pool needs at least one frame");

        let frames: Vec<_> = (0..config.num_frames).map(|_| Frame::new()).collect();

        Self {
            frames,
            next_victim: Mutex::new(0),
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM,
    /// with a 1,000-frame floor so small machines still cache usefully.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        Self::new(BufferPoolConfig { num_frames })
    }

    /// Returns the number of frames in the pool.
    pub fn size(&self) -> usize {
        self.frames.len()
    }

    /// Returns the frame at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is out of range for this pool.
    #[inline]
    pub fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.0 as usize]
    }

    /// Selects a victim frame by clock sweep.
    ///
    /// Each step examines the frame under the cursor: a frame whose usage
    /// count has decayed to zero is the victim, and the cursor deliberately
    /// stays on it — the caller reuses the frame immediately and resets its
    /// usage count to 1, so the next sweep re-examines it first. Otherwise
    /// an unpinned frame loses one usage count and a pinned frame is
    /// skipped; `pool_size` consecutively pinned frames mean every buffer
    /// is in use and the sweep fails with `NoFreeBuffer`.
    pub fn evict(&self) -> Result<FrameId> {
        let pool_size = self.size();
        let mut next_victim = self.next_victim.lock();
        let mut consecutive_pinned = 0;

        loop {
            let frame = &self.frames[*next_victim];

            if frame.usage_count() == 0 {
                return Ok(FrameId(*next_victim as u32));
            }

            if frame.buffer().ref_count() == 0 {
                frame.decay_usage();
                consecutive_pinned = 0;
            } else {
                consecutive_pinned += 1;
                if consecutive_pinned >= pool_size {
                    return Err(MicaError::NoFreeBuffer);
                }
            }

            *next_victim = (*next_victim + 1) % pool_size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pool(num_frames: usize) -> BufferPool {
        BufferPool::new(BufferPoolConfig { num_frames })
    }

    /// Simulates the pool manager taking over a victim frame.
    fn claim(pool: &BufferPool, frame_id: FrameId) {
        let frame = pool.frame(frame_id);
        frame.set_usage_count(1);
        frame.buffer().pin();
    }

    #[test]
    fn test_pool_new() {
        let pool = create_test_pool(10);
        assert_eq!(pool.size(), 10);
        for i in 0..10 {
            assert_eq!(pool.frame(FrameId(i)).usage_count(), 0);
        }
    }

    #[test]
    #[should_panic(expected = "at least one frame")]
    fn test_pool_zero_frames_panics() {
        create_test_pool(0);
    }

    #[test]
    fn test_evict_fresh_pool_picks_first_frame() {
        let pool = create_test_pool(4);
        assert_eq!(pool.evict().unwrap(), FrameId(0));
    }

    #[test]
    fn test_evict_cursor_stays_on_victim() {
        let pool = create_test_pool(4);

        // Nothing claims the frame between calls, so the cursor must still
        // be parked on it.
        assert_eq!(pool.evict().unwrap(), FrameId(0));
        assert_eq!(pool.evict().unwrap(), FrameId(0));
    }

    #[test]
    fn test_evict_moves_past_claimed_frame() {
        let pool = create_test_pool(4);

        let victim = pool.evict().unwrap();
        assert_eq!(victim, FrameId(0));
        claim(&pool, victim);

        // Frame 0 is now pinned with usage 1; the sweep must move on.
        assert_eq!(pool.evict().unwrap(), FrameId(1));
    }

    #[test]
    fn test_evict_decays_unpinned_frames() {
        let pool = create_test_pool(3);

        for i in 0..3 {
            pool.frame(FrameId(i)).set_usage_count(1);
        }

        // One full sweep decays every frame, then the wrap-around finds
        // frame 0 at zero.
        assert_eq!(pool.evict().unwrap(), FrameId(0));
        assert_eq!(pool.frame(FrameId(1)).usage_count(), 0);
        assert_eq!(pool.frame(FrameId(2)).usage_count(), 0);
    }

    #[test]
    fn test_evict_prefers_lower_usage() {
        let pool = create_test_pool(3);

        pool.frame(FrameId(0)).set_usage_count(3);
        pool.frame(FrameId(1)).set_usage_count(1);
        pool.frame(FrameId(2)).set_usage_count(2);

        // Frame 1 reaches zero first (after one decay round).
        assert_eq!(pool.evict().unwrap(), FrameId(1));
    }

    #[test]
    fn test_evict_all_pinned() {
        let pool = create_test_pool(3);

        for i in 0..3 {
            claim(&pool, FrameId(i));
        }

        let result = pool.evict();
        assert!(matches!(result, Err(MicaError::NoFreeBuffer)));
    }

    #[test]
    fn test_evict_skips_pinned_frames() {
        let pool = create_test_pool(3);

        claim(&pool, FrameId(0));
        claim(&pool, FrameId(1));
        pool.frame(FrameId(2)).set_usage_count(2);

        // Frames 0 and 1 stay pinned; frame 2 decays to zero over repeated
        // sweeps and becomes the victim.
        assert_eq!(pool.evict().unwrap(), FrameId(2));
        assert_eq!(pool.frame(FrameId(0)).usage_count(), 1);
        assert_eq!(pool.frame(FrameId(1)).usage_count(), 1);
    }

    #[test]
    fn test_evict_pinned_counter_resets_on_unpinned_frame() {
        let pool = create_test_pool(2);

        claim(&pool, FrameId(0));
        pool.frame(FrameId(1)).set_usage_count(1);

        // The unpinned frame keeps resetting the consecutive-pinned
        // counter, so the sweep succeeds instead of reporting exhaustion.
        assert_eq!(pool.evict().unwrap(), FrameId(1));
    }
}
