//! The frame ring: a fixed array of per-frame slots reused every N frames.
//!
//! Slot `i` serves frames `i, i + N, i + 2N, ...`. A slot's contents may only
//! be reused once that slot's fence has signaled; the draw loop enforces this
//! by waiting on the fence before touching anything else in the slot.

use std::sync::Arc;

use tracing::debug;

use renderer_rhi::RhiResult;
use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::deletion_queue::DeletionQueue;
use renderer_rhi::device::Device;
use renderer_rhi::sync::{Fence, Semaphore};

use crate::FRAME_OVERLAP;

/// Fixed-size ring indexed by frame number.
#[derive(Debug)]
pub struct FrameRing<T, const N: usize = FRAME_OVERLAP> {
    slots: [T; N],
}

impl<T, const N: usize> FrameRing<T, N> {
    /// Builds every slot up front; `make` receives the slot index.
    pub fn new(make: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: std::array::from_fn(make),
        }
    }

    /// Like [`new`](Self::new), stopping at the first failing slot.
    pub fn try_new<E>(mut make: impl FnMut(usize) -> Result<T, E>) -> Result<Self, E> {
        let mut slots = Vec::with_capacity(N);
        for index in 0..N {
            slots.push(make(index)?);
        }
        Ok(Self::from_vec(slots))
    }

    /// Converts every slot, stopping at the first failure.
    pub fn try_map<U, E>(
        self,
        mut f: impl FnMut(usize, T) -> Result<U, E>,
    ) -> Result<FrameRing<U, N>, E> {
        let mut slots = Vec::with_capacity(N);
        for (index, slot) in self.slots.into_iter().enumerate() {
            slots.push(f(index, slot)?);
        }
        Ok(FrameRing::from_vec(slots))
    }

    fn from_vec(slots: Vec<T>) -> Self {
        match slots.try_into() {
            Ok(slots) => Self { slots },
            Err(_) => unreachable!("frame ring filled with exactly {N} slots"),
        }
    }

    /// Slot serving `frame_number`.
    #[inline]
    pub const fn slot_index(frame_number: u64) -> usize {
        (frame_number % N as u64) as usize
    }

    #[inline]
    pub const fn len(&self) -> usize {
        N
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// The slot for `frame_number`.
    #[inline]
    pub fn get(&self, frame_number: u64) -> &T {
        &self.slots[Self::slot_index(frame_number)]
    }

    #[inline]
    pub fn get_mut(&mut self, frame_number: u64) -> &mut T {
        &mut self.slots[Self::slot_index(frame_number)]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.slots.iter_mut()
    }
}

impl<T, const N: usize> IntoIterator for FrameRing<T, N> {
    type Item = T;
    type IntoIter = std::array::IntoIter<T, N>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

/// One ring slot: the backend's per-frame context plus its private
/// deletion queue.
#[derive(Debug)]
pub struct FrameSlot<C> {
    pub context: C,
    /// Released the next time this slot's fence is confirmed signaled.
    pub deletions: DeletionQueue,
}

impl<C> FrameSlot<C> {
    pub fn new(context: C) -> Self {
        Self {
            context,
            deletions: DeletionQueue::new(),
        }
    }
}

/// Command recording state of one slot.
///
/// The buffer is freed together with its pool.
pub struct FrameCommands {
    pub pool: CommandPool,
    pub buffer: CommandBuffer,
}

impl FrameCommands {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let buffer = CommandBuffer::new(device, &pool)?;
        Ok(Self { pool, buffer })
    }
}

/// Vulkan objects of one frame slot.
pub struct FrameContext {
    pub commands: FrameCommands,
    /// Signaled by image acquisition; waited on by the submit.
    pub swapchain_semaphore: Semaphore,
    /// Signaled by the submit; waited on by present.
    pub render_semaphore: Semaphore,
    /// Created signaled so the first wait returns at once.
    pub render_fence: Fence,
}

impl FrameContext {
    /// Adds the synchronization objects to already created command state.
    pub fn new(device: Arc<Device>, commands: FrameCommands) -> RhiResult<Self> {
        let render_fence = Fence::new(device.clone(), true)?;
        let swapchain_semaphore = Semaphore::new(device.clone())?;
        let render_semaphore = Semaphore::new(device)?;

        Ok(Self {
            commands,
            swapchain_semaphore,
            render_semaphore,
            render_fence,
        })
    }
}

impl Drop for FrameContext {
    fn drop(&mut self) {
        debug!("Destroying frame context");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_cycles() {
        let indices: Vec<usize> = (0..5).map(FrameRing::<(), 2>::slot_index).collect();
        assert_eq!(indices, vec![0, 1, 0, 1, 0]);

        let indices: Vec<usize> = (0..7).map(FrameRing::<(), 3>::slot_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_default_ring_size() {
        let ring: FrameRing<usize> = FrameRing::new(|i| i);
        assert_eq!(ring.len(), FRAME_OVERLAP);
    }

    #[test]
    fn test_get_returns_slot_for_frame_number() {
        let mut ring: FrameRing<usize, 2> = FrameRing::new(|i| i * 10);
        assert_eq!(*ring.get(0), 0);
        assert_eq!(*ring.get(1), 10);
        assert_eq!(*ring.get(u64::MAX), 10);

        *ring.get_mut(2) += 1;
        assert_eq!(*ring.get(0), 1);
    }

    #[test]
    fn test_try_new_stops_at_first_error() {
        let mut built = Vec::new();
        let ring: Result<FrameRing<usize, 3>, String> = FrameRing::try_new(|i| {
            if i == 1 {
                return Err(format!("slot {i} failed"));
            }
            built.push(i);
            Ok(i)
        });
        assert_eq!(ring.unwrap_err(), "slot 1 failed");
        assert_eq!(built, vec![0]);
    }

    #[test]
    fn test_try_map_keeps_slot_order() {
        let ring: FrameRing<usize, 2> = FrameRing::new(|i| i);
        let mapped: FrameRing<String, 2> = ring
            .try_map(|i, v| Ok::<_, ()>(format!("{i}:{v}")))
            .unwrap();
        let slots: Vec<String> = mapped.into_iter().collect();
        assert_eq!(slots, vec!["0:0", "1:1"]);
    }

    #[test]
    fn test_frame_slot_starts_with_empty_queue() {
        let slot = FrameSlot::new(());
        assert!(slot.deletions.is_empty());
    }
}
