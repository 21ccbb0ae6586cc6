//! Drives the draw loop over a mock backend whose fences signal at once.

use std::cell::RefCell;

use ash::vk::{self, Handle};
use renderer_renderer::{DrawLoop, FrameGpu, FrameRing, FrameSlot};
use renderer_rhi::RhiResult;
use renderer_rhi::deletion_queue::{DeletionEntry, ResourceReleaser};
use renderer_rhi::swapchain::{AcquireOutcome, PresentOutcome};
use renderer_rhi::sync::WaitOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Released { slot: usize, frame: u64 },
    Recorded { slot: usize },
    Presented { slot: usize, image_index: u32 },
}

#[derive(Default)]
struct ImmediateGpu {
    events: RefCell<Vec<Event>>,
    next_image: RefCell<u32>,
}

/// Handles queued for deletion encode the slot and the frame that queued them.
fn tag(slot: usize, frame: u64) -> vk::Fence {
    vk::Fence::from_raw(((frame + 1) << 8) | slot as u64)
}

fn untag(fence: vk::Fence) -> (usize, u64) {
    let raw = fence.as_raw();
    ((raw & 0xff) as usize, (raw >> 8) - 1)
}

impl ResourceReleaser for ImmediateGpu {
    fn release(&self, entry: DeletionEntry) {
        if let DeletionEntry::Fence(fence) = entry {
            let (slot, frame) = untag(fence);
            self.events.borrow_mut().push(Event::Released { slot, frame });
        }
    }
}

impl FrameGpu for ImmediateGpu {
    type Frame = usize;

    fn wait_fence(&self, _frame: &usize) -> RhiResult<WaitOutcome> {
        Ok(WaitOutcome::Signaled)
    }

    fn reset_fence(&self, _frame: &usize) -> RhiResult<()> {
        Ok(())
    }

    fn acquire_image(&self, _frame: &usize) -> RhiResult<AcquireOutcome> {
        let mut next = self.next_image.borrow_mut();
        let image_index = *next;
        *next = (*next + 1) % 3;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn record(&self, frame: &usize, _image_index: u32) -> RhiResult<()> {
        self.events
            .borrow_mut()
            .push(Event::Recorded { slot: *frame });
        Ok(())
    }

    fn submit(&self, _frame: &usize) -> RhiResult<()> {
        Ok(())
    }

    fn present(&self, frame: &usize, image_index: u32) -> RhiResult<PresentOutcome> {
        self.events.borrow_mut().push(Event::Presented {
            slot: *frame,
            image_index,
        });
        Ok(PresentOutcome::Presented)
    }

    fn signal_fence(&self, _frame: &usize) -> RhiResult<()> {
        Ok(())
    }
}

fn new_loop() -> DrawLoop<ImmediateGpu, 2> {
    DrawLoop::new(ImmediateGpu::default(), FrameRing::new(FrameSlot::new))
}

#[test]
fn test_five_iterations_alternate_slots() {
    let mut draw_loop = new_loop();

    let mut slots = Vec::new();
    for expected in 0..5u64 {
        assert_eq!(draw_loop.frame_number(), expected);
        let report = draw_loop.draw().unwrap();
        assert_eq!(report.frame_number, expected);
        assert!(report.rendered());
        slots.push(report.slot);
    }

    assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    assert_eq!(draw_loop.frame_number(), 5);
}

#[test]
fn test_slot_deletions_flush_between_fence_wait_and_record() {
    let mut draw_loop = new_loop();

    for frame in 0..5u64 {
        let slot = draw_loop.current_frame().context;
        draw_loop
            .current_frame_mut()
            .deletions
            .push(DeletionEntry::Fence(tag(slot, frame)));
        draw_loop.draw().unwrap();
    }

    let events = draw_loop.gpu().events.borrow().clone();
    let records: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::Recorded { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(records.len(), 5);

    // Frame f flushes its slot after frame f - 1 was recorded and before
    // recording itself.
    for frame in 0..5u64 {
        let slot = (frame % 2) as usize;
        let released = events
            .iter()
            .position(|e| *e == Event::Released { slot, frame })
            .unwrap();
        assert!(released < records[frame as usize]);
        assert_eq!(events[records[frame as usize]], Event::Recorded { slot });
        if frame > 0 {
            assert!(released > records[frame as usize - 1]);
        }
    }

    let (_, ring) = draw_loop.into_parts();
    assert!(ring.iter().all(|slot| slot.deletions.is_empty()));
}

#[test]
fn test_each_frame_presents_the_image_it_acquired() {
    let mut draw_loop = new_loop();
    for _ in 0..4 {
        draw_loop.draw().unwrap();
    }

    let presented: Vec<u32> = draw_loop
        .gpu()
        .events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Presented { image_index, .. } => Some(*image_index),
            _ => None,
        })
        .collect();
    assert_eq!(presented, vec![0, 1, 2, 0]);
}
