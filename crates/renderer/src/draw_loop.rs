//! The per-frame state machine.
//!
//! One call to [`DrawLoop::draw`] runs these states in order:
//!
//! ```text
//! WAIT_FENCE -> FLUSH_FRAME_DELETIONS -> RESET_FENCE -> ACQUIRE_IMAGE
//!     -> RECORD -> SUBMIT -> PRESENT -> ADVANCE
//! ```
//!
//! The GPU side is behind [`FrameGpu`], so the sequencing can be exercised
//! without a device. Outcomes the loop survives (fence timeout, acquire
//! timeout, suboptimal or out-of-date swapchain) are logged and reported in
//! the returned [`FrameReport`]; every error aborts the frame and is returned.

use tracing::{debug, info_span, warn};

use renderer_rhi::RhiResult;
use renderer_rhi::deletion_queue::ResourceReleaser;
use renderer_rhi::swapchain::{AcquireOutcome, PresentOutcome};
use renderer_rhi::sync::WaitOutcome;

use crate::FRAME_OVERLAP;
use crate::frame::{FrameRing, FrameSlot};

/// GPU operations the draw loop sequences.
///
/// The releaser side flushes frame deletion queues.
pub trait FrameGpu: ResourceReleaser {
    /// Per-slot context (command buffer, semaphores, fence).
    type Frame;

    /// Bounded wait on the slot's fence.
    fn wait_fence(&self, frame: &Self::Frame) -> RhiResult<WaitOutcome>;

    fn reset_fence(&self, frame: &Self::Frame) -> RhiResult<()>;

    /// Asks the swapchain for the next image, signalling the slot's
    /// "image acquired" semaphore.
    fn acquire_image(&self, frame: &Self::Frame) -> RhiResult<AcquireOutcome>;

    /// Records the frame's commands targeting swapchain image `image_index`.
    fn record(&self, frame: &Self::Frame, image_index: u32) -> RhiResult<()>;

    /// Submits the recorded buffer: waits on "image acquired", signals
    /// "render finished" and the slot fence.
    fn submit(&self, frame: &Self::Frame) -> RhiResult<()>;

    /// Presents `image_index` after "render finished".
    fn present(&self, frame: &Self::Frame, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Signals the slot fence with an empty submission.
    ///
    /// Used when a frame is skipped after the fence was reset, so the next
    /// wait on this slot does not stall a full timeout.
    fn signal_fence(&self, frame: &Self::Frame) -> RhiResult<()>;
}

/// What happened during one [`DrawLoop::draw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_number: u64,
    pub slot: usize,
    pub fence: WaitOutcome,
    /// Deferred releases run in FLUSH_FRAME_DELETIONS.
    pub flushed: usize,
    pub acquire: AcquireOutcome,
    /// `None` when no image was acquired and the frame was skipped.
    pub present: Option<PresentOutcome>,
}

impl FrameReport {
    /// The frame reached PRESENT.
    #[inline]
    pub fn rendered(&self) -> bool {
        self.present.is_some()
    }
}

/// Drives frames over a ring of `N` slots.
pub struct DrawLoop<G: FrameGpu, const N: usize = FRAME_OVERLAP> {
    gpu: G,
    ring: FrameRing<FrameSlot<G::Frame>, N>,
    frame_number: u64,
}

impl<G: FrameGpu, const N: usize> DrawLoop<G, N> {
    pub fn new(gpu: G, ring: FrameRing<FrameSlot<G::Frame>, N>) -> Self {
        Self {
            gpu,
            ring,
            frame_number: 0,
        }
    }

    /// Number of frames that completed ADVANCE.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The slot for `frame_number mod N`.
    #[inline]
    pub fn current_frame(&self) -> &FrameSlot<G::Frame> {
        self.ring.get(self.frame_number)
    }

    /// Mutable access, e.g. to queue per-frame releases.
    #[inline]
    pub fn current_frame_mut(&mut self) -> &mut FrameSlot<G::Frame> {
        self.ring.get_mut(self.frame_number)
    }

    #[inline]
    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    /// Hands back the backend and the ring for teardown.
    pub fn into_parts(self) -> (G, FrameRing<FrameSlot<G::Frame>, N>) {
        (self.gpu, self.ring)
    }

    /// Runs one pass of the state machine.
    ///
    /// # Errors
    ///
    /// Any error is fatal for the frame; the counter is not advanced.
    pub fn draw(&mut self) -> RhiResult<FrameReport> {
        let frame_number = self.frame_number;
        let slot_index = FrameRing::<FrameSlot<G::Frame>, N>::slot_index(frame_number);
        let _span = info_span!("frame", frame_number, slot = slot_index).entered();

        let slot = self.ring.get_mut(frame_number);

        // WAIT_FENCE
        let fence = self.gpu.wait_fence(&slot.context)?;
        if fence == WaitOutcome::TimedOut {
            warn!(
                "Fence wait for slot {} timed out; reusing the slot anyway",
                slot_index
            );
        }

        // FLUSH_FRAME_DELETIONS
        let flushed = slot.deletions.len();
        slot.deletions.flush(&self.gpu);

        // RESET_FENCE
        self.gpu.reset_fence(&slot.context)?;

        // ACQUIRE_IMAGE
        let acquire = self.gpu.acquire_image(&slot.context)?;
        let present = match acquire {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    warn!("Swapchain is suboptimal; rendering anyway");
                }

                // RECORD, SUBMIT, PRESENT
                self.gpu.record(&slot.context, image_index)?;
                self.gpu.submit(&slot.context)?;
                let presented = self.gpu.present(&slot.context, image_index)?;
                if presented == PresentOutcome::Suboptimal {
                    warn!("Presented to a suboptimal swapchain");
                }
                Some(presented)
            }
            skipped => {
                warn!("No swapchain image ({:?}); skipping frame", skipped);
                self.gpu.signal_fence(&slot.context)?;
                None
            }
        };

        // ADVANCE
        self.frame_number += 1;
        debug!("Frame {} done", frame_number);

        Ok(FrameReport {
            frame_number,
            slot: slot_index,
            fence,
            flushed,
            acquire,
            present,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use ash::vk;
    use renderer_rhi::RhiError;
    use renderer_rhi::deletion_queue::DeletionEntry;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Release(usize),
        Reset(usize),
        Acquire(usize),
        Record(usize),
        Submit(usize),
        Present(usize),
        Signal(usize),
    }

    /// Backend whose outcomes are scripted per call.
    struct ScriptedGpu {
        calls: RefCell<Vec<Call>>,
        fence: Cell<WaitOutcome>,
        acquire: Cell<AcquireOutcome>,
        fail_submit: Cell<bool>,
        fail_record: Cell<bool>,
    }

    impl ScriptedGpu {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fence: Cell::new(WaitOutcome::Signaled),
                acquire: Cell::new(AcquireOutcome::Acquired {
                    image_index: 0,
                    suboptimal: false,
                }),
                fail_submit: Cell::new(false),
                fail_record: Cell::new(false),
            }
        }

        fn log(&self, call: Call) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl ResourceReleaser for ScriptedGpu {
        fn release(&self, entry: DeletionEntry) {
            if let DeletionEntry::Fence(fence) = entry {
                self.log(Call::Release(vk::Handle::as_raw(fence) as usize));
            }
        }
    }

    impl FrameGpu for ScriptedGpu {
        type Frame = usize;

        fn wait_fence(&self, frame: &usize) -> RhiResult<WaitOutcome> {
            self.log(Call::Wait(*frame));
            Ok(self.fence.get())
        }

        fn reset_fence(&self, frame: &usize) -> RhiResult<()> {
            self.log(Call::Reset(*frame));
            Ok(())
        }

        fn acquire_image(&self, frame: &usize) -> RhiResult<AcquireOutcome> {
            self.log(Call::Acquire(*frame));
            Ok(self.acquire.get())
        }

        fn record(&self, frame: &usize, _image_index: u32) -> RhiResult<()> {
            self.log(Call::Record(*frame));
            if self.fail_record.get() {
                return Err(RhiError::SwapchainError(
                    "image index 7 out of range for 3 swapchain image(s)".to_string(),
                ));
            }
            Ok(())
        }

        fn submit(&self, frame: &usize) -> RhiResult<()> {
            self.log(Call::Submit(*frame));
            if self.fail_submit.get() {
                return Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST));
            }
            Ok(())
        }

        fn present(&self, frame: &usize, _image_index: u32) -> RhiResult<PresentOutcome> {
            self.log(Call::Present(*frame));
            Ok(PresentOutcome::Presented)
        }

        fn signal_fence(&self, frame: &usize) -> RhiResult<()> {
            self.log(Call::Signal(*frame));
            Ok(())
        }
    }

    fn draw_loop() -> DrawLoop<ScriptedGpu, 2> {
        DrawLoop::new(ScriptedGpu::new(), FrameRing::new(FrameSlot::new))
    }

    #[test]
    fn test_states_run_in_order() {
        let mut draw_loop = draw_loop();
        draw_loop
            .current_frame_mut()
            .deletions
            .push(DeletionEntry::Fence(vk::Handle::from_raw(7)));

        let report = draw_loop.draw().unwrap();

        assert_eq!(
            *draw_loop.gpu().calls.borrow(),
            vec![
                Call::Wait(0),
                Call::Release(7),
                Call::Reset(0),
                Call::Acquire(0),
                Call::Record(0),
                Call::Submit(0),
                Call::Present(0),
            ]
        );
        assert_eq!(report.flushed, 1);
        assert!(report.rendered());
        assert_eq!(draw_loop.frame_number(), 1);
    }

    #[test]
    fn test_fence_timeout_proceeds() {
        let mut draw_loop = draw_loop();
        draw_loop.gpu().fence.set(WaitOutcome::TimedOut);

        let report = draw_loop.draw().unwrap();

        assert_eq!(report.fence, WaitOutcome::TimedOut);
        assert!(report.rendered());
        assert_eq!(draw_loop.frame_number(), 1);
    }

    #[test]
    fn test_missing_image_skips_to_advance() {
        for outcome in [
            AcquireOutcome::TimedOut,
            AcquireOutcome::NotReady,
            AcquireOutcome::OutOfDate,
        ] {
            let mut draw_loop = draw_loop();
            draw_loop.gpu().acquire.set(outcome);

            let report = draw_loop.draw().unwrap();

            assert_eq!(report.acquire, outcome);
            assert!(!report.rendered());
            assert_eq!(
                *draw_loop.gpu().calls.borrow(),
                vec![
                    Call::Wait(0),
                    Call::Reset(0),
                    Call::Acquire(0),
                    Call::Signal(0),
                ]
            );
            assert_eq!(draw_loop.frame_number(), 1);
        }
    }

    #[test]
    fn test_suboptimal_acquire_still_renders() {
        let mut draw_loop = draw_loop();
        draw_loop.gpu().acquire.set(AcquireOutcome::Acquired {
            image_index: 1,
            suboptimal: true,
        });

        assert!(draw_loop.draw().unwrap().rendered());
    }

    #[test]
    fn test_submit_error_is_fatal_and_does_not_advance() {
        let mut draw_loop = draw_loop();
        draw_loop.gpu().fail_submit.set(true);

        assert!(draw_loop.draw().is_err());
        assert_eq!(draw_loop.frame_number(), 0);
        assert!(!draw_loop.gpu().calls.borrow().contains(&Call::Present(0)));
    }

    #[test]
    fn test_record_error_stops_before_submit() {
        let mut draw_loop = draw_loop();
        draw_loop.gpu().fail_record.set(true);

        let err = draw_loop.draw().unwrap_err();

        assert!(matches!(err, RhiError::SwapchainError(_)));
        assert_eq!(draw_loop.frame_number(), 0);
        let calls = draw_loop.gpu().calls.borrow();
        assert_eq!(calls.last(), Some(&Call::Record(0)));
        assert!(!calls.contains(&Call::Submit(0)));
    }

    #[test]
    fn test_current_frame_follows_counter() {
        let mut draw_loop = draw_loop();
        assert_eq!(draw_loop.current_frame().context, 0);
        draw_loop.draw().unwrap();
        assert_eq!(draw_loop.current_frame().context, 1);
        draw_loop.draw().unwrap();
        assert_eq!(draw_loop.current_frame().context, 0);
    }
}
