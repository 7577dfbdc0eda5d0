//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for fences and semaphores, and the per-image frame state
//! machine driven by the swapchain.

use crate::render::backends::vulkan::{DeviceRef, VulkanResult};
use ash::vk;

/// Binary semaphore for GPU-GPU ordering
pub struct Semaphore {
    device: DeviceRef,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: DeviceRef) -> VulkanResult<Self> {
        let semaphore = device.create_semaphore()?;
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}

/// Fence for CPU-GPU synchronization
pub struct Fence {
    device: DeviceRef,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: DeviceRef, signaled: bool) -> VulkanResult<Self> {
        let fence = device.create_fence(signaled)?;
        Ok(Self { device, fence })
    }

    /// Wait for fence
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        self.device.wait_for_fence(self.fence, timeout)
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        self.device.reset_fence(self.fence)
    }

    /// Get the fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}

/// Where a swapchain image is in its frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    /// Not in use by the CPU
    #[default]
    Idle,
    /// Being acquired from the presentation engine
    Acquiring,
    /// Its command buffer is being recorded
    Recording,
    /// Submitted to the graphics queue
    Submitted,
    /// Queued for presentation
    Presenting,
}

impl FramePhase {
    /// Whether `self -> next` is a legal step
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Acquiring)
                | (Self::Acquiring, Self::Recording)
                | (Self::Recording, Self::Submitted)
                | (Self::Submitted, Self::Presenting)
                | (Self::Presenting, Self::Idle)
                // Frame abandoned before submission (swapchain rebuilt)
                | (Self::Acquiring | Self::Recording, Self::Idle)
        )
    }
}

/// Frame state of one swapchain image
///
/// `serial` counts completed fence waits. Per-frame resources tagged with an
/// older serial are no longer in use by the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameState {
    phase: FramePhase,
    serial: u64,
}

impl FrameState {
    /// Current phase
    pub const fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Number of times the image's fence has been waited
    pub const fn serial(&self) -> u64 {
        self.serial
    }

    /// Move to `next`; illegal steps are logged and applied anyway
    pub fn transition(&mut self, image_index: u32, next: FramePhase) -> bool {
        let legal = self.phase.can_transition_to(next);
        if !legal {
            log::error!(
                "Invalid frame state transition for image {}: {:?} -> {:?}",
                image_index,
                self.phase,
                next
            );
        }
        self.phase = next;
        legal
    }

    /// Record that the image's fence was waited
    pub fn fence_waited(&mut self) {
        self.serial += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::{HeadlessDevice, ObjectKind};
    use std::sync::Arc;

    #[test]
    fn test_raii_destroys_objects() {
        let device = Arc::new(HeadlessDevice::default());
        {
            let _semaphore = Semaphore::new(device.clone()).unwrap();
            let fence = Fence::new(device.clone(), true).unwrap();
            fence.wait(u64::MAX).unwrap();
            fence.reset().unwrap();
            assert_eq!(device.live_count(ObjectKind::Fence), 1);
            assert_eq!(device.live_count(ObjectKind::Semaphore), 1);
        }
        assert_eq!(device.live_count(ObjectKind::Fence), 0);
        assert_eq!(device.live_count(ObjectKind::Semaphore), 0);
    }

    #[test]
    fn test_frame_cycle_is_legal() {
        let mut state = FrameState::default();
        for phase in [
            FramePhase::Acquiring,
            FramePhase::Recording,
            FramePhase::Submitted,
            FramePhase::Presenting,
            FramePhase::Idle,
        ] {
            assert!(state.transition(0, phase));
        }
        assert_eq!(state.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_illegal_transition_reported() {
        let mut state = FrameState::default();
        assert!(!state.transition(1, FramePhase::Submitted));
        assert_eq!(state.phase(), FramePhase::Submitted);
        assert!(!FramePhase::Submitted.can_transition_to(FramePhase::Idle));
        assert!(FramePhase::Recording.can_transition_to(FramePhase::Idle));
    }

    #[test]
    fn test_serial_counts_fence_waits() {
        let mut state = FrameState::default();
        state.fence_waited();
        state.fence_waited();
        assert_eq!(state.serial(), 2);
    }
}
