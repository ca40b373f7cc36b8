//! Vulkan binding for the frame scheduler, built on [`ash`].
//!
//! [`VulkanBackend`] wraps device, queue and swapchain handles the application
//! created during startup — instance creation, adapter selection and swapchain
//! construction stay with the application, since none of that is frame-lifecycle
//! work. The backend owns only what it creates itself: a command pool and the
//! fences, semaphores and command buffers the scheduler asks for.

use std::slice;

use anyhow::Result;
use ash::vk;

use crate::backend::{AcquireOutcome, GpuBackend, ImageIndex, ImageState, PresentOutcome};
use crate::error::Error;

/// [`GpuBackend`] implementation for Vulkan.
///
/// Vulkan is an API-style-B target: presentation ordering is expressed through
/// explicit binary semaphores, so [`GpuBackend::GPU_ORDERING_SEMAPHORES`] is set.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanBackend {
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    #[derivative(Debug = "ignore")]
    swapchain_fns: ash::extensions::khr::Swapchain,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    queue: vk::Queue,
    queue_family: u32,
    command_pool: vk::CommandPool,
}

impl VulkanBackend {
    /// Wrap existing Vulkan objects. `queue` must support both graphics and
    /// present on `queue_family`, and `images` must be the images of `swapchain`.
    ///
    /// Creates the command pool all per-slot command buffers are allocated from.
    pub fn new(
        device: ash::Device,
        swapchain_fns: ash::extensions::khr::Swapchain,
        swapchain: vk::SwapchainKHR,
        images: Vec<vk::Image>,
        queue: vk::Queue,
        queue_family: u32,
    ) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: queue_family,
        };
        let command_pool =
            unsafe { device.create_command_pool(&info, None) }.map_err(Error::from)?;
        trace!("Created new VkCommandPool {command_pool:?}");

        Ok(VulkanBackend {
            device,
            swapchain_fns,
            swapchain,
            images,
            queue,
            queue_family,
            command_pool,
        })
    }

    /// Unsafe access to the underlying command pool.
    /// # Safety
    /// * Resetting or destroying the pool invalidates every command list the
    ///   scheduler owns.
    pub unsafe fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    fn layout(state: ImageState) -> vk::ImageLayout {
        match state {
            ImageState::Undefined => vk::ImageLayout::UNDEFINED,
            ImageState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageState::PresentReady => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    fn access_mask(state: ImageState) -> vk::AccessFlags {
        match state {
            ImageState::RenderTarget => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            _ => vk::AccessFlags::empty(),
        }
    }
}

impl GpuBackend for VulkanBackend {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type CommandList = vk::CommandBuffer;

    const GPU_ORDERING_SEMAPHORES: bool = true;

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn create_fence(&mut self, signaled: bool) -> Result<Self::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
        };
        let fence = unsafe { self.device.create_fence(&info, None) }.map_err(Error::from)?;
        trace!("Created new VkFence {fence:?}");
        Ok(fence)
    }

    fn create_semaphore(&mut self) -> Result<Self::Semaphore> {
        let info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: Default::default(),
        };
        let semaphore =
            unsafe { self.device.create_semaphore(&info, None) }.map_err(Error::from)?;
        trace!("Created new VkSemaphore {semaphore:?}");
        Ok(semaphore)
    }

    fn create_command_list(&mut self) -> Result<Self::CommandList> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            p_next: std::ptr::null(),
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
        };
        let buffers =
            unsafe { self.device.allocate_command_buffers(&info) }.map_err(Error::from)?;
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| Error::Uncategorized("command buffer allocation returned nothing").into())
    }

    fn wait_fence(&mut self, fence: &Self::Fence) -> Result<()> {
        unsafe {
            self.device
                .wait_for_fences(slice::from_ref(fence), true, u64::MAX)
        }
        .map_err(Error::from)?;
        Ok(())
    }

    fn reset_fence(&mut self, fence: &Self::Fence) -> Result<()> {
        unsafe { self.device.reset_fences(slice::from_ref(fence)) }.map_err(Error::from)?;
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        signal: Option<&Self::Semaphore>,
    ) -> Result<AcquireOutcome> {
        let semaphore = signal.copied().unwrap_or(vk::Semaphore::null());
        let result = unsafe {
            self.swapchain_fns.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            // A suboptimal flag at acquire time is ignored; presentation reports
            // the same condition and the scheduler surfaces it there.
            Ok((index, _)) => Ok(AcquireOutcome::Acquired(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(AcquireOutcome::Lost),
            Err(err) => Err(Error::from(err).into()),
        }
    }

    fn begin_commands(&mut self, cmd: &mut Self::CommandList) -> Result<()> {
        let info = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            p_next: std::ptr::null(),
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            p_inheritance_info: std::ptr::null(),
        };
        unsafe {
            self.device
                .reset_command_buffer(*cmd, vk::CommandBufferResetFlags::empty())
                .map_err(Error::from)?;
            self.device
                .begin_command_buffer(*cmd, &info)
                .map_err(Error::from)?;
        }
        Ok(())
    }

    fn cmd_transition(
        &mut self,
        cmd: &mut Self::CommandList,
        image: ImageIndex,
        from: ImageState,
        to: ImageState,
    ) {
        let barrier = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            p_next: std::ptr::null(),
            src_access_mask: Self::access_mask(from),
            dst_access_mask: Self::access_mask(to),
            old_layout: Self::layout(from),
            new_layout: Self::layout(to),
            src_queue_family_index: self.queue_family,
            dst_queue_family_index: self.queue_family,
            image: self.images[image as usize],
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
        };
        unsafe {
            self.device.cmd_pipeline_barrier(
                *cmd,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                slice::from_ref(&barrier),
            );
        }
    }

    fn end_commands(&mut self, cmd: &mut Self::CommandList) -> Result<()> {
        unsafe { self.device.end_command_buffer(*cmd) }.map_err(Error::from)?;
        Ok(())
    }

    fn submit(
        &mut self,
        cmd: &Self::CommandList,
        wait: Option<&Self::Semaphore>,
        signal: Option<&Self::Semaphore>,
        fence: &Self::Fence,
        _stamp: u64,
    ) -> Result<()> {
        // Binary fences here; the stamp only matters for fence-value style APIs.
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let info = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            p_next: std::ptr::null(),
            wait_semaphore_count: wait.map_or(0, |_| 1),
            p_wait_semaphores: wait.map_or(std::ptr::null(), |s| s as *const _),
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: cmd as *const _,
            signal_semaphore_count: signal.map_or(0, |_| 1),
            p_signal_semaphores: signal.map_or(std::ptr::null(), |s| s as *const _),
        };
        let result =
            unsafe { self.device.queue_submit(self.queue, slice::from_ref(&info), *fence) };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(Error::DeviceLost.into()),
            Err(err) => Err(Error::from(err).into()),
        }
    }

    fn present(
        &mut self,
        image: ImageIndex,
        wait: Option<&Self::Semaphore>,
    ) -> Result<PresentOutcome> {
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            p_next: std::ptr::null(),
            wait_semaphore_count: wait.map_or(0, |_| 1),
            p_wait_semaphores: wait.map_or(std::ptr::null(), |s| s as *const _),
            swapchain_count: 1,
            p_swapchains: &self.swapchain,
            p_image_indices: &image,
            p_results: std::ptr::null_mut(),
        };
        let result = unsafe { self.swapchain_fns.queue_present(self.queue, &info) };
        match result {
            Ok(false) => Ok(PresentOutcome::Optimal),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(PresentOutcome::Lost),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(Error::DeviceLost.into()),
            Err(err) => Err(Error::from(err).into()),
        }
    }

    fn destroy_fence(&mut self, fence: Self::Fence) {
        trace!("Destroying VkFence {fence:?}");
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore) {
        trace!("Destroying VkSemaphore {semaphore:?}");
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn destroy_command_list(&mut self, cmd: Self::CommandList) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, slice::from_ref(&cmd))
        };
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        // The swapchain, its images, the queue and the device belong to whoever
        // created them; only the pool is ours.
        trace!("Destroying VkCommandPool {:?}", self.command_pool);
        unsafe { self.device.destroy_command_pool(self.command_pool, None) };
    }
}

static_assertions::assert_impl_all!(VulkanBackend: Send);
