//! The backend-agnostic driver contract.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::device::RenderDevice;
use crate::error::{RenderError, Result};
use crate::handle::{
    CommandBufferId, CommandPoolId, PipelineId, QueueId, RenderPassId, ShaderId, SurfaceId,
    SwapchainId,
};
use crate::params::{
    ComputePipelineParams, DriverConfig, GraphicsPipelineParams, QueueCaps, RenderPassParams,
    ShaderStage,
};
use crate::vulkan::VulkanDriver;

/// The closed set of native backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderApi {
    Vulkan,
    Dx12,
}

impl std::fmt::Display for RenderApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vulkan => f.write_str("Vulkan"),
            Self::Dx12 => f.write_str("DX12"),
        }
    }
}

/// A window the driver can create a presentable surface for.
///
/// The windowing layer stays external; the driver only needs raw display
/// and window handles from it.
pub trait SurfaceTarget: HasDisplayHandle + HasWindowHandle {}

impl<W: HasDisplayHandle + HasWindowHandle + ?Sized> SurfaceTarget for W {}

/// Backend driver contract.
///
/// A driver exclusively owns every resource it hands out; handles are
/// resolved only through the driver that created them. All calls are
/// synchronous and must be externally serialized — the driver performs no
/// internal locking.
///
/// Lifecycle: construction negotiates capabilities and enumerates devices
/// (fatal on failure); `select_device` must run once before any resource
/// creation; afterwards each resource operation fails locally without
/// invalidating the driver.
pub trait RenderDriver {
    fn api(&self) -> RenderApi;
    /// Packed native API version of the runtime.
    fn api_version(&self) -> u32;
    fn api_name(&self) -> &'static str;
    fn api_version_string(&self) -> String;

    fn device_count(&self) -> usize;
    fn device(&self, index: usize) -> &RenderDevice;
    /// Whether the device at `index` can present to `surface` from any of
    /// its queue families.
    fn device_supports_surface(&self, index: usize, surface: SurfaceId) -> bool;
    /// Score-based auto-selection; devices that cannot present to every
    /// surface in `surfaces` are discarded first.
    fn choose_device(&self, surfaces: &[SurfaceId]) -> Result<usize>;
    /// Create the logical device for the device at `index`. Must be called
    /// exactly once, before any resource creation.
    fn select_device(&mut self, index: usize) -> Result<()>;

    /// Tightest-match queue family lookup. Returns `None` when no family
    /// covers `caps` (and presentation to `surface`, when given); callers
    /// must treat that as a hard initialization failure.
    fn choose_queue_family(&self, caps: QueueCaps, surface: Option<SurfaceId>) -> Option<u32>;
    /// Acquire the least-loaded queue of a family, bumping its usage count.
    fn get_queue(&mut self, family: u32) -> Result<QueueId>;
    /// Release one acquisition of `queue`. Releasing more often than
    /// acquired is a precondition violation.
    fn free_queue(&mut self, queue: QueueId);

    fn create_surface(&mut self, window: &dyn SurfaceTarget, width: u32, height: u32)
        -> Result<SurfaceId>;
    fn destroy_surface(&mut self, surface: SurfaceId);

    fn create_swapchain(&mut self, surface: SurfaceId) -> Result<SwapchainId>;
    /// Rebuild the presentable images for the surface's current size. A
    /// zero-area extent is a valid transient state and leaves the swapchain
    /// untouched without error.
    fn resize_swapchain(&mut self, swapchain: SwapchainId) -> Result<()>;
    /// The render pass describing the swapchain's default color attachment.
    fn swapchain_render_pass(&self, swapchain: SwapchainId) -> RenderPassId;
    fn destroy_swapchain(&mut self, swapchain: SwapchainId);

    /// Wrap precompiled shader bytecode. `bytes` must be non-empty.
    fn create_shader(&mut self, bytes: &[u8], stage: ShaderStage) -> Result<ShaderId>;
    fn destroy_shader(&mut self, shader: ShaderId);

    fn create_render_pass(&mut self, params: &RenderPassParams) -> Result<RenderPassId>;
    fn destroy_render_pass(&mut self, render_pass: RenderPassId);

    fn create_graphics_pipeline(&mut self, params: &GraphicsPipelineParams) -> Result<PipelineId>;
    fn create_compute_pipeline(&mut self, params: &ComputePipelineParams) -> Result<PipelineId>;
    fn destroy_pipeline(&mut self, pipeline: PipelineId);

    fn create_command_pool(&mut self, queue: QueueId) -> Result<CommandPoolId>;
    /// Destroys the pool and every command buffer allocated from it.
    fn destroy_command_pool(&mut self, pool: CommandPoolId);
    fn create_command_buffer(&mut self, pool: CommandPoolId) -> Result<CommandBufferId>;
    /// Open a recording session. Beginning a buffer that is already
    /// recording is a precondition violation.
    fn begin_command_buffer(&mut self, command_buffer: CommandBufferId) -> Result<()>;
    /// Close a recording session. Ending a buffer that was never begun is a
    /// precondition violation.
    fn end_command_buffer(&mut self, command_buffer: CommandBufferId) -> Result<()>;
}

/// Construct the driver for the requested backend.
///
/// `display` supplies the platform display handle used to discover the
/// presentation extensions the capability negotiator must request.
pub fn create_driver(
    api: RenderApi,
    config: DriverConfig,
    display: &dyn HasDisplayHandle,
) -> Result<Box<dyn RenderDriver>> {
    match api {
        RenderApi::Vulkan => Ok(Box::new(VulkanDriver::new(config, display)?)),
        RenderApi::Dx12 => Err(RenderError::UnsupportedApi(api)),
    }
}
