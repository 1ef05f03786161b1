//! GPU abstraction layer.
//!
//! A thin, backend-agnostic driver over the native graphics API: device
//! discovery and selection, capability negotiation, queue allocation,
//! surface and swapchain lifecycle, shader and pipeline construction, and
//! command recording. Vulkan is the only backend today; the contract is
//! written so another one can slot in behind [`RenderDriver`].

pub mod capability;
pub mod device;
pub mod driver;
pub mod error;
pub mod handle;
pub mod params;
pub mod vulkan;

pub use device::{DeviceType, DeviceVendor, RenderDevice};
pub use driver::{create_driver, RenderApi, RenderDriver, SurfaceTarget};
pub use error::{CapabilityKind, RenderError, Result};
pub use handle::{
    CommandBufferId, CommandPoolId, PipelineId, QueueId, RenderPassId, ShaderId, SurfaceId,
    SwapchainId,
};
pub use params::{
    ColorAttachmentParams, ComputePipelineParams, CullMode, DataFormat, DriverConfig, FrontFace,
    GraphicsPipelineParams, InputRate, LoadOp, PresentMode, PrimitiveTopology, QueueCaps,
    RenderPassParams, ShaderStage, VertexAttribute, VertexBinding,
};
pub use vulkan::VulkanDriver;
