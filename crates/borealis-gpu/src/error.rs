//! Render driver error types.

use ash::vk;
use thiserror::Error;

use crate::driver::RenderApi;

/// The capability list a negotiation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    InstanceExtension,
    InstanceLayer,
    DeviceExtension,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InstanceExtension => f.write_str("instance extension"),
            Self::InstanceLayer => f.write_str("instance layer"),
            Self::DeviceExtension => f.write_str("device extension"),
        }
    }
}

/// Render driver errors.
///
/// Fatal initialization errors leave the driver unusable and abort
/// construction or device selection; resource-creation errors are local to
/// one call and leave the driver and all other resources valid.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The requested backend is not compiled in.
    #[error("Render API not supported: {0}")]
    UnsupportedApi(RenderApi),

    /// The runtime's API version is below the minimum the driver needs.
    #[error("API version too low: found {found}, need {required}")]
    ApiVersionTooLow { found: String, required: String },

    /// One or more required capabilities are absent from the runtime.
    #[error("Required {kind}(s) not found: {}", names.join(", "))]
    MissingCapabilities {
        kind: CapabilityKind,
        names: Vec<String>,
    },

    /// The platform cannot name a presentation surface extension.
    #[error("Could not determine required surface extension: {0}")]
    SurfaceExtensionUnavailable(String),

    /// Device enumeration was empty or no device survived filtering.
    #[error("No suitable device found")]
    NoSuitableDevice,

    /// No combination of queue families covers graphics, compute and
    /// transfer on the selected device.
    #[error("Failed to find all required queue families")]
    MissingQueueCapabilities,

    /// A queue family has no materialized queues to hand out.
    #[error("No queues available in family {family}")]
    QueueExhausted { family: u32 },

    /// Surface creation through the windowing layer failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// The surface reports neither the preferred nor the fallback format.
    #[error("Failed to find a supported swapchain format")]
    UnsupportedSwapchainFormat,

    /// A native object creation inside a swapchain resize failed; `stage`
    /// names which one.
    #[error("Swapchain resize failed at {stage}: {source}")]
    SwapchainResize {
        stage: &'static str,
        source: vk::Result,
    },

    /// The native shader module could not be created.
    #[error("Shader creation failed: {0}")]
    ShaderCreation(String),

    /// Render pass creation failed.
    #[error("Render pass creation failed: {0}")]
    RenderPassCreation(vk::Result),

    /// Pipeline or pipeline layout creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Command pool creation failed.
    #[error("Command pool creation failed: {0}")]
    CommandPoolCreation(vk::Result),

    /// Command buffer allocation failed.
    #[error("Command buffer allocation failed: {0}")]
    CommandBufferAllocation(vk::Result),

    /// Begin/end of a recording session failed in the native API.
    #[error("Command recording failed: {0}")]
    CommandRecording(vk::Result),

    /// The Vulkan runtime could not be loaded.
    #[error("Failed to load Vulkan: {0}")]
    EntryLoad(String),

    /// Uncategorized native API error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
