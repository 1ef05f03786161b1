//! Semantic parameter types consumed by the driver.
//!
//! These are the backend-agnostic descriptions the engine hands to the
//! driver; each backend translates them into its own fixed-function state.

use bitflags::bitflags;

use crate::handle::{RenderPassId, ShaderId};

bitflags! {
    /// Queue family capability mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueueCaps: u32 {
        const GRAPHICS = 1;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
    }
}

/// Pipeline stage a shader module is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    TessControl,
    TessEval,
    Compute,
    Mesh,
    Task,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontFace {
    Clockwise,
    #[default]
    CounterClockwise,
}

/// Whether a vertex binding advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputRate {
    #[default]
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Data layout of a vertex attribute or attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    R8Unorm,
    Rgba8Unorm,
    Bgra8Unorm,
    R16Sfloat,
    Rg16Sfloat,
    Rgba16Sfloat,
    R32Uint,
    R32Sint,
    R32Sfloat,
    Rg32Sfloat,
    #[default]
    Rgb32Sfloat,
    Rgba32Sfloat,
    Rg32Uint,
    Rgba32Uint,
}

/// Preferred presentation engine behavior; negotiated per surface at resize
/// time with FIFO as the universal fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentMode {
    /// Tear, never block.
    Immediate,
    /// Low-latency triple buffering.
    #[default]
    Mailbox,
    /// Blocking vsync; always supported.
    Fifo,
}

/// Driver construction options.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Application name reported to the native API.
    pub app_name: String,
    /// Enable validation layers and debug extensions.
    pub validation: bool,
    /// Invert the discrete/integrated preference during device selection.
    pub prefer_integrated_gpu: bool,
    /// Present mode requested before falling back to FIFO.
    pub preferred_present_mode: PresentMode,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            app_name: "Borealis".to_string(),
            validation: cfg!(debug_assertions),
            prefer_integrated_gpu: false,
            preferred_present_mode: PresentMode::Mailbox,
        }
    }
}

/// One vertex buffer binding slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub rate: InputRate,
}

/// One attribute within a vertex binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct VertexAttribute {
    pub binding: u32,
    pub location: u32,
    pub offset: u32,
    pub format: DataFormat,
}

/// Semantic description of a graphics pipeline.
///
/// Viewport and scissor are always dynamic per-draw state and are not part
/// of this description. Multisampling, depth/stencil and blending are fixed
/// to single-sample/no-blend defaults for now.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineParams {
    /// Shader stages in pipeline order.
    pub shaders: Vec<ShaderId>,
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
    pub topology: PrimitiveTopology,

    pub enable_depth_clamp: bool,
    pub discard_primitives: bool,
    pub wireframe: bool,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub enable_depth_bias: bool,
    pub depth_bias_constant: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope: f32,
    pub line_width: f32,

    /// Target render pass; required.
    pub render_pass: Option<RenderPassId>,
    pub subpass: u32,
}

impl Default for GraphicsPipelineParams {
    fn default() -> Self {
        Self {
            shaders: Vec::new(),
            bindings: Vec::new(),
            attributes: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            enable_depth_clamp: false,
            discard_primitives: false,
            wireframe: false,
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            enable_depth_bias: false,
            depth_bias_constant: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope: 0.0,
            line_width: 1.0,
            render_pass: None,
            subpass: 0,
        }
    }
}

/// Compute pipeline description. Placeholder until compute support lands.
#[derive(Debug, Clone, Default)]
pub struct ComputePipelineParams {}

/// How a render pass treats a color attachment on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadOp {
    #[default]
    Clear,
    Load,
    DontCare,
}

/// One color attachment of a standalone render pass.
#[derive(Debug, Clone, Copy)]
pub struct ColorAttachmentParams {
    pub format: DataFormat,
    pub load: LoadOp,
    pub store: bool,
    /// Transition to a present-ready layout at the end of the pass.
    pub present_after: bool,
}

/// Description of a standalone single-subpass render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassParams {
    pub color_attachments: Vec<ColorAttachmentParams>,
}
