//! Surface and swapchain lifecycle.
//!
//! A swapchain is tied 1:1 to a surface and owns its images, views,
//! framebuffers and a present render pass. Creation is a resize against an
//! empty record; resize retires the old native swapchain so in-flight
//! frames survive, and the retired handle is reclaimed on the next resize
//! or at destruction.

use ash::vk;
use tracing::{info, warn};

use crate::error::{RenderError, Result};
use crate::handle::{RenderPassId, SurfaceId, SwapchainId};
use crate::params::PresentMode;

use super::pipeline::RenderPassRecord;
use super::VulkanDriver;

/// The format every swapchain tries for first.
pub(crate) const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
/// Accepted when the preferred format is absent.
pub(crate) const FALLBACK_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

pub(crate) struct SurfaceRecord {
    pub handle: vk::SurfaceKHR,
    pub width: u32,
    pub height: u32,
}

pub(crate) struct SwapchainRecord {
    pub surface: SurfaceId,
    pub handle: vk::SwapchainKHR,
    /// Previous native swapchain, kept alive until the next resize.
    pub retired: vk::SwapchainKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub render_pass: RenderPassId,
    /// Extent of the current images; kept for frame recording.
    #[allow(dead_code)]
    pub extent: vk::Extent2D,
}

impl SwapchainRecord {
    /// Destroy everything this record owns except the render pass, which
    /// lives in the driver's render pass arena. Framebuffers go before
    /// views, views before the native swapchains.
    ///
    /// # Safety
    ///
    /// The device must be idle with respect to this swapchain.
    pub(crate) unsafe fn destroy_native(
        &self,
        device: &ash::Device,
        loader: &ash::khr::swapchain::Device,
    ) {
        for &framebuffer in &self.framebuffers {
            device.destroy_framebuffer(framebuffer, None);
        }
        for &view in &self.views {
            device.destroy_image_view(view, None);
        }
        if self.handle != vk::SwapchainKHR::null() {
            loader.destroy_swapchain(self.handle, None);
        }
        if self.retired != vk::SwapchainKHR::null() {
            loader.destroy_swapchain(self.retired, None);
        }
    }
}

/// Pick the surface format.
///
/// A single `UNDEFINED` entry means the surface accepts anything, so the
/// preferred format is adopted along with the reported color space. An
/// explicit list is scanned for the preferred format first, keeping the
/// fallback in reserve.
pub(crate) fn select_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<(vk::Format, vk::ColorSpaceKHR)> {
    if formats.len() == 1 && formats[0].format == vk::Format::UNDEFINED {
        return Ok((PREFERRED_FORMAT, formats[0].color_space));
    }

    let mut fallback: Option<(vk::Format, vk::ColorSpaceKHR)> = None;
    for format in formats {
        if format.format == PREFERRED_FORMAT {
            return Ok((format.format, format.color_space));
        }
        if format.format == FALLBACK_FORMAT && fallback.is_none() {
            fallback = Some((format.format, format.color_space));
        }
    }

    fallback.ok_or(RenderError::UnsupportedSwapchainFormat)
}

/// Pick the present mode, falling back to FIFO (the only mode the standard
/// guarantees) when the preference is absent.
pub(crate) fn select_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: PresentMode,
) -> vk::PresentModeKHR {
    let wanted = match preferred {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
    };
    if modes.contains(&wanted) {
        wanted
    } else {
        if wanted != vk::PresentModeKHR::FIFO {
            warn!("Present mode {preferred:?} unavailable, falling back to FIFO");
        }
        vk::PresentModeKHR::FIFO
    }
}

/// Resolve the swapchain extent from the surface capabilities.
///
/// `u32::MAX` in `current_extent` is the sentinel for "the surface takes
/// whatever size the swapchain picks"; the window size is clamped into the
/// reported bounds in that case.
pub(crate) fn compute_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    } else {
        caps.current_extent
    }
}

/// Resolve the swapchain extent for a surface.
///
/// When the surface dictates a fixed extent, the adopted size is written
/// back into the surface's cached width/height so a later switch to the
/// follow-window sentinel clamps the current size, not the creation-time
/// one.
pub(crate) fn resolve_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    surface: &mut SurfaceRecord,
) -> vk::Extent2D {
    let extent = compute_extent(caps, surface.width, surface.height);
    if caps.current_extent.width != u32::MAX {
        surface.width = extent.width;
        surface.height = extent.height;
    }
    extent
}

/// A zero-area extent is a valid transient state (minimized window) and
/// must leave the existing chain untouched.
pub(crate) fn extent_is_renderable(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}

/// One image above the minimum, clamped to the maximum when the surface
/// reports one (zero means unbounded).
pub(crate) fn select_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = caps.min_image_count + 1;
    if caps.max_image_count != 0 {
        count = count.min(caps.max_image_count);
    }
    count
}

/// Single-subpass present pass: clear on load, store, end in `PRESENT_SRC`.
fn create_present_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> Result<vk::RenderPass> {
    let attachments = [vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses);

    unsafe { device.create_render_pass(&create_info, None) }
        .map_err(RenderError::RenderPassCreation)
}

impl VulkanDriver {
    pub(crate) fn create_surface_impl(
        &mut self,
        window: &dyn crate::driver::SurfaceTarget,
        width: u32,
        height: u32,
    ) -> Result<SurfaceId> {
        let display = window
            .display_handle()
            .map_err(|e| RenderError::SurfaceCreation(e.to_string()))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| RenderError::SurfaceCreation(e.to_string()))?;

        let handle = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| RenderError::SurfaceCreation(e.to_string()))?;

        info!("Created surface ({width}x{height})");
        Ok(SurfaceId(self.surfaces.insert(SurfaceRecord {
            handle,
            width,
            height,
        })))
    }

    pub(crate) fn destroy_surface_impl(&mut self, surface: SurfaceId) {
        let record = self.surfaces.remove(surface.0);
        unsafe {
            self.surface_loader.destroy_surface(record.handle, None);
        }
    }

    pub(crate) fn create_swapchain_impl(&mut self, surface: SurfaceId) -> Result<SwapchainId> {
        let dev = self.device.as_ref().expect("no device selected");
        let surface_handle = self.surfaces.get(surface.0).handle;

        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(dev.physical, surface_handle)
        }
        .map_err(|e| RenderError::SwapchainResize {
            stage: "surface formats",
            source: e,
        })?;
        let (format, color_space) = select_surface_format(&formats)?;

        let pass_handle = create_present_render_pass(&dev.device, format)?;
        let render_pass = RenderPassId(self.render_passes.insert(RenderPassRecord {
            handle: pass_handle,
        }));

        let swapchain = SwapchainId(self.swapchains.insert(SwapchainRecord {
            surface,
            handle: vk::SwapchainKHR::null(),
            retired: vk::SwapchainKHR::null(),
            format,
            color_space,
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
            render_pass,
            extent: vk::Extent2D::default(),
        }));

        if let Err(e) = self.resize_swapchain_impl(swapchain) {
            self.destroy_swapchain_impl(swapchain);
            return Err(e);
        }

        info!("Created swapchain ({format:?})");
        Ok(swapchain)
    }

    pub(crate) fn resize_swapchain_impl(&mut self, swapchain: SwapchainId) -> Result<()> {
        let dev = self.device.as_ref().expect("no device selected");
        let record = self.swapchains.get_mut(swapchain.0);
        let surface = self.surfaces.get_mut(record.surface.0);
        let surface_handle = surface.handle;

        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(dev.physical, surface_handle)
        }
        .map_err(|e| RenderError::SwapchainResize {
            stage: "surface capabilities",
            source: e,
        })?;

        let extent = resolve_extent(&caps, surface);
        if !extent_is_renderable(extent) {
            // Minimized; keep the old chain until a real size shows up.
            return Ok(());
        }

        unsafe {
            let _ = dev.device.device_wait_idle();
            for framebuffer in record.framebuffers.drain(..) {
                dev.device.destroy_framebuffer(framebuffer, None);
            }
            for view in record.views.drain(..) {
                dev.device.destroy_image_view(view, None);
            }
            if record.retired != vk::SwapchainKHR::null() {
                dev.swapchain_loader.destroy_swapchain(record.retired, None);
            }
        }
        record.retired = record.handle;
        record.images.clear();

        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(dev.physical, surface_handle)
        }
        .map_err(|e| RenderError::SwapchainResize {
            stage: "present modes",
            source: e,
        })?;
        let present_mode = select_present_mode(&present_modes, self.config.preferred_present_mode);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface_handle)
            .min_image_count(select_image_count(&caps))
            .image_format(record.format)
            .image_color_space(record.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(record.retired);

        record.handle = unsafe { dev.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| RenderError::SwapchainResize {
                stage: "swapchain",
                source: e,
            })?;

        record.images = unsafe { dev.swapchain_loader.get_swapchain_images(record.handle) }
            .map_err(|e| RenderError::SwapchainResize {
                stage: "swapchain images",
                source: e,
            })?;

        for &image in &record.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(record.format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );
            let view = unsafe { dev.device.create_image_view(&view_info, None) }.map_err(|e| {
                RenderError::SwapchainResize {
                    stage: "image view",
                    source: e,
                }
            })?;
            record.views.push(view);
        }

        let pass_handle = self.render_passes.get(record.render_pass.0).handle;
        for &view in &record.views {
            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(pass_handle)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { dev.device.create_framebuffer(&framebuffer_info, None) }
                .map_err(|e| RenderError::SwapchainResize {
                    stage: "framebuffer",
                    source: e,
                })?;
            record.framebuffers.push(framebuffer);
        }

        record.extent = extent;
        info!(
            "Swapchain resized to {}x{} ({} images)",
            extent.width,
            extent.height,
            record.images.len()
        );
        Ok(())
    }

    pub(crate) fn destroy_swapchain_impl(&mut self, swapchain: SwapchainId) {
        let dev = self.device.as_ref().expect("no device selected");
        let record = self.swapchains.remove(swapchain.0);

        unsafe {
            let _ = dev.device.device_wait_idle();
            record.destroy_native(&dev.device, &dev.swapchain_loader);
        }

        let pass = self.render_passes.remove(record.render_pass.0);
        unsafe {
            dev.device.destroy_render_pass(pass.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn undefined_sentinel_adopts_preferred_format() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let (format, color_space) = select_surface_format(&formats).unwrap();
        assert_eq!(format, PREFERRED_FORMAT);
        assert_eq!(color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn preferred_format_wins_over_fallback() {
        let formats = [
            surface_format(FALLBACK_FORMAT),
            surface_format(PREFERRED_FORMAT),
            surface_format(vk::Format::R5G6B5_UNORM_PACK16),
        ];
        let (format, _) = select_surface_format(&formats).unwrap();
        assert_eq!(format, PREFERRED_FORMAT);
    }

    #[test]
    fn fallback_format_accepted_when_preferred_missing() {
        let formats = [
            surface_format(vk::Format::R5G6B5_UNORM_PACK16),
            surface_format(FALLBACK_FORMAT),
        ];
        let (format, _) = select_surface_format(&formats).unwrap();
        assert_eq!(format, FALLBACK_FORMAT);
    }

    #[test]
    fn no_usable_format_is_an_error() {
        let formats = [surface_format(vk::Format::R5G6B5_UNORM_PACK16)];
        assert!(matches!(
            select_surface_format(&formats),
            Err(RenderError::UnsupportedSwapchainFormat)
        ));
    }

    #[test]
    fn present_mode_prefers_request_then_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            select_present_mode(&modes, PresentMode::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&modes, PresentMode::Immediate),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fifo_only_surface_always_yields_fifo() {
        let modes = [vk::PresentModeKHR::FIFO];
        for preferred in [PresentMode::Immediate, PresentMode::Mailbox, PresentMode::Fifo] {
            assert_eq!(select_present_mode(&modes, preferred), vk::PresentModeKHR::FIFO);
        }
    }

    #[test]
    fn extent_sentinel_clamps_window_size() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = compute_extent(&caps, 4000, 10);
        assert_eq!(extent, vk::Extent2D { width: 1920, height: 64 });
    }

    #[test]
    fn fixed_extent_is_adopted_verbatim() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let extent = compute_extent(&caps, 1024, 768);
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
    }

    fn surface_record(width: u32, height: u32) -> SurfaceRecord {
        SurfaceRecord {
            handle: vk::SurfaceKHR::null(),
            width,
            height,
        }
    }

    fn fixed_extent_caps(width: u32, height: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width, height },
            ..Default::default()
        }
    }

    fn sentinel_caps(max_width: u32, max_height: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: max_width,
                height: max_height,
            },
            ..Default::default()
        }
    }

    #[test]
    fn fixed_extent_refreshes_cached_surface_size() {
        let mut surface = surface_record(1280, 720);

        // The surface grows while reporting fixed extents, then switches to
        // the follow-window sentinel; the clamp must see the grown size.
        let extent = resolve_extent(&fixed_extent_caps(1920, 1080), &mut surface);
        assert_eq!(extent, vk::Extent2D { width: 1920, height: 1080 });
        assert_eq!((surface.width, surface.height), (1920, 1080));

        let extent = resolve_extent(&sentinel_caps(4096, 4096), &mut surface);
        assert_eq!(extent, vk::Extent2D { width: 1920, height: 1080 });
    }

    #[test]
    fn sentinel_extent_leaves_cached_size() {
        let mut surface = surface_record(1280, 720);
        let extent = resolve_extent(&sentinel_caps(800, 600), &mut surface);
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((surface.width, surface.height), (1280, 720));
    }

    #[test]
    fn zero_area_extent_is_not_renderable() {
        let mut surface = surface_record(1280, 720);
        let extent = resolve_extent(&fixed_extent_caps(0, 0), &mut surface);
        assert!(!extent_is_renderable(extent));
        assert!(extent_is_renderable(vk::Extent2D { width: 1, height: 1 }));
    }

    #[test]
    fn image_count_is_min_plus_one_clamped() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(select_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(select_image_count(&caps), 2);
    }
}
