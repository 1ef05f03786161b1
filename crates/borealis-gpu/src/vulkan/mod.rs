//! Vulkan backend.
//!
//! One flat implementation of [`RenderDriver`]: construction negotiates
//! instance capabilities and enumerates hardware, `select_device` brings up
//! the logical device and its queues, and every later operation creates or
//! destroys arena-owned resources against that device.

mod command;
mod instance;
mod pipeline;
mod swapchain;

use ash::vk;
use ash::vk::Handle;
use hashbrown::HashMap;
use raw_window_handle::HasDisplayHandle;

use crate::capability::{negotiate, CapabilityRequest, NegotiatedCapabilities};
use crate::device::{choose_device, RenderDevice};
use crate::driver::{RenderApi, RenderDriver, SurfaceTarget};
use crate::error::{CapabilityKind, RenderError, Result};
use crate::handle::{
    CommandBufferId, CommandPoolId, PipelineId, Pool, QueueId, RenderPassId, ShaderId, SurfaceId,
    SwapchainId,
};
use crate::params::{
    ComputePipelineParams, DriverConfig, GraphicsPipelineParams, QueueCaps, RenderPassParams,
    ShaderStage,
};

use command::{CommandBufferRecord, CommandPoolRecord};
use pipeline::{PipelineRecord, RenderPassRecord, ShaderRecord};
use swapchain::{SurfaceRecord, SwapchainRecord};

/// Native queues materialized per family at device setup.
const MAX_QUEUES_PER_FAMILY: u32 = 2;

/// One pre-created native queue. Shared by reference among callers and
/// load-balanced through `usage_count`.
#[derive(Debug)]
pub(crate) struct QueueRecord {
    pub handle: vk::Queue,
    pub family_index: u32,
    #[allow(dead_code)]
    pub queue_index: u32,
    pub usage_count: u32,
}

/// State that only exists once a device has been selected.
pub(crate) struct DeviceState {
    pub physical: vk::PhysicalDevice,
    pub device: ash::Device,
    pub swapchain_loader: ash::khr::swapchain::Device,
    #[allow(dead_code)]
    pub extensions: NegotiatedCapabilities,
    /// Features the hardware reports. Observed and logged only; the logical
    /// device is created with everything disabled.
    #[allow(dead_code)]
    pub available_features: vk::PhysicalDeviceFeatures,
    pub queue_families: HashMap<u32, vk::QueueFlags>,
    pub queues: Vec<QueueRecord>,
}

/// The Vulkan implementation of the driver contract.
pub struct VulkanDriver {
    #[allow(dead_code)]
    entry: ash::Entry,
    api_version: u32,
    instance: ash::Instance,
    surface_loader: ash::khr::surface::Instance,
    config: DriverConfig,
    #[allow(dead_code)]
    instance_extensions: NegotiatedCapabilities,
    #[allow(dead_code)]
    layers: NegotiatedCapabilities,
    devices: Vec<RenderDevice>,
    device: Option<DeviceState>,

    pub(crate) surfaces: Pool<SurfaceRecord>,
    pub(crate) swapchains: Pool<SwapchainRecord>,
    pub(crate) shaders: Pool<ShaderRecord>,
    pub(crate) render_passes: Pool<RenderPassRecord>,
    pub(crate) pipelines: Pool<PipelineRecord>,
    pub(crate) command_pools: Pool<CommandPoolRecord>,
    pub(crate) command_buffers: Pool<CommandBufferRecord>,
}

impl VulkanDriver {
    /// Construct the driver: version check, capability negotiation,
    /// instance creation and device enumeration, in that order. Any failure
    /// here aborts the whole driver.
    pub fn new(config: DriverConfig, display: &dyn HasDisplayHandle) -> Result<Self> {
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| RenderError::EntryLoad(e.to_string()))?;

        let api_version = instance::check_api_version(&entry)?;
        let instance_extensions =
            instance::negotiate_instance_extensions(&entry, display, config.validation)?;
        let layers = instance::negotiate_layers(&entry, config.validation)?;
        let vk_instance = instance::create_instance(&entry, &config, &instance_extensions, &layers)?;
        let devices = instance::enumerate_devices(&vk_instance)?;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &vk_instance);

        Ok(Self {
            entry,
            api_version,
            instance: vk_instance,
            surface_loader,
            config,
            instance_extensions,
            layers,
            devices,
            device: None,
            surfaces: Pool::default(),
            swapchains: Pool::default(),
            shaders: Pool::default(),
            render_passes: Pool::default(),
            pipelines: Pool::default(),
            command_pools: Pool::default(),
            command_buffers: Pool::default(),
        })
    }

    pub(crate) fn dev(&self) -> &DeviceState {
        self.device.as_ref().expect("no device selected")
    }

    fn physical_device_at(&self, index: usize) -> vk::PhysicalDevice {
        vk::PhysicalDevice::from_raw(self.devices[index].handle.0)
    }

    fn negotiate_device_extensions(
        &self,
        physical: vk::PhysicalDevice,
    ) -> Result<NegotiatedCapabilities> {
        let available =
            unsafe { self.instance.enumerate_device_extension_properties(physical)? };
        let available_names: Vec<String> = available
            .iter()
            .map(|props| {
                unsafe { std::ffi::CStr::from_ptr(props.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        negotiate(
            CapabilityKind::DeviceExtension,
            [CapabilityRequest::required(
                ash::khr::swapchain::NAME.to_string_lossy().into_owned(),
            )],
            available_names.iter().map(String::as_str),
        )
    }
}

/// Index of the least-loaded queue of `family`, if the family has any.
fn least_loaded_queue(queues: &[QueueRecord], family: u32) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, queue) in queues.iter().enumerate() {
        if queue.family_index != family {
            continue;
        }
        if best.map_or(true, |(_, usage)| queue.usage_count < usage) {
            best = Some((index, queue.usage_count));
        }
    }
    best.map(|(index, _)| index)
}

/// Acquire the least-loaded queue of `family`, bumping its usage count.
fn acquire_queue(queues: &mut [QueueRecord], family: u32) -> Option<usize> {
    let index = least_loaded_queue(queues, family)?;
    queues[index].usage_count += 1;
    Some(index)
}

/// Release one acquisition. Releasing more often than acquired aborts.
fn release_queue(queues: &mut [QueueRecord], index: usize) {
    let record = &mut queues[index];
    assert!(
        record.usage_count > 0,
        "queue freed more times than acquired"
    );
    record.usage_count -= 1;
}

fn queue_caps_to_vk(caps: QueueCaps) -> vk::QueueFlags {
    let mut flags = vk::QueueFlags::empty();
    if caps.contains(QueueCaps::GRAPHICS) {
        flags |= vk::QueueFlags::GRAPHICS;
    }
    if caps.contains(QueueCaps::COMPUTE) {
        flags |= vk::QueueFlags::COMPUTE;
    }
    if caps.contains(QueueCaps::TRANSFER) {
        flags |= vk::QueueFlags::TRANSFER;
    }
    flags
}

impl RenderDriver for VulkanDriver {
    fn api(&self) -> RenderApi {
        RenderApi::Vulkan
    }

    fn api_version(&self) -> u32 {
        self.api_version
    }

    fn api_name(&self) -> &'static str {
        "Vulkan"
    }

    fn api_version_string(&self) -> String {
        instance::version_string(self.api_version)
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device(&self, index: usize) -> &RenderDevice {
        &self.devices[index]
    }

    fn device_supports_surface(&self, index: usize, surface: SurfaceId) -> bool {
        assert!(index < self.devices.len(), "device index out of range");
        let physical = self.physical_device_at(index);
        let surface_handle = self.surfaces.get(surface.0).handle;

        let family_count =
            unsafe { self.instance.get_physical_device_queue_family_properties(physical) }.len();

        (0..family_count as u32).any(|family| {
            unsafe {
                self.surface_loader.get_physical_device_surface_support(
                    physical,
                    family,
                    surface_handle,
                )
            }
            .unwrap_or(false)
        })
    }

    fn choose_device(&self, surfaces: &[SurfaceId]) -> Result<usize> {
        choose_device(
            &self.devices,
            |index| {
                surfaces
                    .iter()
                    .all(|&surface| self.device_supports_surface(index, surface))
            },
            self.config.prefer_integrated_gpu,
        )
    }

    fn select_device(&mut self, index: usize) -> Result<()> {
        assert!(self.device.is_none(), "device already selected");
        assert!(index < self.devices.len(), "device index out of range");

        tracing::info!("Using device: {}", self.devices[index].name);
        let physical = self.physical_device_at(index);

        let extensions = self.negotiate_device_extensions(physical)?;

        // Feature negotiation is observe-only: nothing in this core needs a
        // device feature, so the logical device enables none of them.
        let available_features =
            unsafe { self.instance.get_physical_device_features(physical) };
        tracing::debug!(
            geometry_shader = available_features.geometry_shader == vk::TRUE,
            tessellation_shader = available_features.tessellation_shader == vk::TRUE,
            "Device features observed"
        );

        let family_props =
            unsafe { self.instance.get_physical_device_queue_family_properties(physical) };

        const QUEUE_MASK: vk::QueueFlags = vk::QueueFlags::from_raw(
            vk::QueueFlags::GRAPHICS.as_raw()
                | vk::QueueFlags::COMPUTE.as_raw()
                | vk::QueueFlags::TRANSFER.as_raw(),
        );

        let priorities = [1.0_f32; MAX_QUEUES_PER_FAMILY as usize];
        let mut queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = Vec::new();
        let mut queue_families: HashMap<u32, vk::QueueFlags> = HashMap::new();
        let mut queue_slots: Vec<(u32, u32)> = Vec::new();
        let mut found = vk::QueueFlags::empty();

        for (family, props) in family_props.iter().enumerate() {
            let family = family as u32;
            if (props.queue_flags & QUEUE_MASK) == vk::QueueFlags::empty() {
                continue;
            }
            if props.queue_count == 0 {
                continue;
            }

            tracing::info!("Using queue family: {family}");
            found |= props.queue_flags;

            let count = MAX_QUEUES_PER_FAMILY.min(props.queue_count);
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities[..count as usize]),
            );
            queue_families.insert(family, props.queue_flags);
            for queue_index in 0..count {
                queue_slots.push((family, queue_index));
            }
        }

        if !found.contains(QUEUE_MASK) {
            return Err(RenderError::MissingQueueCapabilities);
        }

        let extension_ptrs = extensions.name_ptrs();
        let enabled_features = vk::PhysicalDeviceFeatures::default();
        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&enabled_features);

        let device =
            unsafe { self.instance.create_device(physical, &device_create_info, None)? };

        let queues = queue_slots
            .into_iter()
            .map(|(family_index, queue_index)| QueueRecord {
                handle: unsafe { device.get_device_queue(family_index, queue_index) },
                family_index,
                queue_index,
                usage_count: 0,
            })
            .collect();

        let swapchain_loader = ash::khr::swapchain::Device::new(&self.instance, &device);

        self.device = Some(DeviceState {
            physical,
            device,
            swapchain_loader,
            extensions,
            available_features,
            queue_families,
            queues,
        });

        Ok(())
    }

    fn choose_queue_family(&self, caps: QueueCaps, surface: Option<SurfaceId>) -> Option<u32> {
        let dev = self.dev();
        assert!(!dev.queue_families.is_empty(), "no queue families");

        let mask = queue_caps_to_vk(caps);

        // Sorted for determinism; the family map has no inherent order.
        let mut families: Vec<(u32, vk::QueueFlags)> = dev
            .queue_families
            .iter()
            .map(|(&family, &flags)| (family, flags))
            .collect();
        families.sort_by_key(|&(family, _)| family);

        let mut best: Option<(u32, u32)> = None;
        for (family, flags) in families {
            if (flags & mask) != mask {
                continue;
            }
            if let Some(surface) = surface {
                let surface_handle = self.surfaces.get(surface.0).handle;
                let supported = unsafe {
                    self.surface_loader.get_physical_device_surface_support(
                        dev.physical,
                        family,
                        surface_handle,
                    )
                };
                if !matches!(supported, Ok(true)) {
                    continue;
                }
            }

            // Tightest match: the fewer capability bits, the better. Broad
            // families stay free for requests that need the breadth.
            let score = flags.as_raw().count_ones();
            if best.map_or(true, |(_, best_score)| score < best_score) {
                best = Some((family, score));
            }
        }

        best.map(|(family, _)| family)
    }

    fn get_queue(&mut self, family: u32) -> Result<QueueId> {
        let dev = self.device.as_mut().expect("no device selected");
        assert!(!dev.queues.is_empty(), "no queues materialized");

        let index = acquire_queue(&mut dev.queues, family)
            .ok_or(RenderError::QueueExhausted { family })?;
        Ok(QueueId(index as u32))
    }

    fn free_queue(&mut self, queue: QueueId) {
        let dev = self.device.as_mut().expect("no device selected");
        release_queue(&mut dev.queues, queue.0 as usize);
    }

    fn create_surface(
        &mut self,
        window: &dyn SurfaceTarget,
        width: u32,
        height: u32,
    ) -> Result<SurfaceId> {
        self.create_surface_impl(window, width, height)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        self.destroy_surface_impl(surface);
    }

    fn create_swapchain(&mut self, surface: SurfaceId) -> Result<SwapchainId> {
        self.create_swapchain_impl(surface)
    }

    fn resize_swapchain(&mut self, swapchain: SwapchainId) -> Result<()> {
        self.resize_swapchain_impl(swapchain)
    }

    fn swapchain_render_pass(&self, swapchain: SwapchainId) -> RenderPassId {
        self.swapchains.get(swapchain.0).render_pass
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainId) {
        self.destroy_swapchain_impl(swapchain);
    }

    fn create_shader(&mut self, bytes: &[u8], stage: ShaderStage) -> Result<ShaderId> {
        self.create_shader_impl(bytes, stage)
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        self.destroy_shader_impl(shader);
    }

    fn create_render_pass(&mut self, params: &RenderPassParams) -> Result<RenderPassId> {
        self.create_render_pass_impl(params)
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassId) {
        self.destroy_render_pass_impl(render_pass);
    }

    fn create_graphics_pipeline(&mut self, params: &GraphicsPipelineParams) -> Result<PipelineId> {
        self.create_graphics_pipeline_impl(params)
    }

    fn create_compute_pipeline(&mut self, params: &ComputePipelineParams) -> Result<PipelineId> {
        self.create_compute_pipeline_impl(params)
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.destroy_pipeline_impl(pipeline);
    }

    fn create_command_pool(&mut self, queue: QueueId) -> Result<CommandPoolId> {
        self.create_command_pool_impl(queue)
    }

    fn destroy_command_pool(&mut self, pool: CommandPoolId) {
        self.destroy_command_pool_impl(pool);
    }

    fn create_command_buffer(&mut self, pool: CommandPoolId) -> Result<CommandBufferId> {
        self.create_command_buffer_impl(pool)
    }

    fn begin_command_buffer(&mut self, command_buffer: CommandBufferId) -> Result<()> {
        self.begin_command_buffer_impl(command_buffer)
    }

    fn end_command_buffer(&mut self, command_buffer: CommandBufferId) -> Result<()> {
        self.end_command_buffer_impl(command_buffer)
    }
}

impl Drop for VulkanDriver {
    fn drop(&mut self) {
        unsafe {
            if let Some(dev) = &self.device {
                let _ = dev.device.device_wait_idle();

                // Owner-before-owned: pools release their buffers, then
                // pipelines, swapchains (views/framebuffers), passes,
                // shaders and surfaces, before the device itself.
                for pool in self.command_pools.drain() {
                    dev.device.destroy_command_pool(pool.handle, None);
                }
                self.command_buffers.drain().for_each(drop);

                for pipeline in self.pipelines.drain() {
                    if pipeline.layout != vk::PipelineLayout::null() {
                        dev.device.destroy_pipeline_layout(pipeline.layout, None);
                    }
                    if pipeline.handle != vk::Pipeline::null() {
                        dev.device.destroy_pipeline(pipeline.handle, None);
                    }
                }

                for record in self.swapchains.drain() {
                    record.destroy_native(&dev.device, &dev.swapchain_loader);
                }

                for render_pass in self.render_passes.drain() {
                    if render_pass.handle != vk::RenderPass::null() {
                        dev.device.destroy_render_pass(render_pass.handle, None);
                    }
                }

                for shader in self.shaders.drain() {
                    if shader.handle != vk::ShaderModule::null() {
                        dev.device.destroy_shader_module(shader.handle, None);
                    }
                }
            }

            for surface in self.surfaces.drain() {
                self.surface_loader.destroy_surface(surface.handle, None);
            }

            if let Some(dev) = self.device.take() {
                dev.device.destroy_device(None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family_queues(family: u32, count: usize) -> Vec<QueueRecord> {
        (0..count)
            .map(|queue_index| QueueRecord {
                handle: vk::Queue::null(),
                family_index: family,
                queue_index: queue_index as u32,
                usage_count: 0,
            })
            .collect()
    }

    #[test]
    fn least_loaded_balances_across_family() {
        let mut queues = family_queues(0, 2);

        // Three acquisitions: the third must land on the least-loaded queue.
        let first = least_loaded_queue(&queues, 0).unwrap();
        queues[first].usage_count += 1;
        let second = least_loaded_queue(&queues, 0).unwrap();
        queues[second].usage_count += 1;
        assert_eq!(
            queues.iter().map(|q| q.usage_count).collect::<Vec<_>>(),
            vec![1, 1]
        );

        let third = least_loaded_queue(&queues, 0).unwrap();
        queues[third].usage_count += 1;
        let mut counts: Vec<u32> = queues.iter().map(|q| q.usage_count).collect();
        counts.sort_unstable();
        assert_eq!(counts, vec![1, 2]);
    }

    #[test]
    fn least_loaded_ignores_other_families() {
        let mut queues = family_queues(0, 1);
        queues.extend(family_queues(3, 2));
        queues[0].usage_count = 100;

        let index = least_loaded_queue(&queues, 3).unwrap();
        assert_eq!(queues[index].family_index, 3);
    }

    #[test]
    fn empty_family_yields_none() {
        let queues = family_queues(0, 2);
        assert!(least_loaded_queue(&queues, 7).is_none());
    }

    #[test]
    fn acquire_release_round_trip() {
        let mut queues = family_queues(0, 2);
        let a = acquire_queue(&mut queues, 0).unwrap();
        let b = acquire_queue(&mut queues, 0).unwrap();
        release_queue(&mut queues, a);
        release_queue(&mut queues, b);
        assert!(queues.iter().all(|q| q.usage_count == 0));
    }

    #[test]
    #[should_panic(expected = "freed more times than acquired")]
    fn over_freeing_a_queue_aborts() {
        let mut queues = family_queues(0, 1);
        let index = acquire_queue(&mut queues, 0).unwrap();
        release_queue(&mut queues, index);
        release_queue(&mut queues, index);
    }

    #[test]
    fn queue_caps_map_to_native_flags() {
        let flags = queue_caps_to_vk(QueueCaps::GRAPHICS | QueueCaps::TRANSFER);
        assert!(flags.contains(vk::QueueFlags::GRAPHICS));
        assert!(flags.contains(vk::QueueFlags::TRANSFER));
        assert!(!flags.contains(vk::QueueFlags::COMPUTE));
    }
}
