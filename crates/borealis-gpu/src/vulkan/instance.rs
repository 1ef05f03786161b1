//! Vulkan instance bring-up: version check, capability negotiation against
//! the runtime, instance creation and physical device enumeration.

use std::ffi::{CStr, CString};

use ash::vk;
use raw_window_handle::HasDisplayHandle;

use crate::capability::{negotiate, CapabilityRequest, NegotiatedCapabilities};
use crate::device::{DeviceType, DeviceVendor, NativeDeviceHandle, RenderDevice};
use crate::error::{CapabilityKind, RenderError, Result};
use crate::params::DriverConfig;

/// Minimum instance API version the driver accepts.
pub(crate) const MIN_API_VERSION: u32 = vk::API_VERSION_1_2;

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

pub(crate) fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{}-{}",
        vk::api_version_major(version),
        vk::api_version_minor(version),
        vk::api_version_patch(version),
        vk::api_version_variant(version)
    )
}

/// Query the runtime's instance version and fail if it is below the
/// minimum. Loaders predating `vkEnumerateInstanceVersion` report 1.0.
pub(crate) fn check_api_version(entry: &ash::Entry) -> Result<u32> {
    let version = unsafe { entry.try_enumerate_instance_version()? }.unwrap_or(vk::API_VERSION_1_0);

    if version < MIN_API_VERSION {
        return Err(RenderError::ApiVersionTooLow {
            found: version_string(version),
            required: version_string(MIN_API_VERSION),
        });
    }

    tracing::info!("Vulkan API version: {}", version_string(version));
    Ok(version)
}

/// Negotiate instance extensions: the surface extensions the platform
/// demands are required; debug extensions are optional when validation is
/// on.
pub(crate) fn negotiate_instance_extensions(
    entry: &ash::Entry,
    display: &dyn HasDisplayHandle,
    validation: bool,
) -> Result<NegotiatedCapabilities> {
    let display_handle = display
        .display_handle()
        .map_err(|e| RenderError::SurfaceExtensionUnavailable(e.to_string()))?;

    // ash-window names VK_KHR_surface plus the platform-specific
    // presentation extension for this display.
    let surface_extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
        .map_err(|e| RenderError::SurfaceExtensionUnavailable(e.to_string()))?;

    let mut requested: Vec<CapabilityRequest> = surface_extensions
        .iter()
        .map(|&ptr| {
            let name = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
            CapabilityRequest::required(name)
        })
        .collect();

    if validation {
        requested.push(CapabilityRequest::optional(
            ash::ext::debug_utils::NAME.to_string_lossy().into_owned(),
        ));
        requested.push(CapabilityRequest::optional(
            ash::ext::debug_report::NAME.to_string_lossy().into_owned(),
        ));
    }

    let available = unsafe { entry.enumerate_instance_extension_properties(None)? };
    let available_names: Vec<String> = available
        .iter()
        .map(|props| {
            unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect();

    negotiate(
        CapabilityKind::InstanceExtension,
        requested,
        available_names.iter().map(String::as_str),
    )
}

/// Negotiate validation layers. The layer is optional: absence degrades to
/// an unvalidated instance with a warning, matching release builds.
pub(crate) fn negotiate_layers(
    entry: &ash::Entry,
    validation: bool,
) -> Result<NegotiatedCapabilities> {
    if !validation {
        return Ok(NegotiatedCapabilities::default());
    }

    let available = unsafe { entry.enumerate_instance_layer_properties()? };
    let available_names: Vec<String> = available
        .iter()
        .map(|props| {
            unsafe { CStr::from_ptr(props.layer_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect();

    negotiate(
        CapabilityKind::InstanceLayer,
        [CapabilityRequest::optional(VALIDATION_LAYER)],
        available_names.iter().map(String::as_str),
    )
}

/// Create the Vulkan instance with the negotiated extension and layer sets.
pub(crate) fn create_instance(
    entry: &ash::Entry,
    config: &DriverConfig,
    extensions: &NegotiatedCapabilities,
    layers: &NegotiatedCapabilities,
) -> Result<ash::Instance> {
    let app_name = CString::new(config.app_name.as_str()).unwrap_or_default();
    let engine_name = CString::new("Borealis").expect("static engine name");

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(&engine_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(MIN_API_VERSION);

    let extension_ptrs = extensions.name_ptrs();
    let layer_ptrs = layers.name_ptrs();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_ptrs)
        .enabled_layer_names(&layer_ptrs);

    let instance = unsafe { entry.create_instance(&create_info, None)? };
    Ok(instance)
}

/// Snapshot every physical device the instance exposes.
///
/// Empty enumeration is always fatal: the backend is unusable without at
/// least one device.
pub(crate) fn enumerate_devices(instance: &ash::Instance) -> Result<Vec<RenderDevice>> {
    let physical_devices = unsafe { instance.enumerate_physical_devices()? };

    let mut devices = Vec::with_capacity(physical_devices.len());
    for physical_device in physical_devices {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        tracing::info!("Found device: {name}");

        devices.push(RenderDevice {
            name,
            vendor: DeviceVendor::from_vendor_id(properties.vendor_id),
            device_type: device_type_from_vk(properties.device_type),
            device_id: properties.device_id,
            handle: NativeDeviceHandle(vk::Handle::as_raw(physical_device)),
        });
    }

    if devices.is_empty() {
        return Err(RenderError::NoSuitableDevice);
    }

    Ok(devices)
}

fn device_type_from_vk(device_type: vk::PhysicalDeviceType) -> DeviceType {
    match device_type {
        vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceType::Integrated,
        vk::PhysicalDeviceType::DISCRETE_GPU => DeviceType::Discrete,
        vk::PhysicalDeviceType::VIRTUAL_GPU => DeviceType::Virtual,
        vk::PhysicalDeviceType::CPU => DeviceType::Cpu,
        _ => DeviceType::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_mapping() {
        assert_eq!(
            device_type_from_vk(vk::PhysicalDeviceType::DISCRETE_GPU),
            DeviceType::Discrete
        );
        assert_eq!(
            device_type_from_vk(vk::PhysicalDeviceType::INTEGRATED_GPU),
            DeviceType::Integrated
        );
        assert_eq!(
            device_type_from_vk(vk::PhysicalDeviceType::OTHER),
            DeviceType::Other
        );
    }

    #[test]
    fn version_string_unpacks_fields() {
        let version = vk::make_api_version(0, 1, 2, 197);
        assert_eq!(version_string(version), "1.2.197-0");
    }

    #[test]
    fn minimum_version_is_enforced_shape() {
        assert!(vk::API_VERSION_1_0 < MIN_API_VERSION);
        assert!(vk::API_VERSION_1_3 >= MIN_API_VERSION);
    }
}
