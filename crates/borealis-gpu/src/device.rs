//! Device registry types and auto-selection.

use crate::error::{RenderError, Result};

/// GPU vendor identification from the PCI vendor ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl DeviceVendor {
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Hardware class of a device, as reported at enumeration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Other,
    Integrated,
    Discrete,
    Virtual,
    Cpu,
}

/// Non-owning reference into the native API, resolved only by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NativeDeviceHandle(pub(crate) u64);

/// Immutable snapshot of a physical device taken at enumeration time.
#[derive(Debug, Clone)]
pub struct RenderDevice {
    pub name: String,
    pub vendor: DeviceVendor,
    pub device_type: DeviceType,
    pub device_id: u32,
    pub(crate) handle: NativeDeviceHandle,
}

/// Fixed type-preference score; `prefer_integrated` swaps the top two.
fn score_device_type(device_type: DeviceType, prefer_integrated: bool) -> u32 {
    match device_type {
        DeviceType::Discrete => {
            if prefer_integrated {
                3
            } else {
                4
            }
        }
        DeviceType::Integrated => {
            if prefer_integrated {
                4
            } else {
                3
            }
        }
        DeviceType::Virtual => 2,
        DeviceType::Cpu => 1,
        DeviceType::Other => 0,
    }
}

/// Pick the best device index from an enumeration snapshot.
///
/// `supports_surfaces` reports whether the device at an index can present to
/// every required surface; devices failing it are discarded before scoring.
/// Ties keep the first-seen candidate. Empty enumeration and fully filtered
/// lists both fail with [`RenderError::NoSuitableDevice`].
pub(crate) fn choose_device(
    devices: &[RenderDevice],
    supports_surfaces: impl Fn(usize) -> bool,
    prefer_integrated: bool,
) -> Result<usize> {
    let mut best: Option<(usize, u32)> = None;

    for (index, device) in devices.iter().enumerate() {
        if !supports_surfaces(index) {
            continue;
        }
        let score = score_device_type(device.device_type, prefer_integrated);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    best.map(|(index, _)| index)
        .ok_or(RenderError::NoSuitableDevice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, device_type: DeviceType) -> RenderDevice {
        RenderDevice {
            name: name.to_string(),
            vendor: DeviceVendor::Other(0),
            device_type,
            device_id: 0,
            handle: NativeDeviceHandle(0),
        }
    }

    fn test_devices() -> Vec<RenderDevice> {
        vec![
            device("igpu", DeviceType::Integrated),
            device("dgpu", DeviceType::Discrete),
            device("vgpu", DeviceType::Virtual),
        ]
    }

    #[test]
    fn unconstrained_selection_prefers_discrete() {
        let devices = test_devices();
        let index = choose_device(&devices, |_| true, false).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn surface_filter_overrides_score() {
        // Only the integrated device can present to the surface.
        let devices = test_devices();
        let index = choose_device(&devices, |i| i == 0, false).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn prefer_integrated_inverts_top_two() {
        let devices = test_devices();
        let index = choose_device(&devices, |_| true, true).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn ties_keep_first_seen() {
        let devices = vec![
            device("dgpu0", DeviceType::Discrete),
            device("dgpu1", DeviceType::Discrete),
        ];
        let index = choose_device(&devices, |_| true, false).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn empty_enumeration_is_fatal() {
        let result = choose_device(&[], |_| true, false);
        assert!(matches!(result, Err(RenderError::NoSuitableDevice)));
    }

    #[test]
    fn fully_filtered_list_is_fatal() {
        let devices = test_devices();
        let result = choose_device(&devices, |_| false, false);
        assert!(matches!(result, Err(RenderError::NoSuitableDevice)));
    }

    #[test]
    fn selection_is_deterministic() {
        let devices = test_devices();
        let first = choose_device(&devices, |_| true, false).unwrap();
        for _ in 0..8 {
            assert_eq!(choose_device(&devices, |_| true, false).unwrap(), first);
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(DeviceVendor::from_vendor_id(0x10DE), DeviceVendor::Nvidia);
        assert_eq!(DeviceVendor::from_vendor_id(0x1002), DeviceVendor::Amd);
        assert_eq!(DeviceVendor::from_vendor_id(0x8086), DeviceVendor::Intel);
        assert_eq!(
            DeviceVendor::from_vendor_id(0x1234),
            DeviceVendor::Other(0x1234)
        );
    }
}
