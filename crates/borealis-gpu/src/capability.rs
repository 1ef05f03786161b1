//! Capability negotiation.
//!
//! Instance extensions, validation layers and device extensions are all
//! "negotiate a name list" problems with the same shape: collect requests,
//! scan what the runtime offers once, then split the leftovers into fatal
//! (required) and degraded (optional). One algorithm serves all three.

use std::ffi::CString;

use hashbrown::HashMap;

use crate::error::{CapabilityKind, RenderError, Result};

/// A single capability request.
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    pub name: String,
    pub required: bool,
}

impl CapabilityRequest {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// Outcome of a successful negotiation.
///
/// `enabled` holds the matched names as C strings so they can back the
/// pointer arrays handed to instance/device creation; the driver keeps this
/// struct alive for as long as those pointers are needed.
#[derive(Debug, Default)]
pub struct NegotiatedCapabilities {
    /// Names found in the available set, in scan order.
    pub enabled: Vec<CString>,
    /// Optional names that were requested but are unavailable.
    pub missing: Vec<String>,
}

impl NegotiatedCapabilities {
    /// Raw pointers for `enabled_extension_names`/`enabled_layer_names`.
    pub fn name_ptrs(&self) -> Vec<*const std::ffi::c_char> {
        self.enabled.iter().map(|name| name.as_ptr()).collect()
    }

    /// Whether a name made it into the enabled set.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled
            .iter()
            .any(|enabled| enabled.as_bytes() == name.as_bytes())
    }
}

/// Intersect `requested` against `available`.
///
/// Every available name is visited once; matches are recorded as enabled and
/// removed from the pending set. Any pending required name afterwards fails
/// the whole negotiation; pending optional names are logged and reported as
/// degraded.
pub fn negotiate<'a>(
    kind: CapabilityKind,
    requested: impl IntoIterator<Item = CapabilityRequest>,
    available: impl IntoIterator<Item = &'a str>,
) -> Result<NegotiatedCapabilities> {
    let mut pending: HashMap<String, bool> = requested
        .into_iter()
        .map(|request| (request.name, request.required))
        .collect();

    let mut negotiated = NegotiatedCapabilities::default();

    for name in available {
        if pending.remove(name).is_some() {
            tracing::info!("Using {kind}: {name}");
            negotiated
                .enabled
                .push(CString::new(name).expect("capability name contains NUL"));
        }
        if pending.is_empty() {
            break;
        }
    }

    let mut missing_required: Vec<String> = Vec::new();
    for (name, required) in pending {
        if required {
            tracing::error!("Required {kind} not found: {name}");
            missing_required.push(name);
        } else {
            tracing::warn!("Optional {kind} not found: {name}");
            negotiated.missing.push(name);
        }
    }

    if !missing_required.is_empty() {
        missing_required.sort();
        return Err(RenderError::MissingCapabilities {
            kind,
            names: missing_required,
        });
    }

    negotiated.missing.sort();
    Ok(negotiated)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIND: CapabilityKind = CapabilityKind::InstanceExtension;

    #[test]
    fn all_required_present() {
        let negotiated = negotiate(
            KIND,
            [
                CapabilityRequest::required("VK_KHR_surface"),
                CapabilityRequest::required("VK_KHR_xlib_surface"),
            ],
            ["VK_KHR_surface", "VK_KHR_xlib_surface", "VK_EXT_unrelated"],
        )
        .unwrap();

        assert_eq!(negotiated.enabled.len(), 2);
        assert!(negotiated.is_enabled("VK_KHR_surface"));
        assert!(negotiated.is_enabled("VK_KHR_xlib_surface"));
        assert!(negotiated.missing.is_empty());
    }

    #[test]
    fn missing_required_fails() {
        let result = negotiate(
            KIND,
            [
                CapabilityRequest::required("VK_KHR_surface"),
                CapabilityRequest::required("VK_KHR_xlib_surface"),
            ],
            ["VK_KHR_surface"],
        );

        match result {
            Err(RenderError::MissingCapabilities { kind, names }) => {
                assert_eq!(kind, KIND);
                assert_eq!(names, vec!["VK_KHR_xlib_surface".to_string()]);
            }
            other => panic!("expected MissingCapabilities, got {other:?}"),
        }
    }

    #[test]
    fn missing_optional_degrades() {
        let negotiated = negotiate(
            KIND,
            [
                CapabilityRequest::required("VK_KHR_surface"),
                CapabilityRequest::optional("VK_EXT_debug_utils"),
            ],
            ["VK_KHR_surface"],
        )
        .unwrap();

        assert_eq!(negotiated.enabled.len(), 1);
        assert!(negotiated.is_enabled("VK_KHR_surface"));
        assert_eq!(negotiated.missing, vec!["VK_EXT_debug_utils".to_string()]);
    }

    #[test]
    fn optional_absence_does_not_affect_enabled_set() {
        let with_optional = negotiate(
            KIND,
            [
                CapabilityRequest::required("VK_KHR_surface"),
                CapabilityRequest::optional("VK_EXT_debug_utils"),
            ],
            ["VK_KHR_surface"],
        )
        .unwrap();
        let without_optional = negotiate(
            KIND,
            [CapabilityRequest::required("VK_KHR_surface")],
            ["VK_KHR_surface"],
        )
        .unwrap();

        assert_eq!(with_optional.enabled, without_optional.enabled);
    }

    #[test]
    fn empty_request_is_trivially_satisfied() {
        let negotiated = negotiate(KIND, [], ["VK_KHR_surface"]).unwrap();
        assert!(negotiated.enabled.is_empty());
        assert!(negotiated.missing.is_empty());
    }
}
