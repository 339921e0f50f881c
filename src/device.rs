//! Input device detection and lookup

use crate::error::{RemapError, Result};
use evdev::Device;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which physical device a session should grab. Every field that is set
/// must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSelector {
    pub name: Option<String>,
    pub phys: Option<String>,
    pub path: Option<PathBuf>,
}

impl InputSelector {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phys.is_none() && self.path.is_none()
    }

    /// Check one candidate device against the selector
    pub fn matches(&self, path: &Path, name: Option<&str>, phys: Option<&str>) -> bool {
        if self.is_empty() {
            return false;
        }
        let name_ok = self.name.as_deref().is_none_or(|want| name == Some(want));
        let phys_ok = self.phys.as_deref().is_none_or(|want| phys == Some(want));
        let path_ok = self.path.as_deref().is_none_or(|want| want == path);
        name_ok && phys_ok && path_ok
    }
}

impl std::fmt::Display for InputSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(name) = &self.name {
            parts.push(format!("name={name:?}"));
        }
        if let Some(phys) = &self.phys {
            parts.push(format!("phys={phys:?}"));
        }
        if let Some(path) = &self.path {
            parts.push(format!("path={}", path.display()));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Information about a detected input device
#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub phys: String,
}

/// Find the first input device matching `selector`
pub fn find_input(selector: &InputSelector) -> Result<(PathBuf, Device)> {
    // A device given by path is opened directly, so a permission problem is
    // reported as such instead of as a missing device
    if let (Some(path), None, None) = (&selector.path, &selector.name, &selector.phys) {
        let dev = Device::open(path).map_err(|source| RemapError::OpenDevice {
            path: path.clone(),
            source,
        })?;
        return Ok((path.clone(), dev));
    }

    for (path, dev) in evdev::enumerate() {
        if selector.matches(&path, dev.name(), dev.physical_path()) {
            info!("Found input device {:?}: '{}'", path, dev.name().unwrap_or_default());
            return Ok((path, dev));
        }
        debug!("  skipping {:?}: '{}'", path, dev.name().unwrap_or_default());
    }

    Err(RemapError::DeviceNotFound(selector.to_string()))
}

/// List every input device readable by this process
pub fn list_input_devices() -> Vec<InputDeviceInfo> {
    let mut devices: Vec<InputDeviceInfo> = evdev::enumerate()
        .map(|(path, dev)| InputDeviceInfo {
            path,
            name: dev.name().unwrap_or_default().to_string(),
            phys: dev.physical_path().unwrap_or_default().to_string(),
        })
        .collect();
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices
}

/// Resolve a device argument given on the command line: a path, an event
/// number, or a name or physical address
pub fn resolve_device_arg(arg: &str) -> InputSelector {
    if arg.starts_with('/') {
        return InputSelector {
            path: Some(PathBuf::from(arg)),
            ..Default::default()
        };
    }
    if let Ok(num) = arg.strip_prefix("event").unwrap_or(arg).parse::<u32>() {
        return InputSelector {
            path: Some(PathBuf::from(format!("/dev/input/event{num}"))),
            ..Default::default()
        };
    }

    let by_phys = list_input_devices().into_iter().any(|d| d.phys == arg);
    if by_phys {
        InputSelector {
            phys: Some(arg.to_string()),
            ..Default::default()
        }
    } else {
        InputSelector {
            name: Some(arg.to_string()),
            ..Default::default()
        }
    }
}
