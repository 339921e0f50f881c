//! Configuration loading
//!
//! Reads the TOML config file and resolves every name in it to evdev codes,
//! producing one [`DeviceConfig`] per configured device.

use crate::device::InputSelector;
use crate::event::EventCode;
use crate::mapping::{DEFAULT_RATE, DeviceRemaps, MappingEntry, RemapTable, Substitute, Timing, ValueSpec};
use evdev::{EventType, Key, MiscType, RelativeAxisType};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_OUTPUT_NAME: &str = "remapd virtual device";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("could not find config directory")]
    NoConfigDir,

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown event code '{0}'")]
    UnknownCode(String),

    #[error("unknown event type '{0}' (expected EV_KEY, EV_REL or EV_MSC)")]
    UnknownType(String),

    #[error("{source_code}: modifier group '{group}' is not defined for this device")]
    UnknownGroup { source_code: String, group: String },

    #[error("{source_code}: ambiguous mapping: {reason}")]
    Ambiguous { source_code: String, reason: &'static str },

    #[error("{source_code}: invalid value: {reason}")]
    InvalidValue { source_code: String, reason: String },

    #[error("device #{0} has none of input_name, input_phys or input_fn")]
    NoSelector(usize),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    devices: Vec<RawDevice>,
    run_shell_on_start: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDevice {
    input_name: Option<String>,
    input_phys: Option<String>,
    input_fn: Option<PathBuf>,
    output_name: Option<String>,
    #[serde(default)]
    remappings: BTreeMap<String, RawEntries>,
    #[serde(default)]
    modifier_groups: BTreeMap<String, BTreeMap<String, RawEntries>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntries {
    Many(Vec<RawEntry>),
    One(RawEntry),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    /// Bare target name
    Name(String),
    Table(RawEntryTable),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntryTable {
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<RawValue>,
    #[serde(default)]
    repeat: bool,
    #[serde(default)]
    delay: bool,
    /// Seconds
    rate: Option<f64>,
    count: Option<u32>,
    tap: Option<String>,
    hold: Option<String>,
    shell: Option<String>,
    modifier_group: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Many(Vec<RawScalar>),
    One(RawScalar),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Int(i32),
    Name(String),
}

/// One device to remap
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub selector: InputSelector,
    pub output_name: String,
    pub remaps: DeviceRemaps,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub devices: Vec<DeviceConfig>,
    /// Runs once every device has been registered
    pub run_shell_on_start: Option<String>,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("remapd").join("config.toml"))
    }

    /// Load from `path`, or from [`Config::default_path`] when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {:?} ({} devices)", path, config.devices.len());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)?;
        let devices = raw
            .devices
            .into_iter()
            .enumerate()
            .map(|(index, device)| resolve_device(index, device))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            devices,
            run_shell_on_start: raw.run_shell_on_start,
        })
    }
}

fn resolve_device(index: usize, raw: RawDevice) -> Result<DeviceConfig> {
    let selector = InputSelector {
        name: raw.input_name,
        phys: raw.input_phys,
        path: raw.input_fn,
    };
    if selector.is_empty() {
        return Err(ConfigError::NoSelector(index));
    }

    let group_names: HashSet<&str> = raw.modifier_groups.keys().map(String::as_str).collect();
    let mut remaps = DeviceRemaps::new(resolve_table(raw.remappings.iter(), &group_names)?);
    for (name, table) in &raw.modifier_groups {
        remaps
            .groups
            .insert(name.clone(), resolve_table(table.iter(), &group_names)?);
    }

    Ok(DeviceConfig {
        selector,
        output_name: raw.output_name.unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_string()),
        remaps,
    })
}

fn resolve_table<'a>(
    entries: impl Iterator<Item = (&'a String, &'a RawEntries)>,
    groups: &HashSet<&str>,
) -> Result<RemapTable> {
    let mut table = RemapTable::new();
    for (source, raw) in entries {
        let code = parse_code(source, None)?;
        let resolved = match raw {
            RawEntries::Many(list) => list
                .iter()
                .map(|entry| resolve_entry(source, entry, groups))
                .collect::<Result<Vec<_>>>()?,
            RawEntries::One(entry) => vec![resolve_entry(source, entry, groups)?],
        };
        table.insert(code, resolved);
    }
    Ok(table)
}

fn resolve_entry(source: &str, raw: &RawEntry, groups: &HashSet<&str>) -> Result<MappingEntry> {
    let table = match raw {
        RawEntry::Name(name) => {
            let target = parse_code(name, None)?;
            return Ok(MappingEntry::Substitute(Substitute {
                code: target.code,
                kind: implied_kind(target),
                values: Vec::new(),
                timing: Timing::Immediate,
            }));
        }
        RawEntry::Table(table) => table,
    };

    let ambiguous = |reason: &'static str| ConfigError::Ambiguous {
        source_code: source.to_string(),
        reason,
    };

    let roles = [
        table.code.is_some(),
        table.tap.is_some() || table.hold.is_some(),
        table.shell.is_some(),
        table.modifier_group.is_some(),
    ];
    if roles.iter().filter(|set| **set).count() > 1 {
        return Err(ambiguous("only one of code, tap/hold, shell or modifier_group may be set"));
    }
    let has_code_options = table.kind.is_some()
        || table.value.is_some()
        || table.repeat
        || table.delay
        || table.rate.is_some()
        || table.count.is_some();
    if table.code.is_none() && has_code_options {
        return Err(ambiguous("type, value, repeat, delay, rate and count require code"));
    }

    if let Some(code) = &table.code {
        return resolve_substitute(source, code, table).map(MappingEntry::Substitute);
    }
    match (&table.tap, &table.hold) {
        (Some(tap), Some(hold)) => {
            return Ok(MappingEntry::TapHold {
                tap: parse_key(tap)?,
                hold: parse_key(hold)?,
            });
        }
        (Some(_), None) => return Err(ambiguous("tap requires hold")),
        (None, Some(_)) => return Err(ambiguous("hold requires tap")),
        (None, None) => {}
    }
    if let Some(command) = &table.shell {
        return Ok(MappingEntry::Shell {
            command: command.clone(),
        });
    }
    if let Some(group) = &table.modifier_group {
        if !groups.contains(group.as_str()) {
            return Err(ConfigError::UnknownGroup {
                source_code: source.to_string(),
                group: group.clone(),
            });
        }
        return Ok(MappingEntry::GroupTrigger { group: group.clone() });
    }
    Ok(MappingEntry::PassThrough)
}

fn resolve_substitute(source: &str, code: &str, table: &RawEntryTable) -> Result<Substitute> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        source_code: source.to_string(),
        reason,
    };

    let kind = table.kind.as_deref().map(parse_type).transpose()?;
    let target = parse_code(code, kind)?;
    let kind = kind.or_else(|| implied_kind(target));

    let values = match &table.value {
        None => Vec::new(),
        Some(RawValue::One(scalar)) => vec![parse_value(scalar).map_err(invalid)?],
        Some(RawValue::Many(list)) => list
            .iter()
            .map(|scalar| parse_value(scalar).map_err(invalid))
            .collect::<Result<Vec<_>>>()?,
    };

    let count = table.count.unwrap_or(0);
    let timing = match (table.repeat, table.delay) {
        (true, true) => {
            return Err(ConfigError::Ambiguous {
                source_code: source.to_string(),
                reason: "repeat and delay are mutually exclusive",
            });
        }
        (true, false) => {
            let rate = match table.rate {
                None => DEFAULT_RATE,
                Some(secs) => match Duration::try_from_secs_f64(secs) {
                    Ok(rate) if !rate.is_zero() => rate,
                    _ => return Err(invalid(format!("rate must be a positive number of seconds, got {secs}"))),
                },
            };
            Timing::Repeat { rate, count }
        }
        (false, true) => Timing::Delay { count },
        (false, false) => Timing::Immediate,
    };

    Ok(Substitute {
        code: target.code,
        kind,
        values,
        timing,
    })
}

/// Relative-axis targets switch the event class even without an explicit type
fn implied_kind(target: EventCode) -> Option<EventType> {
    (target.kind == EventType::RELATIVE).then_some(EventType::RELATIVE)
}

fn parse_type(name: &str) -> Result<EventType> {
    match name {
        "EV_KEY" => Ok(EventType::KEY),
        "EV_REL" => Ok(EventType::RELATIVE),
        "EV_MSC" => Ok(EventType::MISC),
        other => Err(ConfigError::UnknownType(other.to_string())),
    }
}

/// Resolve a code name; the class comes from `kind` or the name's prefix
fn parse_code(name: &str, kind: Option<EventType>) -> Result<EventCode> {
    let unknown = || ConfigError::UnknownCode(name.to_string());
    let kind = kind.unwrap_or(if name.starts_with("REL_") {
        EventType::RELATIVE
    } else if name.starts_with("MSC_") {
        EventType::MISC
    } else {
        EventType::KEY
    });

    let code = match kind {
        EventType::RELATIVE => RelativeAxisType::from_str(name).map_err(|_| unknown())?.0,
        EventType::MISC => MiscType::from_str(name).map_err(|_| unknown())?.0,
        _ => Key::from_str(name).map_err(|_| unknown())?.code(),
    };
    Ok(EventCode::new(kind, code))
}

fn parse_key(name: &str) -> Result<u16> {
    Key::from_str(name)
        .map(|key| key.code())
        .map_err(|_| ConfigError::UnknownCode(name.to_string()))
}

fn parse_value(scalar: &RawScalar) -> std::result::Result<ValueSpec, String> {
    match scalar {
        RawScalar::Int(v) => Ok(ValueSpec::Literal(*v)),
        RawScalar::Name(name) => match name.as_str() {
            "POINTER_SPEED" => Ok(ValueSpec::PointerAccelPositive),
            "-POINTER_SPEED" => Ok(ValueSpec::PointerAccelNegative),
            other => Err(format!("expected an integer, POINTER_SPEED or -POINTER_SPEED, got '{other}'")),
        },
    }
}
