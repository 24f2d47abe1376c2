//! Tool catalog and argument shapes
//!
//! `ToolName` enumerates the device-facing tools the engine knows about.
//! Arguments arrive as loosely-typed JSON objects (`ToolArguments`); the
//! resolvers and composer narrow them into the partial records below before
//! doing any work.

use crate::client::VariableKind;
use crate::error::{Result, Things5Error};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Argument keys that carry a free-text device reference, in priority order
pub const DEVICE_SEARCH_KEYS: [&str; 4] = ["device_name", "machine_name", "search", "serial"];

/// Argument keys that carry a free-text command reference, in priority order
pub const COMMAND_SEARCH_KEYS: [&str; 2] = ["command_name", "action"];

/// Device-facing tools known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    DeviceDetails,
    DeviceUpdate,
    DeviceFirmwareDetail,
    MachineCommandExecute,
    PerformAction,
    MetricsRead,
    EventsRead,
    StatesRead,
    StateReadLastValue,
    ReadParameters,
    ReadSingleParameter,
    DeviceManagedRecipes,
    AggregatedMetrics,
    OverviewEvents,
    OverviewAlarms,
    ListMachines,
}

/// How the composer disambiguates a tool's target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionKind {
    /// Device and command (`device_id` + `machine_command_id`)
    Command,
    /// Device and telemetry names of one kind
    Telemetry {
        names_field: &'static str,
        kind: VariableKind,
    },
    /// Device only, written to `target`
    DeviceOnly { target: &'static str },
}

impl ToolName {
    pub const ALL: [ToolName; 16] = [
        ToolName::DeviceDetails,
        ToolName::DeviceUpdate,
        ToolName::DeviceFirmwareDetail,
        ToolName::MachineCommandExecute,
        ToolName::PerformAction,
        ToolName::MetricsRead,
        ToolName::EventsRead,
        ToolName::StatesRead,
        ToolName::StateReadLastValue,
        ToolName::ReadParameters,
        ToolName::ReadSingleParameter,
        ToolName::DeviceManagedRecipes,
        ToolName::AggregatedMetrics,
        ToolName::OverviewEvents,
        ToolName::OverviewAlarms,
        ToolName::ListMachines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::DeviceDetails => "device_details",
            ToolName::DeviceUpdate => "device_update",
            ToolName::DeviceFirmwareDetail => "device_firmware_detail",
            ToolName::MachineCommandExecute => "machine_command_execute",
            ToolName::PerformAction => "perform_action",
            ToolName::MetricsRead => "metrics_read",
            ToolName::EventsRead => "events_read",
            ToolName::StatesRead => "states_read",
            ToolName::StateReadLastValue => "state_read_last_value",
            ToolName::ReadParameters => "read_parameters",
            ToolName::ReadSingleParameter => "read_single_parameter",
            ToolName::DeviceManagedRecipes => "device_managed_recipes",
            ToolName::AggregatedMetrics => "aggregated_metrics",
            ToolName::OverviewEvents => "overview_events",
            ToolName::OverviewAlarms => "overview_alarms",
            ToolName::ListMachines => "list_machines",
        }
    }

    /// Cross-entity disambiguation this tool needs, if any
    pub fn composition(&self) -> Option<CompositionKind> {
        match self {
            ToolName::MachineCommandExecute => Some(CompositionKind::Command),
            ToolName::MetricsRead => Some(CompositionKind::Telemetry {
                names_field: "metric_names",
                kind: VariableKind::Metric,
            }),
            ToolName::EventsRead => Some(CompositionKind::Telemetry {
                names_field: "events_names",
                kind: VariableKind::Event,
            }),
            ToolName::StatesRead | ToolName::StateReadLastValue => {
                Some(CompositionKind::Telemetry {
                    names_field: "states_names",
                    kind: VariableKind::State,
                })
            }
            ToolName::DeviceDetails => Some(CompositionKind::DeviceOnly {
                target: "device_id",
            }),
            ToolName::DeviceFirmwareDetail | ToolName::DeviceManagedRecipes => {
                Some(CompositionKind::DeviceOnly {
                    target: "machine_id",
                })
            }
            _ => None,
        }
    }

    /// Argument that identifies the target device for this tool
    pub fn device_field(&self) -> &'static str {
        match self {
            ToolName::DeviceFirmwareDetail | ToolName::DeviceManagedRecipes => "machine_id",
            _ => "device_id",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = Things5Error;

    fn from_str(s: &str) -> Result<Self> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| Things5Error::invalid_input(format!("Unknown tool: {s}")))
    }
}

/// Loosely-typed argument object of a tool call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a JSON object; `null` is treated as an empty object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(Things5Error::invalid_input(format!(
                "Tool arguments must be a JSON object, received {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Non-empty string value (trimmed)
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// First non-empty string among `keys`
    pub fn first_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get_str(key))
    }

    /// String list value; a bare string counts as a one-element list
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Whether `key` holds a usable value (not null, empty string or empty list)
    pub fn has(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    }

    pub fn set<V: Into<Value>>(&mut self, key: &str, value: V) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Copy with `updates` written over the existing keys
    pub fn merged(&self, updates: &[(&str, Value)]) -> Self {
        let mut merged = self.clone();
        for (key, value) in updates {
            merged.set(key, value.clone());
        }
        merged
    }
}

impl From<Map<String, Value>> for ToolArguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// JSON type name used in validation messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// How the caller identified a device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelector {
    /// Explicit identifier (`device_id` / `machine_id`)
    pub id: Option<String>,
    /// Free-text reference (`device_name`, `machine_name`, `search`, `serial`)
    pub search: Option<String>,
}

impl DeviceSelector {
    pub fn from_args(args: &ToolArguments, id_field: &str) -> Self {
        Self {
            id: args
                .get_str(id_field)
                .or_else(|| args.get_str("device_id"))
                .or_else(|| args.get_str("machine_id"))
                .map(str::to_string),
            search: args.first_str(&DEVICE_SEARCH_KEYS).map(str::to_string),
        }
    }
}

/// Partial arguments of a command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandIntent {
    pub device: DeviceSelector,
    pub command_id: Option<String>,
    pub command_name: Option<String>,
}

impl CommandIntent {
    pub fn from_args(args: &ToolArguments) -> Self {
        Self {
            device: DeviceSelector::from_args(args, "device_id"),
            command_id: args.get_str("machine_command_id").map(str::to_string),
            command_name: args.first_str(&COMMAND_SEARCH_KEYS).map(str::to_string),
        }
    }

    /// Term handed to the matcher; the id wins over the name
    pub fn command_term(&self) -> Option<&str> {
        self.command_id.as_deref().or(self.command_name.as_deref())
    }
}

/// Partial arguments of a telemetry read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryIntent {
    pub device: DeviceSelector,
    pub names_field: &'static str,
    pub kind: VariableKind,
    pub names: Vec<String>,
}

impl TelemetryIntent {
    pub fn from_args(args: &ToolArguments, names_field: &'static str, kind: VariableKind) -> Self {
        Self {
            device: DeviceSelector::from_args(args, "device_id"),
            names_field,
            kind,
            names: args.get_string_list(names_field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_name_round_trip_and_unknown() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
        assert!("machine_command_create".parse::<ToolName>().is_err());
    }

    #[test]
    fn test_composition_kinds() {
        assert_eq!(
            ToolName::MachineCommandExecute.composition(),
            Some(CompositionKind::Command)
        );
        assert_eq!(
            ToolName::DeviceFirmwareDetail.composition(),
            Some(CompositionKind::DeviceOnly { target: "machine_id" })
        );
        assert!(ToolName::OverviewAlarms.composition().is_none());
    }

    #[test]
    fn test_arguments_accessors() {
        let args = ToolArguments::from_value(json!({
            "device_name": "  frigo ",
            "serial": "",
            "metric_names": "temperature",
            "limit": "5"
        }))
        .unwrap();

        assert_eq!(args.get_str("device_name"), Some("frigo"));
        assert_eq!(args.get_str("serial"), None);
        assert!(!args.has("serial"));
        assert_eq!(args.get_string_list("metric_names"), vec!["temperature"]);
        assert_eq!(args.get_u64("limit"), Some(5));

        assert!(ToolArguments::from_value(json!([1, 2])).is_err());
        assert_eq!(ToolArguments::from_value(Value::Null).unwrap(), ToolArguments::new());
    }

    #[test]
    fn test_partial_records() {
        let args = ToolArguments::from_value(json!({
            "machine_name": "Frigo Sala",
            "action": "defrost"
        }))
        .unwrap();

        let intent = CommandIntent::from_args(&args);
        assert_eq!(intent.device.id, None);
        assert_eq!(intent.device.search.as_deref(), Some("Frigo Sala"));
        assert_eq!(intent.command_term(), Some("defrost"));

        let args = ToolArguments::from_value(json!({
            "device_id": "d1",
            "device_name": "ignored",
            "states_names": ["door"]
        }))
        .unwrap();
        let intent = TelemetryIntent::from_args(&args, "states_names", VariableKind::State);
        assert_eq!(intent.device.id.as_deref(), Some("d1"));
        assert_eq!(intent.device.search.as_deref(), Some("ignored"));
        assert_eq!(intent.names, vec!["door"]);
    }
}
