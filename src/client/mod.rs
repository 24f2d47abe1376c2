//! Things5 platform client: wire types and the remote API trait

pub mod http_client;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller credentials forwarded to the platform as a bearer token
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AuthContext {
    token: String,
}

impl AuthContext {
    /// Wrap a bearer token
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Raw bearer token for the Authorization header
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &"***")
            .finish()
    }
}

/// Device visible to the caller's organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Opaque, stable identifier
    pub id: String,
    /// Display name (user editable)
    #[serde(default)]
    pub name: String,
    /// Serial number, stable secondary key
    #[serde(default)]
    pub serial: String,
    /// Current connectivity
    #[serde(default)]
    pub is_connected: bool,
    /// Machine model reference
    #[serde(default, rename = "machine_model_id")]
    pub model_ref: Option<String>,
    /// Firmware reference
    #[serde(default, rename = "machine_firmware_id")]
    pub firmware_ref: Option<String>,
    /// Whether the device is active on the platform
    #[serde(default)]
    pub active: Option<bool>,
}

/// Parameter accepted by a machine command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: Option<String>,
}

/// Command exposed by a device's firmware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<CommandParameter>,
}

/// Kind of a telemetry variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Metric,
    Event,
    State,
    Parameter,
    Other,
}

impl VariableKind {
    /// Classify from the firmware `type` field, falling back to `source`
    pub fn classify(kind: Option<&str>, source: Option<&str>) -> Self {
        let parse = |value: &str| match value.to_lowercase().as_str() {
            "metric" | "metrics" => Some(Self::Metric),
            "event" | "events" => Some(Self::Event),
            "state" | "states" => Some(Self::State),
            "parameter" | "parameters" => Some(Self::Parameter),
            _ => None,
        };

        kind.and_then(parse)
            .or_else(|| source.and_then(parse))
            .unwrap_or(Self::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Event => "event",
            Self::State => "state",
            Self::Parameter => "parameter",
            Self::Other => "other",
        }
    }
}

/// Telemetry variable exposed by a device's firmware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub kind: VariableKind,
}

/// Which optional sections to request from the firmware-detail endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FirmwareInclude {
    pub commands: bool,
    pub variables: bool,
}

impl FirmwareInclude {
    pub const COMMANDS: Self = Self {
        commands: true,
        variables: false,
    };

    pub const VARIABLES: Self = Self {
        commands: false,
        variables: true,
    };
}

/// Firmware detail of one device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FirmwareDetail {
    pub id: Option<String>,
    pub version: Option<String>,
    pub commands: Vec<CommandRecord>,
    pub variables: Vec<VariableRecord>,
}

/// Commands and metric names of one device, valid for a single resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapabilitySet {
    pub device_id: String,
    pub commands: Vec<CommandRecord>,
    pub metrics: Vec<String>,
}

/// Trait for Things5 platform clients
#[async_trait]
pub trait Things5Client: Send + Sync {
    /// Resolve the caller's (first) organization id
    async fn organization_id(&self, auth: &AuthContext) -> Result<String>;

    /// List every device of the organization, following server pagination
    async fn list_devices(&self, auth: &AuthContext, organization_id: &str)
        -> Result<Vec<DeviceRecord>>;

    /// Fetch a device's firmware detail with the requested inclusions
    async fn machine_firmware(
        &self,
        auth: &AuthContext,
        organization_id: &str,
        device_id: &str,
        include: FirmwareInclude,
    ) -> Result<FirmwareDetail>;
}
