//! Dependency resolution
//!
//! A typed registry maps each tool to the parameters that can be filled from
//! context, in the order they must be tried. Resolvers never fail the call:
//! a parameter that cannot be resolved is left absent and the tool's schema
//! reports it later.

use crate::client::{AuthContext, DeviceRecord, VariableKind};
use crate::error::{Result, Things5Error};
use crate::services::{find, find_all, CapabilityFetcher, InventoryCache};
use crate::tools::{ToolArguments, ToolName, COMMAND_SEARCH_KEYS, DEVICE_SEARCH_KEYS};
use crate::validation::SchemaValidator;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// How a missing parameter is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterResolver {
    /// Match `device_name` / `machine_name` / `search` / `serial` against the inventory
    DeviceId,
    /// Match `command_name` / `action` against the resolved device's commands
    MachineCommandId,
    /// Metric names of the resolved device, optionally filtered by `metric_name`
    MetricNames,
    /// Every known device id, capped by `limit`
    DeviceIdList,
}

impl ParameterResolver {
    fn needs_inventory(&self) -> bool {
        matches!(self, ParameterResolver::DeviceId | ParameterResolver::DeviceIdList)
    }
}

/// One auto-resolvable parameter of a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDependency {
    pub parameter: &'static str,
    pub resolver: ParameterResolver,
    pub description: &'static str,
}

impl ToolDependency {
    const fn new(
        parameter: &'static str,
        resolver: ParameterResolver,
        description: &'static str,
    ) -> Self {
        Self {
            parameter,
            resolver,
            description,
        }
    }
}

const DEVICE_ID: ToolDependency = ToolDependency::new(
    "device_id",
    ParameterResolver::DeviceId,
    "device_id from device_name/search/serial",
);

const MACHINE_ID: ToolDependency = ToolDependency::new(
    "machine_id",
    ParameterResolver::DeviceId,
    "machine_id from device_name/search/serial",
);

/// Tool → ordered parameter resolvers
#[derive(Debug, Clone)]
pub struct DependencyRegistry {
    entries: HashMap<ToolName, Vec<ToolDependency>>,
}

impl DependencyRegistry {
    /// Registry for the device-facing tool catalog
    pub fn standard() -> Self {
        let mut entries = HashMap::new();

        for tool in [
            ToolName::DeviceDetails,
            ToolName::DeviceUpdate,
            ToolName::PerformAction,
            ToolName::EventsRead,
            ToolName::StatesRead,
            ToolName::StateReadLastValue,
            ToolName::ReadParameters,
            ToolName::ReadSingleParameter,
        ] {
            entries.insert(tool, vec![DEVICE_ID]);
        }

        for tool in [ToolName::DeviceFirmwareDetail, ToolName::DeviceManagedRecipes] {
            entries.insert(tool, vec![MACHINE_ID]);
        }

        entries.insert(
            ToolName::MachineCommandExecute,
            vec![
                DEVICE_ID,
                ToolDependency::new(
                    "machine_command_id",
                    ParameterResolver::MachineCommandId,
                    "machine_command_id from command_name/action",
                ),
            ],
        );

        entries.insert(
            ToolName::MetricsRead,
            vec![
                DEVICE_ID,
                ToolDependency::new(
                    "metric_names",
                    ParameterResolver::MetricNames,
                    "metric_names from the device's firmware",
                ),
            ],
        );

        entries.insert(
            ToolName::AggregatedMetrics,
            vec![ToolDependency::new(
                "device_ids",
                ParameterResolver::DeviceIdList,
                "device_ids from the organization inventory",
            )],
        );

        entries.insert(
            ToolName::OverviewEvents,
            vec![ToolDependency::new(
                "machine_ids",
                ParameterResolver::DeviceIdList,
                "machine_ids from the organization inventory",
            )],
        );

        Self { entries }
    }

    pub fn dependencies(&self, tool: ToolName) -> &[ToolDependency] {
        self.entries.get(&tool).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any parameter of `tool_name` can be filled from context
    pub fn can_auto_resolve(&self, tool_name: &str) -> bool {
        !self.resolvable_parameters(tool_name).is_empty()
    }

    /// Parameters of `tool_name` the registry can fill, in resolution order
    pub fn resolvable_parameters(&self, tool_name: &str) -> Vec<&'static str> {
        tool_name
            .parse::<ToolName>()
            .map(|tool| self.dependencies(tool).iter().map(|d| d.parameter).collect())
            .unwrap_or_default()
    }

    /// Check the registry against the tool contracts
    ///
    /// Every target must be declared by its tool, and every tool that requires
    /// its device field must be able to resolve it.
    pub fn validate(&self, validator: &SchemaValidator) -> Result<()> {
        for (tool, dependencies) in &self.entries {
            for dependency in dependencies {
                if !validator.declares(*tool, dependency.parameter) {
                    return Err(Things5Error::config(format!(
                        "Resolver target '{}' is not a parameter of {}",
                        dependency.parameter, tool
                    )));
                }
            }
        }

        for tool in ToolName::ALL {
            let device_field = tool.device_field();
            if validator.required_fields(tool).contains(&device_field)
                && !self
                    .dependencies(tool)
                    .iter()
                    .any(|d| d.parameter == device_field)
            {
                return Err(Things5Error::config(format!(
                    "{tool} requires {device_field} but has no resolver for it"
                )));
            }
        }

        Ok(())
    }
}

/// Arguments after dependency resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub arguments: ToolArguments,
    /// Parameters filled from context, in resolution order
    pub resolved: Vec<&'static str>,
}

/// Fills missing parameters from the inventory and device capabilities
pub struct DependencyResolver {
    registry: DependencyRegistry,
    inventory: Arc<InventoryCache>,
    capabilities: CapabilityFetcher,
}

impl DependencyResolver {
    pub fn new(
        registry: DependencyRegistry,
        inventory: Arc<InventoryCache>,
        capabilities: CapabilityFetcher,
    ) -> Self {
        Self {
            registry,
            inventory,
            capabilities,
        }
    }

    pub fn registry(&self) -> &DependencyRegistry {
        &self.registry
    }

    /// Fill every missing parameter the registry knows for `tool_name`
    pub async fn resolve(
        &self,
        tool_name: &str,
        args: ToolArguments,
        auth: &AuthContext,
        inventory: Option<&[DeviceRecord]>,
    ) -> Resolution {
        self.resolve_except(tool_name, args, auth, inventory, &[])
            .await
    }

    /// Like [`resolve`](Self::resolve), leaving the parameters in `skip` alone
    pub async fn resolve_except(
        &self,
        tool_name: &str,
        mut args: ToolArguments,
        auth: &AuthContext,
        inventory: Option<&[DeviceRecord]>,
        skip: &[&str],
    ) -> Resolution {
        let mut resolved = Vec::new();
        let Ok(tool) = tool_name.parse::<ToolName>() else {
            return Resolution {
                arguments: args,
                resolved,
            };
        };

        let mut fetched: Option<Vec<DeviceRecord>> = None;

        for dependency in self.registry.dependencies(tool) {
            if args.has(dependency.parameter) || skip.contains(&dependency.parameter) {
                continue;
            }

            if inventory.is_none() && fetched.is_none() && dependency.resolver.needs_inventory() {
                fetched = Some(self.inventory.get_devices(auth, false).await);
            }
            let devices = inventory.or(fetched.as_deref()).unwrap_or(&[]);

            debug!("[{}] resolving {}", tool_name, dependency.description);
            match self
                .run(dependency.resolver, &args, auth, devices)
                .await
            {
                Some(value) => {
                    info!("[{}] resolved {} = {}", tool_name, dependency.parameter, value);
                    args.set(dependency.parameter, value);
                    resolved.push(dependency.parameter);
                }
                None => debug!("[{}] could not resolve {}", tool_name, dependency.parameter),
            }
        }

        Resolution {
            arguments: args,
            resolved,
        }
    }

    async fn run(
        &self,
        resolver: ParameterResolver,
        args: &ToolArguments,
        auth: &AuthContext,
        devices: &[DeviceRecord],
    ) -> Option<Value> {
        match resolver {
            ParameterResolver::DeviceId => {
                let term = args.first_str(&DEVICE_SEARCH_KEYS)?;
                match find_all(devices, term).as_slice() {
                    [device] => Some(Value::from(device.id.clone())),
                    [] => None,
                    several => {
                        debug!("'{}' matches {} devices, not picking one", term, several.len());
                        None
                    }
                }
            }
            ParameterResolver::MachineCommandId => {
                let device_id = resolved_device(args)?;
                let term = args.first_str(&COMMAND_SEARCH_KEYS)?;
                let commands = self.capabilities.get_commands(device_id, auth).await;
                find(&commands, term).map(|command| Value::from(command.id.clone()))
            }
            ParameterResolver::MetricNames => {
                let device_id = resolved_device(args)?;
                let variables = self
                    .capabilities
                    .get_variables(device_id, auth, VariableKind::Metric)
                    .await;
                let names: Vec<String> = match args.get_str("metric_name") {
                    Some(filter) => find_all(&variables, filter)
                        .into_iter()
                        .map(|v| v.name.clone())
                        .collect(),
                    None => variables.into_iter().map(|v| v.name).collect(),
                };
                (!names.is_empty()).then(|| Value::from(names))
            }
            ParameterResolver::DeviceIdList => {
                let limit = args
                    .get_u64("limit")
                    .and_then(|l| usize::try_from(l).ok())
                    .unwrap_or(devices.len());
                let ids: Vec<String> = devices.iter().take(limit).map(|d| d.id.clone()).collect();
                (!ids.is_empty()).then(|| Value::from(ids))
            }
        }
    }
}

fn resolved_device(args: &ToolArguments) -> Option<&str> {
    args.get_str("device_id").or_else(|| args.get_str("machine_id"))
}
