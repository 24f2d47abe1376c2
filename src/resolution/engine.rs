//! Intent engine
//!
//! The facade the tool-dispatch layer calls before a tool's own handler.
//! `prepare` runs the whole pipeline (normalize, resolve dependencies,
//! compose when needed, validate) and always ends in a
//! [`ResolutionOutcome`]; the individual stages are exposed as well.

use crate::client::{AuthContext, CapabilitySet, DeviceRecord, Things5Client};
use crate::config::IntentConfig;
use crate::error::Result;
use crate::logging::LoggingMiddleware;
use crate::services::{CacheInfo, CapabilityFetcher, InventoryCache};
use crate::tools::{CompositionKind, ToolArguments, ToolName};
use crate::validation::{sanitize, SchemaValidator};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::composer::{CompositionRequest, IntentComposer};
use super::dependencies::{DependencyRegistry, DependencyResolver};
use super::hints::HintTables;
use super::outcome::ResolutionOutcome;

/// Confidence of a completion that needed context-based resolution
const AUTO_RESOLVED: f64 = 0.9;

/// One tool invocation to prepare
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    pub tool_name: String,
    pub raw_arguments: Value,
    pub free_text_hint: Option<String>,
    pub auth: AuthContext,
}

impl ResolutionRequest {
    pub fn new<S: Into<String>>(tool_name: S, raw_arguments: Value, auth: AuthContext) -> Self {
        Self {
            tool_name: tool_name.into(),
            raw_arguments,
            free_text_hint: None,
            auth,
        }
    }

    pub fn with_hint<S: Into<String>>(mut self, hint: S) -> Self {
        self.free_text_hint = Some(hint.into());
        self
    }
}

/// Intent resolution engine shared by every tool call
pub struct IntentEngine {
    inventory: Arc<InventoryCache>,
    capabilities: CapabilityFetcher,
    resolver: DependencyResolver,
    composer: IntentComposer,
    validator: SchemaValidator,
}

impl IntentEngine {
    /// Build the engine; fails on an inconsistent registry or unreadable hint tables
    pub fn new(config: &IntentConfig, client: Arc<dyn Things5Client>) -> Result<Self> {
        let validator = SchemaValidator::new()?;
        let registry = DependencyRegistry::standard();
        registry.validate(&validator)?;

        let hints = match &config.hint_tables {
            Some(path) => {
                info!("Loading hint tables from {}", path.display());
                HintTables::from_file(path)?
            }
            None => HintTables::builtin()?,
        };

        let inventory = Arc::new(InventoryCache::new(
            client.clone(),
            config.inventory_ttl,
            config.fetch_timeout,
        ));
        let capabilities = CapabilityFetcher::new(client, config.fetch_timeout);

        Ok(Self {
            resolver: DependencyResolver::new(registry, inventory.clone(), capabilities.clone()),
            composer: IntentComposer::new(
                capabilities.clone(),
                Arc::new(hints),
                config.max_suggestions,
                config.capability_concurrency,
            ),
            capabilities,
            inventory,
            validator,
        })
    }

    /// Normalize argument shapes
    pub fn sanitize(&self, tool_name: &str, raw_args: Value) -> Value {
        sanitize(tool_name, raw_args)
    }

    /// Fill parameters the registry can resolve from context
    pub async fn resolve_dependencies(
        &self,
        tool_name: &str,
        args: Value,
        auth: &AuthContext,
        inventory: Option<&[DeviceRecord]>,
    ) -> Value {
        let Value::Object(map) = args else {
            return args;
        };
        self.resolver
            .resolve(tool_name, ToolArguments::from(map), auth, inventory)
            .await
            .arguments
            .into_value()
    }

    /// Jointly disambiguate device and command/telemetry for `tool_name`
    pub async fn compose(
        &self,
        tool_name: &str,
        raw_args: Value,
        free_text_hint: Option<&str>,
        inventory: Option<&[DeviceRecord]>,
        auth: &AuthContext,
    ) -> ResolutionOutcome {
        let args = match ToolArguments::from_value(raw_args) {
            Ok(args) => args,
            Err(e) => return ResolutionOutcome::failed(e.to_string()),
        };
        let Ok(tool) = tool_name.parse::<ToolName>() else {
            return ResolutionOutcome::completed(args, None, 1.0);
        };

        let fetched;
        let devices = match inventory {
            Some(devices) => devices,
            None => {
                fetched = self.inventory.get_devices(auth, false).await;
                fetched.as_slice()
            }
        };

        let composition = self
            .composer
            .compose(CompositionRequest {
                tool,
                args: &args,
                hint: free_text_hint,
                devices,
                auth,
            })
            .await;
        self.checked(tool_name, composition.outcome)
    }

    /// Run the full pipeline for one tool call
    pub async fn prepare(&self, request: ResolutionRequest) -> ResolutionOutcome {
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        LoggingMiddleware::log_tool_call(&request_id, &request.tool_name, &request.raw_arguments);

        let tool_name = request.tool_name.clone();
        let outcome = self.run_pipeline(request).await;

        LoggingMiddleware::log_resolution(
            &request_id,
            &tool_name,
            started.elapsed().as_millis() as u64,
            outcome.status(),
            &serde_json::to_value(&outcome).unwrap_or_default(),
        );
        outcome
    }

    async fn run_pipeline(&self, request: ResolutionRequest) -> ResolutionOutcome {
        let ResolutionRequest {
            tool_name,
            raw_arguments,
            free_text_hint,
            auth,
        } = request;

        let args = match ToolArguments::from_value(self.sanitize(&tool_name, raw_arguments)) {
            Ok(args) => args,
            Err(e) => return ResolutionOutcome::failed(e.to_string()),
        };

        let Ok(tool) = tool_name.parse::<ToolName>() else {
            debug!("{} is not a device tool, passing arguments through", tool_name);
            return ResolutionOutcome::completed(args, None, 1.0);
        };

        let hint = free_text_hint
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty());
        let composition = tool.composition();

        // Fields the caller must supply themselves are checked before any remote work
        let derived = self.derived_fields(tool);
        let precheck =
            self.validator
                .validate_except(&tool_name, &args.clone().into_value(), &derived);
        if !precheck.is_valid {
            return ResolutionOutcome::failed(precheck.report(&tool_name));
        }

        let devices = self.inventory.get_devices(&auth, false).await;

        let telemetry_hint = match (composition, hint) {
            (Some(CompositionKind::Telemetry { .. }), Some(hint)) => {
                !self.composer.hints().telemetry_hints(hint).is_empty()
            }
            _ => false,
        };
        // The composer matches free-text device references itself, so it can
        // see every device they hit instead of a pre-filled first match.
        let mut skip: Vec<&str> = Vec::new();
        if composition.is_some() {
            skip.push(tool.device_field());
        }
        if let Some(CompositionKind::Telemetry { names_field, .. }) = composition {
            if telemetry_hint {
                skip.push(names_field);
            }
        }

        let resolution = self
            .resolver
            .resolve_except(&tool_name, args, &auth, Some(devices.as_slice()), &skip)
            .await;

        let needs_composition = composition.is_some_and(|kind| match kind {
            CompositionKind::Command => {
                !resolution.arguments.has("device_id")
                    || !resolution.arguments.has("machine_command_id")
            }
            CompositionKind::Telemetry { names_field, .. } => {
                !resolution.arguments.has("device_id")
                    || (telemetry_hint && !resolution.arguments.has(names_field))
            }
            CompositionKind::DeviceOnly { target } => !resolution.arguments.has(target),
        });

        let outcome = if needs_composition {
            let outcome = self
                .composer
                .compose(CompositionRequest {
                    tool,
                    args: &resolution.arguments,
                    hint,
                    devices: &devices,
                    auth: &auth,
                })
                .await
                .outcome;
            self.fill_after_composition(&tool_name, outcome, &auth, &devices, &skip)
                .await
        } else {
            let confidence = if resolution.resolved.is_empty() {
                1.0
            } else {
                AUTO_RESOLVED
            };
            ResolutionOutcome::completed(resolution.arguments, None, confidence)
        };

        self.checked(&tool_name, outcome)
    }

    /// Resolve what the composed device makes resolvable, e.g. its metric names
    async fn fill_after_composition(
        &self,
        tool_name: &str,
        outcome: ResolutionOutcome,
        auth: &AuthContext,
        devices: &[DeviceRecord],
        skip: &[&str],
    ) -> ResolutionOutcome {
        let ResolutionOutcome::Completed {
            arguments,
            message,
            confidence,
        } = outcome
        else {
            return outcome;
        };
        let filled = self
            .resolver
            .resolve_except(tool_name, arguments, auth, Some(devices), skip)
            .await;
        ResolutionOutcome::completed(filled.arguments, message, confidence)
    }

    /// Parameters the engine may fill for `tool`
    fn derived_fields(&self, tool: ToolName) -> Vec<&'static str> {
        let mut fields = self.resolver.registry().resolvable_parameters(tool.as_str());
        match tool.composition() {
            Some(CompositionKind::Command) => fields.extend(["device_id", "machine_command_id"]),
            Some(CompositionKind::Telemetry { names_field, .. }) => {
                fields.extend(["device_id", names_field])
            }
            Some(CompositionKind::DeviceOnly { target }) => fields.push(target),
            None => {}
        }
        fields
    }

    /// Validate the arguments of a completed outcome against the tool contract
    fn checked(&self, tool_name: &str, outcome: ResolutionOutcome) -> ResolutionOutcome {
        let Some(arguments) = outcome.arguments() else {
            return outcome;
        };
        let result = self
            .validator
            .validate_tool_parameters(tool_name, &arguments.clone().into_value());
        if result.is_valid {
            outcome
        } else {
            ResolutionOutcome::failed(result.report(tool_name))
        }
    }

    /// Devices visible to the caller
    pub async fn get_devices(&self, auth: &AuthContext, force: bool) -> Vec<DeviceRecord> {
        self.inventory.get_devices(auth, force).await
    }

    pub async fn clear_cache(&self) {
        self.inventory.clear().await
    }

    pub async fn cache_info(&self) -> CacheInfo {
        self.inventory.info().await
    }

    /// Connected/disconnected listing of the caller's devices
    pub async fn inventory_summary(&self, auth: &AuthContext) -> String {
        InventoryCache::summary(&self.inventory.get_devices(auth, false).await)
    }

    /// Devices whose name or serial contains `term`
    pub async fn suggest_devices(
        &self,
        auth: &AuthContext,
        term: Option<&str>,
        limit: usize,
    ) -> Vec<DeviceRecord> {
        let devices = self.inventory.get_devices(auth, false).await;
        InventoryCache::suggest(&devices, term, limit)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Commands and metrics of one device, fetched in a single request
    pub async fn device_capabilities(&self, device_id: &str, auth: &AuthContext) -> CapabilitySet {
        self.capabilities.get_capabilities(device_id, auth).await
    }

    pub fn can_auto_resolve(&self, tool_name: &str) -> bool {
        self.resolver.registry().can_auto_resolve(tool_name)
    }

    pub fn resolvable_parameters(&self, tool_name: &str) -> Vec<&'static str> {
        self.resolver.registry().resolvable_parameters(tool_name)
    }
}
