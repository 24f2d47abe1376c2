//! Intent composition
//!
//! Jointly disambiguates a device and a second entity (a command, or a set
//! of telemetry names) from partial arguments plus a free-text hint. Every
//! call walks `Start -> DeviceResolving -> [CapabilityResolving] -> Decided`
//! and ends in exactly one [`ResolutionOutcome`].
//!
//! Candidates are ranked by combined confidence, the mean of the device and
//! the second-entity confidence. The composer completes on its own only when
//! there is a single candidate, or when the best candidate matched exactly,
//! reaches [`AUTO_COMPLETE_THRESHOLD`] and strictly outranks the runner-up;
//! equal scores always go back to the caller as a clarification.
//!
//! An explicit `device_id` / `machine_id` is only ever compared against
//! device ids. Free-text device references may hit several devices, which
//! then all stay candidates.

use crate::client::{AuthContext, CommandRecord, DeviceRecord, VariableKind, VariableRecord};
use crate::services::{find_all, find_with_tier, CapabilityFetcher, InventoryCache};
use crate::tools::{
    CommandIntent, CompositionKind, DeviceSelector, TelemetryIntent, ToolArguments, ToolName,
};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use super::hints::{mentioned, HintTables};
use super::outcome::{
    PhaseTracker, ResolutionOutcome, ResolutionPhase, Suggestion, AUTO_COMPLETE_THRESHOLD,
};

/// Device confidence when the caller identified exactly one device
const UNIQUE_DEVICE: f64 = 1.0;
/// Device confidence when one device was inferred from partial text
const INFERRED_DEVICE: f64 = 0.9;
/// Device confidence when several devices remained candidates
const SHARED_DEVICE: f64 = 0.8;
/// Confidence of suggestions whose feasibility was not checked
const UNCHECKED: f64 = 0.5;

/// Everything the composer needs for one call
#[derive(Debug, Clone, Copy)]
pub struct CompositionRequest<'a> {
    pub tool: ToolName,
    pub args: &'a ToolArguments,
    pub hint: Option<&'a str>,
    pub devices: &'a [DeviceRecord],
    pub auth: &'a AuthContext,
}

/// Outcome plus the phases the call went through
#[derive(Debug, Clone)]
pub struct Composition {
    pub outcome: ResolutionOutcome,
    pub trace: Vec<ResolutionPhase>,
}

/// Where the candidate devices came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateSource {
    /// `device_id` / `machine_id` in the arguments
    ExplicitId,
    /// Serial or name in the arguments; `exact` unless only a substring matched
    Named { exact: bool },
    /// Mentioned in the free-text hint
    Hinted,
    /// Nothing named a device; every connected device
    Connected,
}

struct Candidates<'a> {
    devices: Vec<&'a DeviceRecord>,
    source: CandidateSource,
}

impl Candidates<'_> {
    fn device_confidence(&self) -> f64 {
        if self.devices.len() > 1 {
            return SHARED_DEVICE;
        }
        match self.source {
            CandidateSource::ExplicitId | CandidateSource::Named { exact: true } => UNIQUE_DEVICE,
            CandidateSource::Named { exact: false } | CandidateSource::Hinted => INFERRED_DEVICE,
            CandidateSource::Connected => SHARED_DEVICE,
        }
    }
}

struct CommandCandidate<'a> {
    device: &'a DeviceRecord,
    command: &'a CommandRecord,
    device_confidence: f64,
    command_confidence: f64,
}

impl CommandCandidate<'_> {
    fn combined(&self) -> f64 {
        (self.device_confidence + self.command_confidence) / 2.0
    }
}

struct TelemetryCandidate<'a> {
    device: &'a DeviceRecord,
    names: Vec<String>,
    device_confidence: f64,
    name_confidence: f64,
}

impl TelemetryCandidate<'_> {
    fn combined(&self) -> f64 {
        (self.device_confidence + self.name_confidence) / 2.0
    }
}

/// Cross-entity disambiguation over the inventory and device capabilities
pub struct IntentComposer {
    capabilities: CapabilityFetcher,
    hints: Arc<HintTables>,
    max_suggestions: usize,
    concurrency: usize,
}

impl IntentComposer {
    pub fn new(
        capabilities: CapabilityFetcher,
        hints: Arc<HintTables>,
        max_suggestions: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            capabilities,
            hints,
            max_suggestions: max_suggestions.max(1),
            concurrency: concurrency.max(1),
        }
    }

    pub fn hints(&self) -> &HintTables {
        &self.hints
    }

    /// Compose arguments for `request.tool`
    ///
    /// Tools without a composition kind are passed through as completed.
    pub async fn compose(&self, request: CompositionRequest<'_>) -> Composition {
        let mut tracker = PhaseTracker::new(request.tool.as_str());

        let Some(kind) = request.tool.composition() else {
            return Composition {
                outcome: ResolutionOutcome::completed(request.args.clone(), None, 1.0),
                trace: tracker.into_trace(),
            };
        };

        tracker.advance(ResolutionPhase::DeviceResolving);
        let outcome = match kind {
            CompositionKind::Command => self.compose_command(&request, &mut tracker).await,
            CompositionKind::Telemetry { names_field, kind } => {
                self.compose_telemetry(&request, names_field, kind, &mut tracker)
                    .await
            }
            CompositionKind::DeviceOnly { target } => {
                self.compose_device(&request, target, &mut tracker)
            }
        };

        info!(
            "[{}] composed: {} (confidence {:.2})",
            request.tool,
            outcome.status(),
            outcome.confidence()
        );

        Composition {
            outcome,
            trace: tracker.into_trace(),
        }
    }

    async fn compose_command(
        &self,
        request: &CompositionRequest<'_>,
        tracker: &mut PhaseTracker,
    ) -> ResolutionOutcome {
        let intent = CommandIntent::from_args(request.args);
        let text = request.hint.unwrap_or_default();
        let command_hints = self.hints.command_hints(text);

        let candidates = match self.candidate_devices(&intent.device, text, request.devices) {
            Ok(candidates) => candidates,
            Err(message) => return tracker.decide(ResolutionOutcome::failed(message)),
        };

        // Below the suggestion cap every device/command pair is offered instead,
        // so each suggestion can be resubmitted as is.
        let command_term = intent.command_term();
        if candidates.devices.len() > self.max_suggestions
            && command_term.is_none()
            && command_hints.is_empty()
        {
            return tracker.decide(ResolutionOutcome::clarify(
                "Which device do you want to control?",
                self.device_suggestions(&candidates.devices, request.args, "device_id"),
                UNCHECKED,
            ));
        }

        tracker.advance(ResolutionPhase::CapabilityResolving);
        let device_confidence = candidates.device_confidence();
        let fetched = self
            .fetch_all(&candidates.devices, |device| {
                self.capabilities.get_commands(&device.id, request.auth)
            })
            .await;

        let mut ranked: Vec<CommandCandidate<'_>> = fetched
            .iter()
            .flat_map(|(device, commands)| {
                score_commands(commands, command_term, &command_hints)
                    .into_iter()
                    .map(move |(command, command_confidence)| CommandCandidate {
                        device: *device,
                        command,
                        device_confidence,
                        command_confidence,
                    })
            })
            .collect();
        ranked.sort_by(|a, b| b.combined().total_cmp(&a.combined()));
        debug!("{} device/command candidates", ranked.len());

        let Some(top) = ranked.first() else {
            return tracker.decide(ResolutionOutcome::failed(self.no_command_message(
                &fetched,
                command_term,
                &command_hints,
            )));
        };

        let outranks = ranked
            .get(1)
            .map_or(true, |second| top.combined() > second.combined());
        let decisive = top.command_confidence >= 1.0
            && top.combined() >= AUTO_COMPLETE_THRESHOLD
            && outranks;
        if ranked.len() == 1 || decisive {
            let arguments = request.args.merged(&[
                ("device_id", Value::from(top.device.id.clone())),
                ("machine_command_id", Value::from(top.command.id.clone())),
            ]);
            return tracker.decide(ResolutionOutcome::completed(
                arguments,
                Some(format!(
                    "Executing \"{}\" on \"{}\"",
                    top.command.name, top.device.name
                )),
                top.combined(),
            ));
        }

        let suggestions = ranked
            .iter()
            .take(self.max_suggestions)
            .map(|candidate| {
                let single_device = candidates.devices.len() == 1;
                Suggestion {
                    label: if single_device {
                        candidate.command.name.clone()
                    } else {
                        format!("{} on {}", candidate.command.name, candidate.device.name)
                    },
                    value: request.args.merged(&[
                        ("device_id", Value::from(candidate.device.id.clone())),
                        ("machine_command_id", Value::from(candidate.command.id.clone())),
                    ]),
                    description: candidate
                        .command
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("Command {}", candidate.command.name)),
                    confidence: if single_device {
                        candidate.command_confidence
                    } else {
                        candidate.combined()
                    },
                }
            })
            .collect();

        let outcome = if candidates.devices.len() == 1 {
            ResolutionOutcome::clarify(
                format!(
                    "What do you want to do with \"{}\"?",
                    candidates.devices[0].name
                ),
                suggestions,
                0.6,
            )
        } else {
            ResolutionOutcome::clarify(
                "I found multiple options. Which one do you want?",
                suggestions,
                UNCHECKED,
            )
        };
        tracker.decide(outcome)
    }

    async fn compose_telemetry(
        &self,
        request: &CompositionRequest<'_>,
        names_field: &'static str,
        kind: VariableKind,
        tracker: &mut PhaseTracker,
    ) -> ResolutionOutcome {
        let intent = TelemetryIntent::from_args(request.args, names_field, kind);
        let text = request.hint.unwrap_or_default();
        let telemetry_hints = self.hints.telemetry_hints(text);

        let candidates = match self.candidate_devices(&intent.device, text, request.devices) {
            Ok(candidates) => candidates,
            Err(message) => return tracker.decide(ResolutionOutcome::failed(message)),
        };

        let has_names = !intent.names.is_empty();
        if candidates.devices.len() > 1 && !has_names && telemetry_hints.is_empty() {
            return tracker.decide(ResolutionOutcome::clarify(
                format!("Which device do you want to read {}s from?", kind.as_str()),
                self.device_suggestions(&candidates.devices, request.args, "device_id"),
                UNCHECKED,
            ));
        }

        if let [device] = candidates.devices.as_slice() {
            if has_names {
                return tracker.decide(ResolutionOutcome::completed(
                    request
                        .args
                        .merged(&[("device_id", Value::from(device.id.clone()))]),
                    Some(format!("Reading from \"{}\"", device.name)),
                    0.95,
                ));
            }
            if telemetry_hints.is_empty() {
                return tracker.decide(ResolutionOutcome::completed(
                    request
                        .args
                        .merged(&[("device_id", Value::from(device.id.clone()))]),
                    Some(format!("Reading every {} of \"{}\"", kind.as_str(), device.name)),
                    SHARED_DEVICE,
                ));
            }
        }

        tracker.advance(ResolutionPhase::CapabilityResolving);
        let device_confidence = candidates.device_confidence();
        let fetched = self
            .fetch_all(&candidates.devices, |device| {
                self.capabilities.get_variables(&device.id, request.auth, kind)
            })
            .await;

        let mut ranked: Vec<TelemetryCandidate<'_>> = fetched
            .iter()
            .filter_map(|(device, variables)| {
                let matched = if has_names {
                    supplied_names(variables, &intent.names)
                } else {
                    score_names(variables, &telemetry_hints)
                };
                let name_confidence = matched.first()?.1;
                Some(TelemetryCandidate {
                    device: *device,
                    names: matched.into_iter().map(|(name, _)| name).collect(),
                    device_confidence,
                    name_confidence,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.combined().total_cmp(&a.combined()));

        let Some(top) = ranked.first() else {
            let searched = if has_names {
                intent.names.join(", ")
            } else {
                telemetry_hints.join(", ")
            };
            return tracker.decide(ResolutionOutcome::failed(format!(
                "No {}s found matching: {} (searched {})",
                kind.as_str(),
                searched,
                device_list(&candidates.devices)
            )));
        };

        let outranks = ranked
            .get(1)
            .map_or(true, |second| top.combined() > second.combined());
        let decisive =
            top.name_confidence >= 1.0 && top.combined() >= AUTO_COMPLETE_THRESHOLD && outranks;
        if ranked.len() == 1 || decisive {
            let arguments = request.args.merged(&[
                ("device_id", Value::from(top.device.id.clone())),
                (names_field, Value::from(top.names.clone())),
            ]);
            return tracker.decide(ResolutionOutcome::completed(
                arguments,
                Some(format!(
                    "Reading {} from \"{}\"",
                    top.names.join(", "),
                    top.device.name
                )),
                top.combined(),
            ));
        }

        let suggestions = ranked
            .iter()
            .take(self.max_suggestions)
            .map(|candidate| Suggestion {
                label: format!("{}: {}", candidate.device.name, candidate.names.join(", ")),
                value: request.args.merged(&[
                    ("device_id", Value::from(candidate.device.id.clone())),
                    (names_field, Value::from(candidate.names.clone())),
                ]),
                description: format!(
                    "{} matching {}s on {}",
                    candidate.names.len(),
                    kind.as_str(),
                    candidate.device.serial
                ),
                confidence: candidate.combined(),
            })
            .collect();

        tracker.decide(ResolutionOutcome::clarify(
            format!(
                "I found matching {}s on several devices. Which one do you want?",
                kind.as_str()
            ),
            suggestions,
            UNCHECKED,
        ))
    }

    fn compose_device(
        &self,
        request: &CompositionRequest<'_>,
        target: &'static str,
        tracker: &mut PhaseTracker,
    ) -> ResolutionOutcome {
        let selector = DeviceSelector::from_args(request.args, target);
        let text = request.hint.unwrap_or_default();

        let candidates = match self.candidate_devices(&selector, text, request.devices) {
            Ok(candidates) => candidates,
            Err(message) => return tracker.decide(ResolutionOutcome::failed(message)),
        };

        if let [device] = candidates.devices.as_slice() {
            // Only an id supplied by the caller is already unambiguous
            let confidence = match candidates.source {
                CandidateSource::ExplicitId => UNIQUE_DEVICE,
                CandidateSource::Named { .. } | CandidateSource::Hinted => INFERRED_DEVICE,
                CandidateSource::Connected => SHARED_DEVICE,
            };
            return tracker.decide(ResolutionOutcome::completed(
                request
                    .args
                    .merged(&[(target, Value::from(device.id.clone()))]),
                Some(format!("Using \"{}\"", device.name)),
                confidence,
            ));
        }

        tracker.decide(ResolutionOutcome::clarify(
            "Which device do you mean?",
            self.device_suggestions(&candidates.devices, request.args, target),
            UNCHECKED,
        ))
    }

    /// Candidate devices for a call, or the message of a `Failed` outcome
    fn candidate_devices<'a>(
        &self,
        selector: &DeviceSelector,
        text: &str,
        devices: &'a [DeviceRecord],
    ) -> std::result::Result<Candidates<'a>, String> {
        if devices.is_empty() {
            return Err("No devices available in your organization.".to_string());
        }

        if let Some(id) = selector.id.as_deref() {
            return match devices.iter().find(|d| d.id == id) {
                Some(device) => Ok(Candidates {
                    devices: vec![device],
                    source: CandidateSource::ExplicitId,
                }),
                None => Err(format!(
                    "No device with id \"{}\".{}",
                    id,
                    self.alternatives(devices, None)
                )),
            };
        }

        if let Some(term) = selector.search.as_deref() {
            let matched = find_all(devices, term);
            if matched.is_empty() {
                return Err(format!(
                    "No device matches \"{}\".{}",
                    term,
                    self.alternatives(devices, Some(term))
                ));
            }
            let exact = find_with_tier(devices, term).is_some_and(|(_, tier)| tier.is_exact());
            if matched.len() > 1 {
                debug!("{} devices match \"{}\"", matched.len(), term);
            }
            return Ok(Candidates {
                devices: matched,
                source: CandidateSource::Named { exact },
            });
        }

        let mut hinted: Vec<&DeviceRecord> = Vec::new();
        let by_hint = self
            .hints
            .device_hints(text)
            .iter()
            .flat_map(|hint| find_all(devices, hint))
            .collect::<Vec<_>>();
        for device in mentioned(devices, text).into_iter().chain(by_hint) {
            if !hinted.iter().any(|d| d.id == device.id) {
                hinted.push(device);
            }
        }
        if !hinted.is_empty() {
            debug!("{} devices matched the hint", hinted.len());
            return Ok(Candidates {
                devices: hinted,
                source: CandidateSource::Hinted,
            });
        }

        let connected: Vec<&DeviceRecord> = devices.iter().filter(|d| d.is_connected).collect();
        if connected.is_empty() {
            return Err(format!(
                "No connected devices and no device was named. Provide device_name or serial.{}",
                self.alternatives(devices, None)
            ));
        }
        Ok(Candidates {
            devices: connected,
            source: CandidateSource::Connected,
        })
    }

    fn alternatives(&self, devices: &[DeviceRecord], term: Option<&str>) -> String {
        let mut suggested = InventoryCache::suggest(devices, term, self.max_suggestions);
        if suggested.is_empty() {
            suggested = InventoryCache::suggest(devices, None, self.max_suggestions);
        }
        if suggested.is_empty() {
            return String::new();
        }
        format!("\nAvailable devices: {}", device_list(&suggested))
    }

    fn device_suggestions(
        &self,
        devices: &[&DeviceRecord],
        args: &ToolArguments,
        field: &str,
    ) -> Vec<Suggestion> {
        devices
            .iter()
            .take(self.max_suggestions)
            .map(|device| Suggestion {
                label: format!("{} ({})", device.name, device.serial),
                value: args.merged(&[(field, Value::from(device.id.clone()))]),
                description: if device.is_connected {
                    "Connected".to_string()
                } else {
                    "Offline".to_string()
                },
                confidence: UNCHECKED,
            })
            .collect()
    }

    fn no_command_message(
        &self,
        fetched: &[(&DeviceRecord, Vec<CommandRecord>)],
        command_term: Option<&str>,
        command_hints: &[String],
    ) -> String {
        let devices: Vec<&DeviceRecord> = fetched.iter().map(|(device, _)| *device).collect();
        let names = device_list(&devices);

        if fetched.iter().all(|(_, commands)| commands.is_empty()) {
            return format!("No commands available on {names}.");
        }

        let mut message = match command_term {
            Some(term) => format!("No command matching \"{term}\" on {names}."),
            None => format!(
                "No matching commands found on {} for: {}",
                names,
                command_hints.join(" or ")
            ),
        };
        if let [(_, commands)] = fetched {
            let available: Vec<&str> = commands
                .iter()
                .take(self.max_suggestions)
                .map(|c| c.name.as_str())
                .collect();
            message.push_str(&format!("\nAvailable commands: {}", available.join(", ")));
        }
        message
    }

    /// Run `fetch` for every device with bounded concurrency, keeping order
    async fn fetch_all<'a, T, F, Fut>(
        &self,
        devices: &[&'a DeviceRecord],
        fetch: F,
    ) -> Vec<(&'a DeviceRecord, T)>
    where
        F: Fn(&'a DeviceRecord) -> Fut,
        Fut: Future<Output = T>,
    {
        stream::iter(devices.iter().copied())
            .map(|device| {
                let pending = fetch(device);
                async move { (device, pending.await) }
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

fn device_list(devices: &[&DeviceRecord]) -> String {
    devices
        .iter()
        .map(|d| format!("{} ({})", d.name, d.serial))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Score `commands` against an explicit term or free-text hints
///
/// An explicit term goes through the tiered matcher; hints are scored per
/// command keeping the best hint; without either every command is a weak
/// candidate.
fn score_commands<'a>(
    commands: &'a [CommandRecord],
    term: Option<&str>,
    hints: &[String],
) -> Vec<(&'a CommandRecord, f64)> {
    if let Some(term) = term {
        return find_with_tier(commands, term)
            .map(|(command, tier)| vec![(command, if tier.is_exact() { 1.0 } else { 0.9 })])
            .unwrap_or_default();
    }

    if hints.is_empty() {
        return commands.iter().map(|c| (c, UNCHECKED)).collect();
    }

    let mut scored: Vec<(&CommandRecord, f64)> = commands
        .iter()
        .filter_map(|command| {
            let best = hints
                .iter()
                .map(|hint| command_score(command, hint))
                .fold(0.0, f64::max);
            (best > 0.0).then_some((command, best))
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}

fn command_score(command: &CommandRecord, hint: &str) -> f64 {
    let hint = hint.to_lowercase();
    let score = name_score(&command.name, &hint);
    if score > 0.0 {
        return score;
    }
    match &command.description {
        Some(description) if description.to_lowercase().contains(&hint) => 0.7,
        _ => 0.0,
    }
}

fn name_score(name: &str, lowered_hint: &str) -> f64 {
    let name = name.to_lowercase();
    if name.is_empty() || lowered_hint.is_empty() {
        0.0
    } else if name == lowered_hint {
        1.0
    } else if name.contains(lowered_hint) {
        0.9
    } else if lowered_hint.contains(&name) {
        0.85
    } else {
        0.0
    }
}

/// Telemetry names matched by hints, best first
fn score_names(variables: &[VariableRecord], hints: &[String]) -> Vec<(String, f64)> {
    let mut scored: Vec<(String, f64)> = variables
        .iter()
        .filter_map(|variable| {
            let best = hints
                .iter()
                .map(|hint| name_score(&variable.name, &hint.to_lowercase()))
                .fold(0.0, f64::max);
            (best > 0.0).then(|| (variable.name.clone(), best))
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.dedup_by(|a, b| a.0 == b.0);
    scored
}

/// Supplied names this device actually exposes
fn supplied_names(variables: &[VariableRecord], names: &[String]) -> Vec<(String, f64)> {
    names
        .iter()
        .filter(|name| variables.iter().any(|v| v.name.eq_ignore_ascii_case(name)))
        .map(|name| (name.clone(), 1.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{sample_device, MockFirmware, MockThings5Client};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn composer(client: MockThings5Client) -> IntentComposer {
        let capabilities = CapabilityFetcher::new(Arc::new(client), Duration::from_secs(5));
        IntentComposer::new(capabilities, Arc::new(HintTables::builtin().unwrap()), 10, 4)
    }

    fn args(value: Value) -> ToolArguments {
        ToolArguments::from_value(value).unwrap()
    }

    async fn compose(
        composer: &IntentComposer,
        tool: ToolName,
        arguments: Value,
        hint: Option<&str>,
        devices: &[DeviceRecord],
    ) -> Composition {
        let arguments = args(arguments);
        let auth = AuthContext::new("token");
        composer
            .compose(CompositionRequest {
                tool,
                args: &arguments,
                hint,
                devices,
                auth: &auth,
            })
            .await
    }

    #[test]
    fn test_command_scores() {
        let commands = vec![
            CommandRecord {
                id: "c1".to_string(),
                name: "turn_on_light".to_string(),
                description: None,
                parameters: vec![],
            },
            CommandRecord {
                id: "c2".to_string(),
                name: "on".to_string(),
                description: None,
                parameters: vec![],
            },
            CommandRecord {
                id: "c3".to_string(),
                name: "cycle".to_string(),
                description: Some("Start the defrost cycle".to_string()),
                parameters: vec![],
            },
        ];

        assert_eq!(command_score(&commands[0], "light"), 0.9);
        assert_eq!(command_score(&commands[1], "on"), 1.0);
        assert_eq!(command_score(&commands[1], "turn_on"), 0.85);
        assert_eq!(command_score(&commands[2], "defrost"), 0.7);

        let scored = score_commands(&commands, None, &["on".to_string()]);
        let ids: Vec<_> = scored.iter().map(|(c, s)| (c.id.as_str(), *s)).collect();
        assert_eq!(ids, vec![("c2", 1.0), ("c1", 0.9)]);

        let explicit = score_commands(&commands, Some("TURN_ON_LIGHT"), &[]);
        assert_eq!(explicit[0].1, 1.0);
        let partial = score_commands(&commands, Some("light"), &[]);
        assert_eq!(partial[0].1, 0.9);
    }

    #[tokio::test]
    async fn test_empty_inventory_fails() {
        let composer = composer(MockThings5Client::new());
        let composition = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({}),
            Some("accendi la luce"),
            &[],
        )
        .await;

        assert_eq!(composition.outcome.status(), "failed");
        assert_eq!(
            composition.trace,
            vec![
                ResolutionPhase::Start,
                ResolutionPhase::DeviceResolving,
                ResolutionPhase::Decided
            ]
        );
    }

    #[tokio::test]
    async fn test_too_many_devices_without_command_hint_short_circuit() {
        let capabilities =
            CapabilityFetcher::new(Arc::new(MockThings5Client::new()), Duration::from_secs(5));
        let composer =
            IntentComposer::new(capabilities, Arc::new(HintTables::builtin().unwrap()), 1, 4);
        let devices = vec![
            sample_device("1", "Frigo Cucina", "FRIGO001", true),
            sample_device("2", "Frigo Sala", "FRIGO002", true),
        ];

        let composition = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({ "overrides": {} }),
            Some("il frigo"),
            &devices,
        )
        .await;

        let outcome = composition.outcome;
        assert_eq!(outcome.status(), "needs_clarification");
        assert_eq!(outcome.confidence(), 0.5);
        assert_eq!(outcome.suggestions().len(), 1);
        assert_eq!(outcome.suggestions()[0].value.get_str("device_id"), Some("1"));
        assert!(outcome.suggestions()[0].value.has("overrides"));
        assert!(!composition.trace.contains(&ResolutionPhase::CapabilityResolving));
    }

    #[tokio::test]
    async fn test_ambiguous_devices_offer_device_command_pairs() {
        let client = MockThings5Client::new()
            .with_firmware(
                "1",
                MockFirmware::new()
                    .command("c1", "turn_on_light")
                    .command("c2", "defrost"),
            )
            .with_firmware("2", MockFirmware::new().command("c3", "defrost"));
        let composer = composer(client);
        let devices = vec![
            sample_device("1", "Frigo Cucina", "FRIGO001", true),
            sample_device("2", "Frigo Sala", "FRIGO002", true),
        ];

        let outcome = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({}),
            None,
            &devices,
        )
        .await
        .outcome;

        assert_eq!(outcome.status(), "needs_clarification");
        let pairs: Vec<_> = outcome
            .suggestions()
            .iter()
            .map(|s| {
                (
                    s.value.get_str("device_id").unwrap(),
                    s.value.get_str("machine_command_id").unwrap(),
                )
            })
            .collect();
        assert_eq!(pairs, vec![("1", "c1"), ("1", "c2"), ("2", "c3")]);
    }

    #[tokio::test]
    async fn test_stale_device_id_is_never_replaced() {
        let client = MockThings5Client::new()
            .with_firmware("a1b2", MockFirmware::new().command("c1", "defrost"));
        let composer = composer(client);
        let devices = vec![sample_device("a1b2", "Frigo Cucina", "SN-77", true)];

        for hint in [None, Some("sbrina")] {
            let outcome = compose(
                &composer,
                ToolName::MachineCommandExecute,
                json!({ "device_id": "7", "command_name": "defrost" }),
                hint,
                &devices,
            )
            .await
            .outcome;

            assert_eq!(outcome.status(), "failed");
            let message = outcome.message().unwrap();
            assert!(message.starts_with("No device with id \"7\"."));
            assert!(message.contains("Available devices: Frigo Cucina (SN-77)"));
        }

        let outcome = compose(
            &composer,
            ToolName::DeviceFirmwareDetail,
            json!({ "machine_id": "7" }),
            None,
            &devices,
        )
        .await
        .outcome;
        assert_eq!(outcome.status(), "failed");
    }

    #[tokio::test]
    async fn test_partial_name_hitting_two_devices_is_not_guessed() {
        let client = MockThings5Client::new()
            .with_firmware("1", MockFirmware::new().command("c1", "turn_on"))
            .with_firmware("2", MockFirmware::new().command("c2", "turn_on"));
        let composer = composer(client);
        let devices = vec![
            sample_device("1", "Frigo Cucina", "FRIGO001", true),
            sample_device("2", "Frigo Sala", "FRIGO002", true),
        ];

        let outcome = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({ "device_name": "frigo" }),
            Some("turn on"),
            &devices,
        )
        .await
        .outcome;

        assert_eq!(outcome.status(), "needs_clarification");
        let ids: Vec<_> = outcome
            .suggestions()
            .iter()
            .map(|s| s.value.get_str("device_id").unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_partial_name_hitting_one_device_stays_below_full_confidence() {
        let client =
            MockThings5Client::new().with_firmware("1", MockFirmware::new().command("c1", "defrost"));
        let composer = composer(client);
        let devices = vec![
            sample_device("1", "Frigo Cucina", "FRIGO001", true),
            sample_device("2", "Frigo Sala", "FRIGO002", true),
        ];

        let outcome = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({ "device_name": "cucina", "command_name": "defrost" }),
            None,
            &devices,
        )
        .await
        .outcome;

        assert!(outcome.is_completed());
        assert_eq!(outcome.arguments().unwrap().get_str("device_id"), Some("1"));
        assert!((outcome.confidence() - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unique_device_and_hinted_command_completes() {
        let client = MockThings5Client::new().with_firmware(
            "1",
            MockFirmware::new()
                .command("c1", "turn_on_light")
                .command("c2", "defrost"),
        );
        let composer = composer(client);
        let devices = vec![sample_device("1", "Frigo Cucina", "FRIGO001", true)];

        let composition = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({ "device_name": "frigo cucina" }),
            Some("accendi la luce"),
            &devices,
        )
        .await;

        let arguments = composition.outcome.arguments().unwrap();
        assert_eq!(arguments.get_str("device_id"), Some("1"));
        assert_eq!(arguments.get_str("machine_command_id"), Some("c1"));
        assert!(composition.outcome.confidence() >= 0.9);
        assert_eq!(
            composition.trace.last(),
            Some(&ResolutionPhase::Decided)
        );
        assert!(composition.trace.contains(&ResolutionPhase::CapabilityResolving));
    }

    #[tokio::test]
    async fn test_equal_command_scores_need_clarification() {
        let client = MockThings5Client::new().with_firmware(
            "1",
            MockFirmware::new()
                .command("c1", "turn_on_light")
                .command("c2", "turn_on_fan"),
        );
        let composer = composer(client);
        let devices = vec![sample_device("1", "Frigo Cucina", "FRIGO001", true)];

        let outcome = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({ "device_id": "1" }),
            Some("turn on"),
            &devices,
        )
        .await
        .outcome;

        assert_eq!(outcome.status(), "needs_clarification");
        assert_eq!(outcome.confidence(), 0.6);
        let ids: Vec<_> = outcome
            .suggestions()
            .iter()
            .map(|s| s.value.get_str("machine_command_id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_exact_command_on_two_devices_is_a_tie() {
        let client = MockThings5Client::new()
            .with_firmware("1", MockFirmware::new().command("c1", "defrost"))
            .with_firmware("2", MockFirmware::new().command("c9", "defrost"));
        let composer = composer(client);
        let devices = vec![
            sample_device("1", "Frigo Cucina", "FRIGO001", true),
            sample_device("2", "Frigo Sala", "FRIGO002", true),
        ];

        let outcome = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({ "command_name": "defrost" }),
            None,
            &devices,
        )
        .await
        .outcome;

        assert_eq!(outcome.status(), "needs_clarification");
        let labels: Vec<_> = outcome.suggestions().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["defrost on Frigo Cucina", "defrost on Frigo Sala"]);
    }

    #[tokio::test]
    async fn test_unknown_explicit_device_lists_alternatives() {
        let composer = composer(MockThings5Client::new());
        let devices = vec![
            sample_device("1", "Frigo Cucina", "FRIGO001", true),
            sample_device("2", "Forno", "OVEN001", false),
        ];

        let outcome = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({ "device_name": "abbattitore" }),
            Some("sbrina"),
            &devices,
        )
        .await
        .outcome;

        let message = outcome.message().unwrap();
        assert_eq!(outcome.status(), "failed");
        assert!(message.contains("abbattitore"));
        assert!(message.contains("Frigo Cucina (FRIGO001)"));
    }

    #[tokio::test]
    async fn test_no_matching_command_explains_search() {
        let client = MockThings5Client::new()
            .with_firmware("1", MockFirmware::new().command("c1", "defrost"));
        let composer = composer(client);
        let devices = vec![sample_device("1", "Frigo Cucina", "FRIGO001", true)];

        let outcome = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({ "device_id": "1" }),
            Some("accendi la luce"),
            &devices,
        )
        .await
        .outcome;

        let message = outcome.message().unwrap();
        assert!(message.starts_with("No matching commands found on Frigo Cucina"));
        assert!(message.contains("Available commands: defrost"));
    }

    #[tokio::test]
    async fn test_suggestions_are_capped() {
        let mut firmware = MockFirmware::new();
        for i in 0..15 {
            firmware = firmware.command(&format!("c{i}"), &format!("program_{i}"));
        }
        let composer = composer(MockThings5Client::new().with_firmware("1", firmware));
        let devices = vec![sample_device("1", "Forno", "OVEN001", true)];

        let outcome = compose(
            &composer,
            ToolName::MachineCommandExecute,
            json!({ "device_id": "1" }),
            None,
            &devices,
        )
        .await
        .outcome;

        assert_eq!(outcome.suggestions().len(), 10);
    }

    #[tokio::test]
    async fn test_telemetry_with_names_completes_without_fetch() {
        let client = Arc::new(MockThings5Client::new());
        let capabilities = CapabilityFetcher::new(client.clone(), Duration::from_secs(5));
        let composer =
            IntentComposer::new(capabilities, Arc::new(HintTables::builtin().unwrap()), 10, 4);
        let devices = vec![sample_device("1", "Frigo Cucina", "FRIGO001", true)];

        let outcome = compose(
            &composer,
            ToolName::MetricsRead,
            json!({ "serial": "FRIGO001", "metric_names": ["temperature"] }),
            None,
            &devices,
        )
        .await
        .outcome;

        assert_eq!(outcome.confidence(), 0.95);
        assert_eq!(outcome.arguments().unwrap().get_str("device_id"), Some("1"));
        assert_eq!(client.firmware_calls(), 0);
    }

    #[tokio::test]
    async fn test_telemetry_hint_selects_names() {
        let client = MockThings5Client::new().with_firmware(
            "1",
            MockFirmware::new()
                .variable("temperature_cell", VariableKind::Metric)
                .variable("temp_evaporator", VariableKind::Metric)
                .variable("humidity", VariableKind::Metric)
                .variable("door_open", VariableKind::Event),
        );
        let composer = composer(client);
        let devices = vec![sample_device("1", "Frigo Cucina", "FRIGO001", true)];

        let outcome = compose(
            &composer,
            ToolName::MetricsRead,
            json!({ "device_id": "1" }),
            Some("che temperatura c'è?"),
            &devices,
        )
        .await
        .outcome;

        assert_eq!(outcome.status(), "completed");
        assert_eq!(
            outcome.arguments().unwrap().get_string_list("metric_names"),
            vec!["temperature_cell", "temp_evaporator"]
        );
    }

    #[tokio::test]
    async fn test_telemetry_names_filter_devices() {
        let client = MockThings5Client::new()
            .with_firmware(
                "1",
                MockFirmware::new().variable("door_open", VariableKind::Event),
            )
            .with_firmware(
                "2",
                MockFirmware::new().variable("alarm_high_temp", VariableKind::Event),
            );
        let composer = composer(client);
        let devices = vec![
            sample_device("1", "Frigo Cucina", "FRIGO001", true),
            sample_device("2", "Frigo Sala", "FRIGO002", true),
        ];

        let outcome = compose(
            &composer,
            ToolName::EventsRead,
            json!({ "events_names": ["door_open"] }),
            None,
            &devices,
        )
        .await
        .outcome;

        let arguments = outcome.arguments().unwrap();
        assert_eq!(arguments.get_str("device_id"), Some("1"));
        assert_eq!(arguments.get_string_list("events_names"), vec!["door_open"]);
    }

    #[tokio::test]
    async fn test_device_only_composition() {
        let composer = composer(MockThings5Client::new());
        let devices = vec![
            sample_device("1", "Frigo Cucina", "FRIGO001", true),
            sample_device("2", "Frigo Sala", "FRIGO002", true),
            sample_device("3", "Forno", "OVEN001", true),
        ];

        let outcome = compose(
            &composer,
            ToolName::DeviceFirmwareDetail,
            json!({}),
            Some("il forno"),
            &devices,
        )
        .await
        .outcome;
        assert_eq!(outcome.arguments().unwrap().get_str("machine_id"), Some("3"));
        assert_eq!(outcome.confidence(), 0.9);

        let outcome = compose(
            &composer,
            ToolName::DeviceManagedRecipes,
            json!({}),
            Some("frigo"),
            &devices,
        )
        .await
        .outcome;
        assert_eq!(outcome.status(), "needs_clarification");
        assert_eq!(outcome.suggestions()[1].value.get_str("machine_id"), Some("2"));
    }

    #[tokio::test]
    async fn test_non_composed_tool_passes_through() {
        let composer = composer(MockThings5Client::new());
        let composition = compose(
            &composer,
            ToolName::ListMachines,
            json!({ "search": "frigo" }),
            None,
            &[],
        )
        .await;

        assert!(composition.outcome.is_completed());
        assert_eq!(composition.trace, vec![ResolutionPhase::Start]);
    }
}
