//! Resolution outcomes and the per-call phase tracker

use crate::tools::ToolArguments;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Confidence at or above which the composer may complete on its own
pub const AUTO_COMPLETE_THRESHOLD: f64 = 0.9;

/// One ranked option offered back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    /// Full argument set to resubmit if the caller picks this option
    pub value: ToolArguments,
    pub description: String,
    pub confidence: f64,
}

/// Result of one resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// Arguments are ready for the tool handler
    Completed {
        arguments: ToolArguments,
        message: Option<String>,
        confidence: f64,
    },
    /// The caller must pick one of the suggestions and resubmit
    NeedsClarification {
        message: String,
        suggestions: Vec<Suggestion>,
        confidence: f64,
    },
    /// Nothing viable was found
    Failed { message: String, confidence: f64 },
}

impl ResolutionOutcome {
    pub fn completed(arguments: ToolArguments, message: Option<String>, confidence: f64) -> Self {
        ResolutionOutcome::Completed {
            arguments,
            message,
            confidence: clamp(confidence),
        }
    }

    pub fn clarify<S: Into<String>>(message: S, suggestions: Vec<Suggestion>, confidence: f64) -> Self {
        ResolutionOutcome::NeedsClarification {
            message: message.into(),
            suggestions,
            confidence: clamp(confidence),
        }
    }

    pub fn failed<S: Into<String>>(message: S) -> Self {
        ResolutionOutcome::Failed {
            message: message.into(),
            confidence: 0.0,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ResolutionOutcome::Completed { .. } => "completed",
            ResolutionOutcome::NeedsClarification { .. } => "needs_clarification",
            ResolutionOutcome::Failed { .. } => "failed",
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            ResolutionOutcome::Completed { confidence, .. }
            | ResolutionOutcome::NeedsClarification { confidence, .. }
            | ResolutionOutcome::Failed { confidence, .. } => *confidence,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ResolutionOutcome::Completed { .. })
    }

    /// Arguments of a completed resolution
    pub fn arguments(&self) -> Option<&ToolArguments> {
        match self {
            ResolutionOutcome::Completed { arguments, .. } => Some(arguments),
            _ => None,
        }
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        match self {
            ResolutionOutcome::NeedsClarification { suggestions, .. } => suggestions,
            _ => &[],
        }
    }

    /// Human-readable message, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            ResolutionOutcome::Completed { message, .. } => message.as_deref(),
            ResolutionOutcome::NeedsClarification { message, .. }
            | ResolutionOutcome::Failed { message, .. } => Some(message),
        }
    }
}

fn clamp(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Phase of a single composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPhase {
    Start,
    DeviceResolving,
    CapabilityResolving,
    Decided,
}

impl ResolutionPhase {
    /// Whether `next` may follow `self`
    pub fn can_transition_to(&self, next: ResolutionPhase) -> bool {
        use ResolutionPhase::*;
        matches!(
            (self, next),
            (Start, DeviceResolving)
                | (DeviceResolving, CapabilityResolving)
                | (DeviceResolving, Decided)
                | (CapabilityResolving, Decided)
        )
    }
}

/// Records the phases one composition walks through
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    tool: String,
    trace: Vec<ResolutionPhase>,
}

impl PhaseTracker {
    pub fn new<S: Into<String>>(tool: S) -> Self {
        Self {
            tool: tool.into(),
            trace: vec![ResolutionPhase::Start],
        }
    }

    pub fn current(&self) -> ResolutionPhase {
        self.trace
            .last()
            .copied()
            .unwrap_or(ResolutionPhase::Start)
    }

    /// Move to `next`; illegal transitions are logged and ignored
    pub fn advance(&mut self, next: ResolutionPhase) {
        let current = self.current();
        if current.can_transition_to(next) {
            debug!("[{}] {:?} -> {:?}", self.tool, current, next);
            self.trace.push(next);
        } else {
            debug!(
                "[{}] ignoring illegal transition {:?} -> {:?}",
                self.tool, current, next
            );
        }
    }

    /// Enter `Decided` and hand back the outcome
    pub fn decide(&mut self, outcome: ResolutionOutcome) -> ResolutionOutcome {
        self.advance(ResolutionPhase::Decided);
        outcome
    }

    pub fn trace(&self) -> &[ResolutionPhase] {
        &self.trace
    }

    pub fn into_trace(self) -> Vec<ResolutionPhase> {
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let args = ToolArguments::from_value(json!({ "device_id": "d1" })).unwrap();
        let outcome = ResolutionOutcome::completed(args, None, 1.4);
        assert_eq!(outcome.confidence(), 1.0);

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["arguments"]["device_id"], "d1");

        let failed = serde_json::to_value(ResolutionOutcome::failed("nothing")).unwrap();
        assert_eq!(failed, json!({ "status": "failed", "message": "nothing", "confidence": 0.0 }));
    }

    #[test]
    fn test_phase_transitions() {
        use ResolutionPhase::*;
        assert!(Start.can_transition_to(DeviceResolving));
        assert!(DeviceResolving.can_transition_to(Decided));
        assert!(!Start.can_transition_to(CapabilityResolving));
        assert!(!Decided.can_transition_to(Start));

        let mut tracker = PhaseTracker::new("machine_command_execute");
        tracker.advance(DeviceResolving);
        tracker.advance(Start);
        tracker.advance(CapabilityResolving);
        let outcome = tracker.decide(ResolutionOutcome::failed("none"));
        assert_eq!(outcome.status(), "failed");
        assert_eq!(
            tracker.trace(),
            &[Start, DeviceResolving, CapabilityResolving, Decided]
        );
    }
}
