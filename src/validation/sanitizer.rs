//! Input sanitization
//!
//! Repairs common argument shape mistakes before schema validation. The
//! pass is deterministic and idempotent and never invents values:
//!
//! - any key containing "limit" holding a numeric string becomes an integer,
//!   truncating a fractional part
//! - empty-string values are removed
//! - known list parameters given as a bare scalar are wrapped in a list

use crate::tools::ToolName;
use serde_json::{Map, Value};
use tracing::debug;

/// List-typed parameters per tool
fn array_fields(tool: ToolName) -> &'static [&'static str] {
    match tool {
        ToolName::MetricsRead | ToolName::EventsRead | ToolName::StatesRead => &[
            "metric_names",
            "events_names",
            "states_names",
            "event_names",
            "severity",
        ],
        ToolName::StateReadLastValue => &["states_names"],
        ToolName::ReadParameters | ToolName::ReadSingleParameter => {
            &["parameter_name_list", "configuration_filter"]
        }
        ToolName::AggregatedMetrics => &["device_ids", "machine_ids", "metric_names"],
        ToolName::OverviewEvents | ToolName::OverviewAlarms => &["machine_ids", "severities"],
        ToolName::ListMachines => &["machine_groups_ids", "machine_model_ids"],
        _ => &[],
    }
}

/// Normalize raw tool arguments; non-object input is returned unchanged
pub fn sanitize(tool_name: &str, raw_args: Value) -> Value {
    let Value::Object(map) = raw_args else {
        return raw_args;
    };

    let mut corrections = Vec::new();
    let mut sanitized = sanitize_common(map, &mut corrections);

    if let Ok(tool) = tool_name.parse::<ToolName>() {
        for field in array_fields(tool) {
            if let Some(value) = sanitized.get_mut(*field) {
                if matches!(value, Value::String(_) | Value::Number(_)) {
                    let scalar = value.take();
                    *value = Value::Array(vec![scalar]);
                    corrections.push(format!("wrapped {field} in an array"));
                }
            }
        }
    }

    if !corrections.is_empty() {
        debug!("Corrected input for {}: {}", tool_name, corrections.join(", "));
    }

    Value::Object(sanitized)
}

fn sanitize_common(map: Map<String, Value>, corrections: &mut Vec<String>) -> Map<String, Value> {
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) if s.is_empty() => {
                corrections.push(format!("dropped empty {key}"));
                None
            }
            Value::String(s) if key.contains("limit") => match numeric_limit(&s) {
                Some(number) => {
                    corrections.push(format!("converted {key} to a number"));
                    Some((key, Value::from(number)))
                }
                None => Some((key, Value::String(s))),
            },
            other => Some((key, other)),
        })
        .collect()
}

fn numeric_limit(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(number) = raw.parse::<i64>() {
        return Some(number);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && n.abs() < i64::MAX as f64)
        .map(|n| n.trunc() as i64)
}
