//! Per-tool argument contracts
//!
//! Each known tool declares its fields with type, requiredness and a
//! corrective hint. Validation reports every violation at once, naming the
//! field, what was received and what to send instead.

use super::{
    ValidationError, ValidationErrorCode, ValidationResult, ValidationWarning,
    ValidationWarningCode,
};
use crate::error::Result;
use crate::tools::{json_type_name, ToolName};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

const ISO8601_PATTERN: &str =
    r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$";

/// JSON shape a field must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    StringArray,
    Array,
    Object,
}

impl FieldType {
    fn describe(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::StringArray => "array of strings",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

/// Schema constraint definition for one tool argument
#[derive(Debug, Clone)]
pub struct SchemaConstraint {
    /// Field name
    pub field: String,
    /// Expected JSON shape
    pub field_type: FieldType,
    /// Whether the field is required
    pub required: bool,
    /// Regex pattern for string values
    pub pattern: Option<Regex>,
    /// Human-readable pattern description
    pub pattern_description: Option<String>,
    /// Minimum value for integers
    pub min_value: Option<i64>,
    /// Maximum value for integers
    pub max_value: Option<i64>,
    /// Minimum length for arrays
    pub min_items: Option<usize>,
    /// Allowed enum values
    pub enum_values: Option<Vec<String>>,
    /// Hint shown when the field is missing
    pub missing_hint: Option<String>,
}

impl SchemaConstraint {
    fn new(field: &str, field_type: FieldType, required: bool) -> Self {
        Self {
            field: field.to_string(),
            field_type,
            required,
            pattern: None,
            pattern_description: None,
            min_value: None,
            max_value: None,
            min_items: None,
            enum_values: None,
            missing_hint: None,
        }
    }

    pub fn string(field: &str, required: bool) -> Self {
        Self::new(field, FieldType::String, required)
    }

    pub fn integer(field: &str, required: bool) -> Self {
        Self::new(field, FieldType::Integer, required)
    }

    pub fn boolean(field: &str) -> Self {
        Self::new(field, FieldType::Boolean, false)
    }

    pub fn string_array(field: &str, required: bool) -> Self {
        Self::new(field, FieldType::StringArray, required)
    }

    pub fn array(field: &str, required: bool) -> Self {
        Self::new(field, FieldType::Array, required)
    }

    pub fn object(field: &str, required: bool) -> Self {
        Self::new(field, FieldType::Object, required)
    }

    /// ISO8601 datetime string
    pub fn datetime(field: &str, required: bool) -> Result<Self> {
        let mut constraint = Self::new(field, FieldType::String, required);
        constraint.pattern = Some(Regex::new(ISO8601_PATTERN)?);
        constraint.pattern_description =
            Some("an ISO8601 datetime, e.g. 2024-01-31T08:00:00Z".to_string());
        Ok(constraint)
    }

    /// Sorting order (`asc` / `desc`)
    pub fn sorting(field: &str) -> Self {
        let mut constraint = Self::new(field, FieldType::String, false);
        constraint.enum_values = Some(vec!["asc".to_string(), "desc".to_string()]);
        constraint
    }

    pub fn with_range(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn with_min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn with_missing_hint<S: Into<String>>(mut self, hint: S) -> Self {
        self.missing_hint = Some(hint.into());
        self
    }

    fn error(
        &self,
        code: ValidationErrorCode,
        message: String,
        actual: Option<String>,
        suggestion: Option<String>,
    ) -> ValidationError {
        ValidationError {
            field: self.field.clone(),
            message,
            code,
            expected: Some(self.field_type.describe().to_string()),
            actual,
            suggestion,
        }
    }

    /// Validate a value (or its absence) against this constraint
    pub fn validate(&self, value: Option<&Value>) -> Option<ValidationError> {
        let value = match value {
            None | Some(Value::Null) => {
                if !self.required {
                    return None;
                }
                return Some(self.error(
                    ValidationErrorCode::MissingRequired,
                    "required".to_string(),
                    None,
                    Some(
                        self.missing_hint
                            .clone()
                            .unwrap_or_else(|| "this field is required and cannot be omitted".to_string()),
                    ),
                ));
            }
            Some(value) => value,
        };

        if !self.field_type.accepts(value) {
            let suggestion = match (self.field_type, value) {
                (FieldType::StringArray | FieldType::Array, Value::String(s)) => {
                    Some(format!("wrap in an array: [\"{s}\"]"))
                }
                (FieldType::StringArray | FieldType::Array, _) if !value.is_array() => {
                    Some("wrap in an array: [\"value\"]".to_string())
                }
                (FieldType::StringArray, _) => Some("every item must be a string".to_string()),
                (FieldType::Integer, Value::String(_)) => {
                    Some("send a number without quotes".to_string())
                }
                _ => None,
            };
            return Some(self.error(
                ValidationErrorCode::InvalidType,
                format!("must be {}", self.field_type.describe()),
                Some(format!("{} {}", json_type_name(value), value)),
                suggestion,
            ));
        }

        if let Some(text) = value.as_str() {
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(text) {
                    let description = self
                        .pattern_description
                        .as_deref()
                        .unwrap_or("the expected format");
                    return Some(self.error(
                        ValidationErrorCode::PatternMismatch,
                        format!("must be {description}"),
                        Some(format!("\"{text}\"")),
                        None,
                    ));
                }
            }

            if let Some(allowed) = &self.enum_values {
                if !allowed.iter().any(|a| a == text) {
                    return Some(self.error(
                        ValidationErrorCode::InvalidEnum,
                        format!("must be one of: {}", allowed.join(", ")),
                        Some(format!("\"{text}\"")),
                        None,
                    ));
                }
            }
        }

        if let Some(number) = value.as_i64() {
            let below = self.min_value.is_some_and(|min| number < min);
            let above = self.max_value.is_some_and(|max| number > max);
            if below || above {
                let bounds = match (self.min_value, self.max_value) {
                    (Some(min), Some(max)) => format!("between {min} and {max}"),
                    (Some(min), None) => format!("at least {min}"),
                    (None, Some(max)) => format!("at most {max}"),
                    (None, None) => String::new(),
                };
                return Some(self.error(
                    ValidationErrorCode::OutOfRange,
                    format!("must be {bounds}"),
                    Some(number.to_string()),
                    None,
                ));
            }
        }

        if let (Some(min), Some(items)) = (self.min_items, value.as_array()) {
            if items.len() < min {
                return Some(self.error(
                    ValidationErrorCode::OutOfRange,
                    format!("must contain at least {min} item(s)"),
                    Some(format!("{} item(s)", items.len())),
                    self.missing_hint.clone(),
                ));
            }
        }

        None
    }
}

/// Schema validator for tool arguments
#[derive(Debug)]
pub struct SchemaValidator {
    constraints: HashMap<ToolName, Vec<SchemaConstraint>>,
}

impl SchemaValidator {
    /// Create a validator with the contracts of every known tool
    pub fn new() -> Result<Self> {
        let mut validator = Self {
            constraints: HashMap::new(),
        };
        validator.init_standard_schemas()?;
        Ok(validator)
    }

    /// Add constraints for a tool
    pub fn add_tool_constraints(&mut self, tool: ToolName, constraints: Vec<SchemaConstraint>) {
        self.constraints.insert(tool, constraints);
    }

    /// Whether the tool's contract declares `field`
    pub fn declares(&self, tool: ToolName, field: &str) -> bool {
        self.constraints
            .get(&tool)
            .is_some_and(|constraints| constraints.iter().any(|c| c.field == field))
    }

    /// Required fields of a tool
    pub fn required_fields(&self, tool: ToolName) -> Vec<&str> {
        self.constraints
            .get(&tool)
            .map(|constraints| {
                constraints
                    .iter()
                    .filter(|c| c.required)
                    .map(|c| c.field.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Validate parameters for a tool; unknown tools always pass
    pub fn validate_tool_parameters(&self, tool_name: &str, parameters: &Value) -> ValidationResult {
        self.validate_except(tool_name, parameters, &[])
    }

    /// Validate parameters, ignoring the constraints of `skip`
    pub fn validate_except(
        &self,
        tool_name: &str,
        parameters: &Value,
        skip: &[&str],
    ) -> ValidationResult {
        debug!("Validating parameters for tool: {}", tool_name);

        let Some(constraints) = tool_name
            .parse::<ToolName>()
            .ok()
            .and_then(|tool| self.constraints.get(&tool))
        else {
            debug!("No constraints found for tool: {}", tool_name);
            return ValidationResult::success();
        };

        let Some(params) = parameters.as_object() else {
            return ValidationResult::from_parts(
                vec![ValidationError {
                    field: "arguments".to_string(),
                    message: "must be an object".to_string(),
                    code: ValidationErrorCode::InvalidType,
                    expected: Some("object".to_string()),
                    actual: Some(json_type_name(parameters).to_string()),
                    suggestion: None,
                }],
                vec![],
            );
        };

        let errors: Vec<_> = constraints
            .iter()
            .filter(|c| !skip.contains(&c.field.as_str()))
            .filter_map(|c| c.validate(params.get(&c.field)))
            .collect();

        // Unknown fields only warn; resolution inputs such as device_name are expected here
        let warnings: Vec<_> = params
            .keys()
            .filter(|key| !constraints.iter().any(|c| &c.field == *key))
            .map(|key| ValidationWarning {
                field: key.clone(),
                message: format!("not a parameter of {tool_name}"),
                code: ValidationWarningCode::UnknownField,
            })
            .collect();

        if !errors.is_empty() {
            warn!(
                "{} invalid parameter(s) for tool '{}'",
                errors.len(),
                tool_name
            );
        }

        ValidationResult::from_parts(errors, warnings)
    }

    /// Initialize the contracts of the tool catalog
    fn init_standard_schemas(&mut self) -> Result<()> {
        let device_id = || {
            SchemaConstraint::string("device_id", true)
                .with_missing_hint("provide device_name or serial for auto-resolution")
        };
        let machine_id = || {
            SchemaConstraint::string("machine_id", true)
                .with_missing_hint("provide device_name or serial for auto-resolution")
        };
        let limit = || SchemaConstraint::integer("limit", false).with_range(Some(1), Some(1000));

        self.add_tool_constraints(
            ToolName::DeviceDetails,
            vec![
                device_id(),
                SchemaConstraint::boolean("include_machine_model"),
                SchemaConstraint::boolean("include_machines_group"),
            ],
        );

        self.add_tool_constraints(
            ToolName::DeviceUpdate,
            vec![
                device_id(),
                SchemaConstraint::string("name", false),
                SchemaConstraint::string("serial", false),
            ],
        );

        self.add_tool_constraints(
            ToolName::DeviceFirmwareDetail,
            vec![
                machine_id(),
                SchemaConstraint::boolean("include_machine_variables"),
                SchemaConstraint::boolean("include_machine_commands"),
            ],
        );

        self.add_tool_constraints(
            ToolName::MachineCommandExecute,
            vec![
                device_id(),
                SchemaConstraint::string("machine_command_id", true)
                    .with_missing_hint("provide command_name for auto-resolution"),
                SchemaConstraint::object("overrides", false),
            ],
        );

        self.add_tool_constraints(
            ToolName::PerformAction,
            vec![
                device_id(),
                SchemaConstraint::string("name", true),
                SchemaConstraint::array("parameters", false),
            ],
        );

        self.add_tool_constraints(
            ToolName::MetricsRead,
            vec![
                SchemaConstraint::string("device_id", false),
                SchemaConstraint::string("device_name", false),
                SchemaConstraint::string("serial", false),
                SchemaConstraint::datetime("from", false)?,
                SchemaConstraint::datetime("to", false)?,
                SchemaConstraint::string_array("metric_names", false),
                SchemaConstraint::sorting("sorting"),
                SchemaConstraint::string("after", false),
                SchemaConstraint::boolean("last_value"),
                limit(),
            ],
        );

        self.add_tool_constraints(
            ToolName::EventsRead,
            vec![
                device_id(),
                SchemaConstraint::datetime("from", true)?,
                SchemaConstraint::datetime("to", true)?,
                SchemaConstraint::string_array("events_names", false),
                SchemaConstraint::sorting("sorting"),
                SchemaConstraint::string("after", false),
                SchemaConstraint::string_array("severity", false),
                limit(),
            ],
        );

        self.add_tool_constraints(
            ToolName::StatesRead,
            vec![
                device_id(),
                SchemaConstraint::datetime("from", true)?,
                SchemaConstraint::datetime("to", true)?,
                SchemaConstraint::string_array("states_names", false),
                SchemaConstraint::sorting("sorting"),
                SchemaConstraint::string("after", false),
                SchemaConstraint::boolean("include_translations"),
                limit(),
            ],
        );

        self.add_tool_constraints(
            ToolName::StateReadLastValue,
            vec![device_id(), SchemaConstraint::string_array("states_names", false)],
        );

        self.add_tool_constraints(
            ToolName::ReadParameters,
            vec![
                device_id(),
                SchemaConstraint::string_array("parameter_name_list", false),
            ],
        );

        self.add_tool_constraints(
            ToolName::ReadSingleParameter,
            vec![device_id(), SchemaConstraint::string("parameter_label", true)],
        );

        self.add_tool_constraints(ToolName::DeviceManagedRecipes, vec![machine_id()]);

        self.add_tool_constraints(
            ToolName::AggregatedMetrics,
            vec![
                SchemaConstraint::string_array("device_ids", true)
                    .with_min_items(1)
                    .with_missing_hint("omit it to aggregate over every known device"),
                SchemaConstraint::datetime("from", false)?,
                SchemaConstraint::datetime("to", false)?,
                SchemaConstraint::string_array("metric_names", false),
                SchemaConstraint::sorting("sorting"),
                SchemaConstraint::string("after", false),
                limit(),
            ],
        );

        for tool in [ToolName::OverviewEvents, ToolName::OverviewAlarms] {
            self.add_tool_constraints(
                tool,
                vec![
                    SchemaConstraint::string_array("machine_ids", false),
                    SchemaConstraint::string_array("severities", false),
                ],
            );
        }

        self.add_tool_constraints(
            ToolName::ListMachines,
            vec![
                SchemaConstraint::string("serial", false),
                SchemaConstraint::string("search", false),
                SchemaConstraint::boolean("is_connected"),
                SchemaConstraint::string_array("machine_groups_ids", false),
                SchemaConstraint::string_array("machine_model_ids", false),
                SchemaConstraint::boolean("no_group_assigned"),
                SchemaConstraint::boolean("include_machine_model"),
                SchemaConstraint::boolean("include_machines_group"),
                SchemaConstraint::boolean("include_machine_plans"),
                limit(),
                SchemaConstraint::string("after", false),
            ],
        );

        Ok(())
    }
}
