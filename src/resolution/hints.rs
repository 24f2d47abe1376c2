//! Free-text hint extraction
//!
//! The keyword tables live in `hints.toml` and are embedded at build time.
//! A deployment can point `intent.hint_tables` at its own copy to extend the
//! vocabulary without a rebuild.

use crate::error::{Result, Things5Error};
use crate::services::Matchable;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Highest table format this build understands
pub const SUPPORTED_VERSION: u32 = 1;

const BUILTIN_TABLES: &str = include_str!("hints.toml");

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).unwrap());

/// One trigger phrase and the capability keywords it implies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintRule {
    pub trigger: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct DeviceTable {
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HintFile {
    version: u32,
    #[serde(default)]
    device: DeviceTable,
    #[serde(default)]
    command: Vec<HintRule>,
    #[serde(default)]
    telemetry: Vec<HintRule>,
}

/// Versioned keyword tables driving hint extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintTables {
    pub version: u32,
    pub device_keywords: Vec<String>,
    pub command: Vec<HintRule>,
    pub telemetry: Vec<HintRule>,
}

impl HintTables {
    /// Tables shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TABLES)
    }

    /// Load tables from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Things5Error::config(format!(
                "Failed to read hint tables {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: HintFile = toml::from_str(content)?;

        if file.version == 0 || file.version > SUPPORTED_VERSION {
            return Err(Things5Error::config(format!(
                "Unsupported hint table version {} (supported: {})",
                file.version, SUPPORTED_VERSION
            )));
        }

        let normalize = |words: Vec<String>| -> Vec<String> {
            words
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        let normalize_rules = |rules: Vec<HintRule>| -> Vec<HintRule> {
            rules
                .into_iter()
                .map(|rule| HintRule {
                    trigger: rule.trigger.trim().to_lowercase(),
                    keywords: normalize(rule.keywords),
                })
                .filter(|rule| !rule.trigger.is_empty())
                .collect()
        };

        Ok(Self {
            version: file.version,
            device_keywords: normalize(file.device.keywords),
            command: normalize_rules(file.command),
            telemetry: normalize_rules(file.telemetry),
        })
    }

    /// Device-type keywords and quoted names found in `text`
    pub fn device_hints(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut hints = Vec::new();
        for keyword in &self.device_keywords {
            if lowered.contains(keyword.as_str()) {
                push_unique(&mut hints, keyword);
            }
        }
        for quoted in quoted_terms(text) {
            push_unique(&mut hints, &quoted);
        }
        if !hints.is_empty() {
            debug!("Device hints: {:?}", hints);
        }
        hints
    }

    /// Command keywords implied by verbs in `text`
    pub fn command_hints(&self, text: &str) -> Vec<String> {
        let hints = fire_rules(&self.command, &text.to_lowercase());
        if !hints.is_empty() {
            debug!("Command hints: {:?}", hints);
        }
        hints
    }

    /// Telemetry keywords implied by `text`, plus any quoted names
    pub fn telemetry_hints(&self, text: &str) -> Vec<String> {
        let mut hints = fire_rules(&self.telemetry, &text.to_lowercase());
        for quoted in quoted_terms(text) {
            push_unique(&mut hints, &quoted);
        }
        if !hints.is_empty() {
            debug!("Telemetry hints: {:?}", hints);
        }
        hints
    }
}

fn fire_rules(rules: &[HintRule], lowered: &str) -> Vec<String> {
    let mut hints = Vec::new();
    for rule in rules.iter().filter(|r| lowered.contains(r.trigger.as_str())) {
        for keyword in &rule.keywords {
            push_unique(&mut hints, keyword);
        }
    }
    hints
}

fn push_unique(hints: &mut Vec<String>, value: &str) {
    if !hints.iter().any(|h| h == value) {
        hints.push(value.to_string());
    }
}

/// Substrings wrapped in single or double quotes
pub fn quoted_terms(text: &str) -> Vec<String> {
    QUOTED
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Records whose full display name appears in `text`
pub fn mentioned<'a, T: Matchable>(records: &'a [T], text: &str) -> Vec<&'a T> {
    let lowered = text.to_lowercase();
    records
        .iter()
        .filter(|record| {
            let name = record.display_name().trim().to_lowercase();
            !name.is_empty() && lowered.contains(&name)
        })
        .collect()
}
