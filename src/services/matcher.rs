//! Tiered entity matching
//!
//! Resolves a free-text term against devices, commands or telemetry
//! variables. Tiers are tried in order and the first tier with a hit wins:
//!
//! 1. exact id
//! 2. exact secondary key (case-insensitive)
//! 3. exact display name (case-insensitive)
//! 4. term contained in display name
//! 5. term contained in secondary key
//!
//! Within a tier, input order breaks ties.

use crate::client::{CommandRecord, DeviceRecord, VariableRecord};
use serde::Serialize;
use tracing::debug;

/// Fields a record exposes to the matcher
pub trait Matchable {
    /// Opaque identifier, compared exactly
    fn primary_id(&self) -> &str;

    /// Stable secondary key (e.g. serial), if the record has one
    fn secondary_key(&self) -> Option<&str> {
        None
    }

    /// Human-facing name
    fn display_name(&self) -> &str;
}

impl Matchable for DeviceRecord {
    fn primary_id(&self) -> &str {
        &self.id
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.serial)
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Matchable for CommandRecord {
    fn primary_id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Matchable for VariableRecord {
    fn primary_id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// Which matching tier produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    ExactId,
    ExactSecondary,
    ExactName,
    NameContains,
    SecondaryContains,
}

impl MatchTier {
    const ORDER: [MatchTier; 5] = [
        MatchTier::ExactId,
        MatchTier::ExactSecondary,
        MatchTier::ExactName,
        MatchTier::NameContains,
        MatchTier::SecondaryContains,
    ];

    /// Whether the hit came from an exact comparison
    pub fn is_exact(&self) -> bool {
        matches!(
            self,
            MatchTier::ExactId | MatchTier::ExactSecondary | MatchTier::ExactName
        )
    }

    fn matches<T: Matchable>(&self, record: &T, raw: &str, lowered: &str) -> bool {
        match self {
            MatchTier::ExactId => record.primary_id() == raw,
            MatchTier::ExactSecondary => record
                .secondary_key()
                .is_some_and(|key| key.to_lowercase() == lowered),
            MatchTier::ExactName => record.display_name().to_lowercase() == lowered,
            MatchTier::NameContains => record.display_name().to_lowercase().contains(lowered),
            MatchTier::SecondaryContains => record
                .secondary_key()
                .is_some_and(|key| key.to_lowercase().contains(lowered)),
        }
    }
}

/// Find the best record for `term`, reporting the tier that matched
pub fn find_with_tier<'a, T: Matchable>(records: &'a [T], term: &str) -> Option<(&'a T, MatchTier)> {
    let raw = term.trim();
    if raw.is_empty() || records.is_empty() {
        return None;
    }
    let lowered = raw.to_lowercase();

    for tier in MatchTier::ORDER {
        if let Some(record) = records.iter().find(|r| tier.matches(*r, raw, &lowered)) {
            debug!(
                "Matched '{}' to '{}' via {:?}",
                raw,
                record.display_name(),
                tier
            );
            return Some((record, tier));
        }
    }

    debug!("No match found for '{}'", raw);
    None
}

/// Find the best record for `term`
pub fn find<'a, T: Matchable>(records: &'a [T], term: &str) -> Option<&'a T> {
    find_with_tier(records, term).map(|(record, _)| record)
}

/// Every record hit by the first matching tier, in input order
pub fn find_all<'a, T: Matchable>(records: &'a [T], term: &str) -> Vec<&'a T> {
    let raw = term.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let lowered = raw.to_lowercase();

    MatchTier::ORDER
        .iter()
        .map(|tier| {
            records
                .iter()
                .filter(|r| tier.matches(*r, raw, &lowered))
                .collect::<Vec<_>>()
        })
        .find(|hits| !hits.is_empty())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, name: &str, serial: &str) -> DeviceRecord {
        DeviceRecord {
            id: id.to_string(),
            name: name.to_string(),
            serial: serial.to_string(),
            is_connected: true,
            model_ref: None,
            firmware_ref: None,
            active: Some(true),
        }
    }

    fn fleet() -> Vec<DeviceRecord> {
        vec![
            device("1", "Frigo Cucina", "FRIGO001"),
            device("2", "Frigo Sala", "FRIGO002"),
        ]
    }

    #[test]
    fn test_serial_exact_beats_substring() {
        let devices = fleet();
        let (hit, tier) = find_with_tier(&devices, "FRIGO001").unwrap();
        assert_eq!(hit.id, "1");
        assert_eq!(tier, MatchTier::ExactSecondary);

        let (hit, tier) = find_with_tier(&devices, "frigo002").unwrap();
        assert_eq!(hit.id, "2");
        assert_eq!(tier, MatchTier::ExactSecondary);
    }

    #[test]
    fn test_substring_ties_break_by_order() {
        let devices = fleet();
        for _ in 0..3 {
            let (hit, tier) = find_with_tier(&devices, "frigo").unwrap();
            assert_eq!(hit.id, "1");
            assert_eq!(tier, MatchTier::NameContains);
        }
    }

    #[test]
    fn test_tiers_in_order() {
        let devices = fleet();
        assert_eq!(find_with_tier(&devices, "2").unwrap().1, MatchTier::ExactId);
        assert_eq!(find_with_tier(&devices, "frigo sala").unwrap().1, MatchTier::ExactName);
        assert_eq!(find_with_tier(&devices, "  Sala ").unwrap().0.id, "2");
        assert_eq!(find_with_tier(&devices, "O00").unwrap().1, MatchTier::SecondaryContains);
    }

    #[test]
    fn test_no_match_and_empty_term() {
        let devices = fleet();
        assert!(find(&devices, "forno").is_none());
        assert!(find(&devices, "   ").is_none());
        assert!(find::<DeviceRecord>(&[], "frigo").is_none());
    }

    #[test]
    fn test_find_all_returns_first_tier_only() {
        let mut devices = fleet();
        devices.push(device("3", "frigo", "X1"));

        let hits = find_all(&devices, "frigo");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "3");

        let hits = find_all(&devices, "sala");
        assert_eq!(hits.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["2"]);

        let hits = find_all(&devices, "FRIGO00");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_commands_have_no_secondary_key() {
        let commands = vec![CommandRecord {
            id: "c1".to_string(),
            name: "turn_on_light".to_string(),
            description: None,
            parameters: vec![],
        }];
        assert_eq!(find_with_tier(&commands, "light").unwrap().1, MatchTier::NameContains);
        assert_eq!(find_with_tier(&commands, "c1").unwrap().1, MatchTier::ExactId);
    }
}
