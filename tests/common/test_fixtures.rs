//! Test fixtures and utilities for consistent test setup
//!
//! Provides reusable device data, configuration helpers and the caller
//! credentials shared by the integration tests.

use rstest::*;
use serde_json::{json, Value};
use std::time::Duration;
use things5_mcp_rust::client::{AuthContext, DeviceRecord};
use things5_mcp_rust::config::{IntentConfig, Things5Config};
use url::Url;

/// Bearer token the mock platform accepts
pub const TEST_TOKEN: &str = "test-token";

/// Organization the mock platform reports
pub const TEST_ORGANIZATION: &str = "org-1";

/// Common test device ids for consistent testing
pub struct TestDeviceIds;

impl TestDeviceIds {
    pub const KITCHEN_FRIDGE: &'static str = "d0c1a6f2-0001";
    pub const LIVING_FRIDGE: &'static str = "d0c1a6f2-0002";
    pub const OVEN: &'static str = "d0c1a6f2-0003";
}

/// Caller credentials
#[fixture]
pub fn auth() -> AuthContext {
    AuthContext::new(TEST_TOKEN)
}

/// Intent tuning with test-friendly timeouts
#[fixture]
pub fn intent_config() -> IntentConfig {
    IntentConfig {
        fetch_timeout: Duration::from_secs(2),
        ..IntentConfig::default()
    }
}

/// Platform configuration pointing at a mock server
pub fn things5_config(base_url: &Url) -> Things5Config {
    let mut config = Things5Config::new(base_url.clone());
    config.timeout = Duration::from_secs(2);
    config
}

/// Wire representation of a device
pub fn device_json(id: &str, name: &str, serial: &str, connected: bool) -> Value {
    json!({
        "id": id,
        "name": name,
        "serial": serial,
        "is_connected": connected,
        "machine_model_id": "model-frigo",
        "active": true
    })
}

/// Two connected fridges and an offline oven
pub fn kitchen_devices_json() -> Vec<Value> {
    vec![
        device_json(TestDeviceIds::KITCHEN_FRIDGE, "Frigo Cucina", "FRIGO001", true),
        device_json(TestDeviceIds::LIVING_FRIDGE, "Frigo Sala", "FRIGO002", true),
        device_json(TestDeviceIds::OVEN, "Forno", "OVEN001", false),
    ]
}

/// The same inventory as records
#[fixture]
pub fn kitchen_devices() -> Vec<DeviceRecord> {
    kitchen_devices_json()
        .into_iter()
        .map(|device| serde_json::from_value(device).expect("valid device fixture"))
        .collect()
}
