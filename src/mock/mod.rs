//! Mock implementations for testing
//!
//! This module provides an in-memory Things5 client with call counters and
//! a failure switch for service and composer tests.

use crate::client::{
    AuthContext, CommandRecord, DeviceRecord, FirmwareDetail, FirmwareInclude, Things5Client,
    VariableKind, VariableRecord,
};
use crate::error::{Result, Things5Error};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Organization id reported by the mock
pub const MOCK_ORGANIZATION_ID: &str = "org-1";

/// Build a device record for tests
pub fn sample_device(id: &str, name: &str, serial: &str, connected: bool) -> DeviceRecord {
    DeviceRecord {
        id: id.to_string(),
        name: name.to_string(),
        serial: serial.to_string(),
        is_connected: connected,
        model_ref: None,
        firmware_ref: None,
        active: Some(true),
    }
}

/// Firmware content served by the mock for one device
#[derive(Debug, Clone, Default)]
pub struct MockFirmware {
    commands: Vec<CommandRecord>,
    variables: Vec<VariableRecord>,
}

impl MockFirmware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command without description
    pub fn command(self, id: &str, name: &str) -> Self {
        self.described_command(id, name, None)
    }

    /// Add a command with an optional description
    pub fn described_command(mut self, id: &str, name: &str, description: Option<&str>) -> Self {
        self.commands.push(CommandRecord {
            id: id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            parameters: vec![],
        });
        self
    }

    /// Add a telemetry variable
    pub fn variable(mut self, name: &str, kind: VariableKind) -> Self {
        self.variables.push(VariableRecord {
            id: format!("var-{}", self.variables.len() + 1),
            name: name.to_string(),
            label: None,
            description: None,
            unit: None,
            kind,
        });
        self
    }

    fn detail(&self, include: FirmwareInclude) -> FirmwareDetail {
        FirmwareDetail {
            id: Some("fw-mock".to_string()),
            version: Some("1.0.0".to_string()),
            commands: if include.commands {
                self.commands.clone()
            } else {
                Vec::new()
            },
            variables: if include.variables {
                self.variables.clone()
            } else {
                Vec::new()
            },
        }
    }
}

/// Mock Things5 client for testing
///
/// Tokens map to `MOCK_ORGANIZATION_ID` unless registered with
/// [`with_tenant`](Self::with_tenant).
#[derive(Default)]
pub struct MockThings5Client {
    devices: RwLock<Vec<DeviceRecord>>,
    tenants: HashMap<String, (String, Vec<DeviceRecord>)>,
    firmware: HashMap<String, MockFirmware>,
    latency: Option<Duration>,
    failing: AtomicBool,
    inventory_failing: AtomicBool,
    organization_calls: AtomicUsize,
    device_list_calls: AtomicUsize,
    firmware_calls: AtomicUsize,
}

impl MockThings5Client {
    /// Create new mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inventory
    pub fn with_devices(self, devices: Vec<DeviceRecord>) -> Self {
        if let Ok(mut current) = self.devices.write() {
            *current = devices;
        }
        self
    }

    /// Serve a separate organization and inventory to `token`
    pub fn with_tenant(mut self, token: &str, organization_id: &str, devices: Vec<DeviceRecord>) -> Self {
        self.tenants
            .insert(token.to_string(), (organization_id.to_string(), devices));
        self
    }

    /// Serve firmware for a device
    pub fn with_firmware(mut self, device_id: &str, firmware: MockFirmware) -> Self {
        self.firmware.insert(device_id.to_string(), firmware);
        self
    }

    /// Delay every response (use with a paused tokio clock)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the inventory served by later calls
    pub fn set_devices(&self, devices: Vec<DeviceRecord>) {
        if let Ok(mut current) = self.devices.write() {
            *current = devices;
        }
    }

    /// Make every subsequent call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only the device listing fail
    pub fn set_inventory_failing(&self, failing: bool) {
        self.inventory_failing.store(failing, Ordering::SeqCst);
    }

    pub fn organization_calls(&self) -> usize {
        self.organization_calls.load(Ordering::SeqCst)
    }

    pub fn device_list_calls(&self) -> usize {
        self.device_list_calls.load(Ordering::SeqCst)
    }

    pub fn firmware_calls(&self) -> usize {
        self.firmware_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Things5Error::service_unavailable("Mock platform unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl Things5Client for MockThings5Client {
    async fn organization_id(&self, auth: &AuthContext) -> Result<String> {
        self.organization_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        Ok(self
            .tenants
            .get(auth.token())
            .map(|(organization_id, _)| organization_id.clone())
            .unwrap_or_else(|| MOCK_ORGANIZATION_ID.to_string()))
    }

    async fn list_devices(
        &self,
        _auth: &AuthContext,
        organization_id: &str,
    ) -> Result<Vec<DeviceRecord>> {
        self.device_list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        if self.inventory_failing.load(Ordering::SeqCst) {
            return Err(Things5Error::service_unavailable("Mock inventory unavailable"));
        }
        if let Some((_, devices)) = self.tenants.values().find(|(org, _)| org == organization_id) {
            return Ok(devices.clone());
        }
        self.devices
            .read()
            .map(|devices| devices.clone())
            .map_err(|_| Things5Error::connection("Mock inventory lock poisoned"))
    }

    async fn machine_firmware(
        &self,
        _auth: &AuthContext,
        _organization_id: &str,
        device_id: &str,
        include: FirmwareInclude,
    ) -> Result<FirmwareDetail> {
        self.firmware_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        self.firmware
            .get(device_id)
            .map(|firmware| firmware.detail(include))
            .ok_or_else(|| Things5Error::not_found(format!("Firmware for device {device_id}")))
    }
}
