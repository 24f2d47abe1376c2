//! Per-device capability lookup
//!
//! Commands and telemetry variables come from the device's firmware detail.
//! Results are not cached; every call costs one remote request. Failures
//! yield empty lists so callers can treat the device as "capability
//! unknown" and move on.

use crate::client::{
    AuthContext, CapabilitySet, CommandRecord, FirmwareDetail, FirmwareInclude, Things5Client,
    VariableKind, VariableRecord,
};
use crate::error::{Result, Things5Error};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetches commands and telemetry variables of a single device
#[derive(Clone)]
pub struct CapabilityFetcher {
    client: Arc<dyn Things5Client>,
    fetch_timeout: Duration,
}

impl CapabilityFetcher {
    pub fn new(client: Arc<dyn Things5Client>, fetch_timeout: Duration) -> Self {
        Self {
            client,
            fetch_timeout,
        }
    }

    async fn firmware(
        &self,
        device_id: &str,
        auth: &AuthContext,
        include: FirmwareInclude,
    ) -> Result<FirmwareDetail> {
        let fetch = async {
            let organization_id = self.client.organization_id(auth).await?;
            self.client
                .machine_firmware(auth, &organization_id, device_id, include)
                .await
        };

        tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .map_err(|_| Things5Error::timeout(format!("Firmware fetch for {device_id} timed out")))?
    }

    async fn firmware_or_empty(
        &self,
        device_id: &str,
        auth: &AuthContext,
        include: FirmwareInclude,
    ) -> FirmwareDetail {
        match self.firmware(device_id, auth, include).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(
                    "Capability fetch for device {} failed: {}",
                    device_id,
                    e.sanitized_message()
                );
                FirmwareDetail::default()
            }
        }
    }

    /// Commands exposed by the device
    pub async fn get_commands(&self, device_id: &str, auth: &AuthContext) -> Vec<CommandRecord> {
        let commands = self
            .firmware_or_empty(device_id, auth, FirmwareInclude::COMMANDS)
            .await
            .commands;
        debug!("Device {} exposes {} commands", device_id, commands.len());
        commands
    }

    /// Telemetry variables of the given kind
    pub async fn get_variables(
        &self,
        device_id: &str,
        auth: &AuthContext,
        kind: VariableKind,
    ) -> Vec<VariableRecord> {
        let variables: Vec<_> = self
            .firmware_or_empty(device_id, auth, FirmwareInclude::VARIABLES)
            .await
            .variables
            .into_iter()
            .filter(|v| v.kind == kind)
            .collect();
        debug!(
            "Device {} exposes {} {} variables",
            device_id,
            variables.len(),
            kind.as_str()
        );
        variables
    }

    /// Metric names exposed by the device
    pub async fn get_metrics(&self, device_id: &str, auth: &AuthContext) -> Vec<String> {
        self.get_variables(device_id, auth, VariableKind::Metric)
            .await
            .into_iter()
            .map(|v| v.name)
            .collect()
    }

    /// Commands and metrics in a single request
    pub async fn get_capabilities(&self, device_id: &str, auth: &AuthContext) -> CapabilitySet {
        let include = FirmwareInclude {
            commands: true,
            variables: true,
        };
        let detail = self.firmware_or_empty(device_id, auth, include).await;

        CapabilitySet {
            device_id: device_id.to_string(),
            commands: detail.commands,
            metrics: detail
                .variables
                .into_iter()
                .filter(|v| v.kind == VariableKind::Metric)
                .map(|v| v.name)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFirmware, MockThings5Client};

    fn fetcher(client: Arc<MockThings5Client>) -> CapabilityFetcher {
        CapabilityFetcher::new(client, Duration::from_secs(5))
    }

    fn firmware() -> MockFirmware {
        MockFirmware::new()
            .command("c1", "turn_on_light")
            .variable("temperature", VariableKind::Metric)
            .variable("door_open", VariableKind::Event)
    }

    #[tokio::test]
    async fn test_commands_and_metrics() {
        let client = Arc::new(MockThings5Client::new().with_firmware("d1", firmware()));
        let fetcher = fetcher(client.clone());
        let auth = AuthContext::new("token");

        let commands = fetcher.get_commands("d1", &auth).await;
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name, "turn_on_light");

        assert_eq!(fetcher.get_metrics("d1", &auth).await, vec!["temperature"]);
        let events = fetcher.get_variables("d1", &auth, VariableKind::Event).await;
        assert_eq!(events[0].name, "door_open");

        let capabilities = fetcher.get_capabilities("d1", &auth).await;
        assert_eq!(capabilities.metrics, vec!["temperature"]);
        assert_eq!(client.firmware_calls(), 4);
    }

    #[tokio::test]
    async fn test_failure_yields_empty() {
        let client = Arc::new(MockThings5Client::new().with_firmware("d1", firmware()));
        client.set_failing(true);
        let fetcher = fetcher(client);

        assert!(fetcher.get_commands("d1", &AuthContext::new("token")).await.is_empty());
        assert!(fetcher.get_metrics("d1", &AuthContext::new("token")).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_device_yields_empty() {
        let client = Arc::new(MockThings5Client::new());
        let fetcher = fetcher(client);
        assert!(fetcher.get_commands("missing", &AuthContext::new("token")).await.is_empty());
    }
}
