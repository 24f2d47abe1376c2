//! Things5 platform mock server using wiremock
//!
//! Serves the organization, device-list and firmware-detail endpoints the
//! HTTP client talks to, with the same envelopes the platform uses.

use super::test_fixtures::{kitchen_devices_json, TestDeviceIds, TEST_ORGANIZATION};
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock Things5 API server for testing
pub struct MockThings5Server {
    pub server: MockServer,
    pub base_url: Url,
}

impl MockThings5Server {
    /// Start a new mock server; the API lives under `/v1`
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = Url::parse(&format!("{}/v1", server.uri())).expect("Valid mock URL");

        Self { server, base_url }
    }

    fn organization_path(suffix: &str) -> String {
        format!("/v1/organizations/{TEST_ORGANIZATION}{suffix}")
    }

    /// Organization listing, expected `times` times
    pub async fn mock_organization(&self, times: u64) {
        Mock::given(method("GET"))
            .and(path("/v1/organizations"))
            .and(bearer_token(super::test_fixtures::TEST_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": TEST_ORGANIZATION, "name": "Test Org" }]
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Single-page device list
    pub async fn mock_devices(&self, devices: Vec<Value>) {
        self.mock_device_pages(vec![devices]).await;
    }

    /// Device list split into cursor-linked pages
    pub async fn mock_device_pages(&self, pages: Vec<Vec<Value>>) {
        let last = pages.len().saturating_sub(1);
        for (index, devices) in pages.into_iter().enumerate() {
            let pagination = if index < last {
                json!({ "after": format!("cursor-{}", index + 1) })
            } else {
                json!({})
            };
            let response = ResponseTemplate::new(200).set_body_json(json!({
                "data": devices,
                "pagination": pagination
            }));

            let mock = Mock::given(method("GET")).and(path(Self::organization_path("/devices")));
            if index == 0 {
                mock.respond_with(response).mount(&self.server).await;
            } else {
                mock.and(query_param("after", format!("cursor-{index}")))
                    .respond_with(response)
                    .with_priority(1)
                    .mount(&self.server)
                    .await;
            }
        }
    }

    /// Firmware detail for one device
    pub async fn mock_firmware(&self, device_id: &str, commands: Value, variables: Value) {
        Mock::given(method("GET"))
            .and(path(Self::organization_path(&format!(
                "/machines/{device_id}/machine_firmware"
            ))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "id": format!("fw-{device_id}"),
                    "version": "2.4.1",
                    "machine_commands": commands,
                    "machine_variables": variables
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Fail every request to `endpoint` with `status`
    pub async fn mock_error(&self, endpoint: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status).set_body_string("boom"))
            .mount(&self.server)
            .await;
    }

    /// Organization, the kitchen inventory and firmware for both fridges
    pub async fn setup_default_mocks(&self) {
        Mock::given(method("GET"))
            .and(path("/v1/organizations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": TEST_ORGANIZATION }]
            })))
            .mount(&self.server)
            .await;

        self.mock_devices(kitchen_devices_json()).await;

        self.mock_firmware(
            TestDeviceIds::KITCHEN_FRIDGE,
            json!([
                { "id": "cmd-light-on", "name": "turn_on_light", "description": "Switch the cell light on" },
                { "id": "cmd-defrost-1", "name": "defrost", "description": "Defrost cycle" }
            ]),
            json!([
                { "id": "var-1", "name": "temperature_cell", "type": "metric", "unit": "°C" },
                { "id": "var-2", "name": "door_open", "type": "event" }
            ]),
        )
        .await;

        self.mock_firmware(
            TestDeviceIds::LIVING_FRIDGE,
            json!([{ "id": "cmd-defrost-2", "name": "defrost" }]),
            json!([{ "id": "var-3", "name": "temperature_cell", "source": "metrics" }]),
        )
        .await;
    }
}
