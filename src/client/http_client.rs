//! HTTP client implementation for the Things5 platform API
//!
//! Plain REST calls with a bearer token. No retries happen here; callers
//! decide how to degrade when a request fails.

use crate::client::{
    AuthContext, CommandParameter, CommandRecord, DeviceRecord, FirmwareDetail, FirmwareInclude,
    Things5Client, VariableKind, VariableRecord,
};
use crate::config::Things5Config;
use crate::error::{Result, Things5Error};
use async_trait::async_trait;
use lru::LruCache;
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct OrganizationRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DevicesPage {
    #[serde(default)]
    data: Vec<DeviceRecord>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct FirmwareWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    machine_commands: Vec<CommandWire>,
    #[serde(default)]
    machine_variables: Vec<VariableWire>,
}

#[derive(Debug, Deserialize)]
struct CommandWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Vec<CommandParameterWire>,
}

#[derive(Debug, Deserialize)]
struct CommandParameterWire {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    machine_variable_id: Option<String>,
    #[serde(default, rename = "type")]
    param_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VariableWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

impl From<CommandWire> for CommandRecord {
    fn from(wire: CommandWire) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            description: wire.description,
            parameters: wire
                .parameters
                .into_iter()
                .map(|p| CommandParameter {
                    name: p
                        .label
                        .or(p.name)
                        .or(p.machine_variable_id)
                        .unwrap_or_default(),
                    param_type: p.param_type,
                })
                .collect(),
        }
    }
}

impl From<VariableWire> for VariableRecord {
    fn from(wire: VariableWire) -> Self {
        Self {
            kind: VariableKind::classify(wire.kind.as_deref(), wire.source.as_deref()),
            id: wire.id,
            name: wire.name,
            label: wire.label,
            description: wire.description,
            unit: wire.unit,
        }
    }
}

/// HTTP client for the Things5 platform
pub struct Things5HttpClient {
    /// HTTP client instance
    client: Client,

    /// API base URL
    base_url: Url,

    /// Configuration
    config: Things5Config,

    /// Organization id per bearer token, least recently used evicted first
    organizations: Mutex<LruCache<AuthContext, String>>,
}

impl Things5HttpClient {
    /// Create a new HTTP client
    pub fn new(config: Things5Config) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(format!("things5-mcp-rust/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Things5Error::connection(format!("Failed to build HTTP client: {e}")))?;

        let capacity =
            NonZeroUsize::new(config.organization_cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            config,
            organizations: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Build URL for API endpoint, percent-encoding every segment
    fn build_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Things5Error::config(format!("Base URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Execute an authenticated GET and decode the JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        auth: &AuthContext,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!("GET {url}");

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(auth.token())
            .query(query)
            .send()
            .await
            .map_err(|e| {
                let error_msg = format!("HTTP request to {url} failed: {e}");
                if e.is_timeout() {
                    Things5Error::timeout(error_msg)
                } else {
                    Things5Error::connection(error_msg)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let response_text = response.text().await.unwrap_or_default();
            let error_msg = format!("HTTP error {status}: {response_text}");
            return Err(match status.as_u16() {
                401 => Things5Error::authentication(error_msg),
                403 => Things5Error::authentication("Access denied"),
                404 => Things5Error::not_found(format!("{url}")),
                500..=599 => Things5Error::service_unavailable(error_msg),
                _ => Things5Error::connection(error_msg),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl Things5Client for Things5HttpClient {
    async fn organization_id(&self, auth: &AuthContext) -> Result<String> {
        if let Some(id) = self.organizations.lock().await.get(auth) {
            return Ok(id.clone());
        }

        let url = self.build_url(&["organizations"])?;
        let envelope: DataEnvelope<Vec<OrganizationRef>> = self.get_json(auth, url, &[]).await?;
        let id = envelope
            .data
            .into_iter()
            .next()
            .map(|org| org.id)
            .ok_or_else(|| Things5Error::not_found("No organizations found for the user"))?;

        debug!("Resolved organization {id}");
        self.organizations.lock().await.put(auth.clone(), id.clone());
        Ok(id)
    }

    async fn list_devices(
        &self,
        auth: &AuthContext,
        organization_id: &str,
    ) -> Result<Vec<DeviceRecord>> {
        let url = self.build_url(&["organizations", organization_id, "devices"])?;
        let mut devices = Vec::new();
        let mut after: Option<String> = None;

        for page in 0..self.config.max_pages {
            let mut query = vec![
                ("limit", self.config.page_size.to_string()),
                ("include_machine_model", "false".to_string()),
            ];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let body: DevicesPage = self.get_json(auth, url.clone(), &query).await?;
            let count = body.data.len();
            devices.extend(body.data);

            after = body.pagination.and_then(|p| p.after).filter(|c| !c.is_empty());
            if after.is_none() || count == 0 {
                break;
            }
            if page + 1 == self.config.max_pages {
                warn!(
                    "Inventory truncated after {} pages ({} devices)",
                    self.config.max_pages,
                    devices.len()
                );
            }
        }

        info!("Fetched {} devices for organization {}", devices.len(), organization_id);
        Ok(devices)
    }

    async fn machine_firmware(
        &self,
        auth: &AuthContext,
        organization_id: &str,
        device_id: &str,
        include: FirmwareInclude,
    ) -> Result<FirmwareDetail> {
        let url = self.build_url(&[
            "organizations",
            organization_id,
            "machines",
            device_id,
            "machine_firmware",
        ])?;

        let mut query = Vec::new();
        if include.commands {
            query.push(("include_machine_commands", "true".to_string()));
        }
        if include.variables {
            query.push(("include_machine_variables", "true".to_string()));
        }

        let envelope: DataEnvelope<FirmwareWire> = self.get_json(auth, url, &query).await?;
        let wire = envelope.data;

        Ok(FirmwareDetail {
            id: wire.id,
            version: wire.version,
            commands: wire.machine_commands.into_iter().map(Into::into).collect(),
            variables: wire.machine_variables.into_iter().map(Into::into).collect(),
        })
    }
}
