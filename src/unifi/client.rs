//! UniFi controller API client
//!
//! Every operation performs a fresh login against the classic controller API
//! (cookie session, `{"meta": {"rc": ...}, "data": [...]}` envelope) and then
//! dispatches exactly one request. Sessions are not reused across cycles.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ControllerConfig;
use crate::error::{AgentError, Result};

/// Outcome of the last controller session, consumed by the status interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Unknown,
    Ok,
    AuthError,
}

/// Shared last-session-outcome signal, written by the client on every login
pub struct ConnectionState(AtomicU8);

impl ConnectionState {
    pub fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub fn set(&self, status: ConnectionStatus) {
        let raw = match status {
            ConnectionStatus::Unknown => 0,
            ConnectionStatus::Ok => 1,
            ConnectionStatus::AuthError => 2,
        };
        self.0.store(raw, Ordering::SeqCst);
    }

    pub fn get(&self) -> ConnectionStatus {
        match self.0.load(Ordering::SeqCst) {
            1 => ConnectionStatus::Ok,
            2 => ConnectionStatus::AuthError,
            _ => ConnectionStatus::Unknown,
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// One wireless network configuration entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WlanConf {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub is_guest: bool,
}

/// One station entry from the controller's client list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEntry {
    pub mac: String,
    #[serde(default)]
    pub last_seen: i64,
}

#[derive(Debug, Deserialize)]
struct ApiMeta {
    rc: String,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    meta: ApiMeta,
    #[serde(default)]
    data: Vec<Value>,
}

/// Lowercase a reported hardware address for registry comparison
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_lowercase()
}

/// The fixed operation whitelist the agent needs from the controller.
/// Implemented by [`UnifiClient`]; cycle tests script it instead.
#[async_trait]
pub trait ControllerApi: Send + Sync {
    async fn list_health(&self, creds: &ControllerConfig) -> Result<Vec<Value>>;
    async fn list_wlanconf(&self, creds: &ControllerConfig) -> Result<Vec<WlanConf>>;
    async fn list_clients(&self, creds: &ControllerConfig) -> Result<Vec<ClientEntry>>;
    async fn disable_wlan(&self, creds: &ControllerConfig, id: &str, disable: bool)
        -> Result<bool>;
}

pub struct UnifiClient {
    http_client: Client,
    status: Arc<ConnectionState>,
}

impl UnifiClient {
    pub fn new(status: Arc<ConnectionState>) -> Result<Self> {
        let http_client = Client::builder()
            .danger_accept_invalid_certs(true) // controllers ship self-signed certs
            .cookie_store(true)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(AgentError::Http)?;

        Ok(Self {
            http_client,
            status,
        })
    }

    /// Fresh login. Failure (bad credentials or unreachable controller) is
    /// fatal for the calling cycle; the status signal records the outcome.
    async fn login(&self, creds: &ControllerConfig) -> Result<String> {
        let base = creds.url.trim_end_matches('/').to_string();
        let url = format!("{}/api/login", base);

        let body = serde_json::json!({
            "username": creds.username,
            "password": creds.password,
        });

        let resp = match self.http_client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                self.status.set(ConnectionStatus::AuthError);
                return Err(AgentError::Auth(format!("controller unreachable: {}", e)));
            }
        };

        let envelope: ApiEnvelope = match resp.json().await {
            Ok(env) => env,
            Err(e) => {
                self.status.set(ConnectionStatus::AuthError);
                return Err(AgentError::Auth(format!("login response: {}", e)));
            }
        };

        if envelope.meta.rc != "ok" {
            self.status.set(ConnectionStatus::AuthError);
            return Err(AgentError::Auth(format!(
                "login rejected: {}",
                envelope.meta.msg.unwrap_or_else(|| "unknown".to_string())
            )));
        }

        self.status.set(ConnectionStatus::Ok);
        Ok(base)
    }

    async fn get_data(&self, base: &str, creds: &ControllerConfig, path: &str) -> Result<Vec<Value>> {
        let url = format!("{}/api/s/{}/{}", base, creds.site, path);

        let resp = self.http_client.get(&url).send().await?;
        let envelope: ApiEnvelope = resp
            .json()
            .await
            .map_err(|e| AgentError::Api(format!("{}: {}", path, e)))?;

        if envelope.meta.rc != "ok" {
            return Err(AgentError::Api(format!(
                "{}: {}",
                path,
                envelope.meta.msg.unwrap_or_else(|| "error".to_string())
            )));
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl ControllerApi for UnifiClient {
    async fn list_health(&self, creds: &ControllerConfig) -> Result<Vec<Value>> {
        let base = self.login(creds).await?;
        self.get_data(&base, creds, "stat/health").await
    }

    async fn list_wlanconf(&self, creds: &ControllerConfig) -> Result<Vec<WlanConf>> {
        let base = self.login(creds).await?;
        let data = self.get_data(&base, creds, "list/wlanconf").await?;

        data.into_iter()
            .map(|v| {
                serde_json::from_value(v).map_err(|e| AgentError::Api(format!("wlanconf: {}", e)))
            })
            .collect()
    }

    async fn list_clients(&self, creds: &ControllerConfig) -> Result<Vec<ClientEntry>> {
        let base = self.login(creds).await?;
        let data = self.get_data(&base, creds, "stat/sta").await?;

        data.into_iter()
            .map(|v| {
                serde_json::from_value(v).map_err(|e| AgentError::Api(format!("client: {}", e)))
            })
            .collect()
    }

    async fn disable_wlan(
        &self,
        creds: &ControllerConfig,
        id: &str,
        disable: bool,
    ) -> Result<bool> {
        let base = self.login(creds).await?;
        let url = format!("{}/api/s/{}/upd/wlanconf/{}", base, creds.site, id);

        // The controller primitive is "disable": enabling sends enabled=true
        let body = serde_json::json!({ "enabled": !disable });

        let resp = self.http_client.post(&url).json(&body).send().await?;
        let envelope: ApiEnvelope = resp
            .json()
            .await
            .map_err(|e| AgentError::Api(format!("upd/wlanconf: {}", e)))?;

        Ok(envelope.meta.rc == "ok")
    }
}
