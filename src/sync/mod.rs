//! Sync scheduler: the two periodic cycles and the actuator entry point
//!
//! The data cycle mirrors controller health metrics and the guest-network flag
//! at a coarse interval; the presence cycle re-evaluates tracked devices at a
//! fine one. Cycles are independent, fail-fast on authentication errors, and
//! commit nothing for a cycle that aborts. A per-cycle busy flag skips a
//! trigger that finds the previous cycle of the same type still running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::config::Config;
use crate::error::Result;
use crate::guest;
use crate::metrics;
use crate::presence;
use crate::sink::{
    VariableSink, GUEST_PORTAL_IDENT, PRESENCE_CATEGORY_IDENT, PRESENCE_CATEGORY_NAME, ROOT_SCOPE,
};
use crate::unifi::{ConnectionState, ControllerApi};

pub struct SyncScheduler {
    api: Arc<dyn ControllerApi>,
    sink: Arc<dyn VariableSink>,
    status: Arc<ConnectionState>,
    data_busy: AtomicBool,
    presence_busy: AtomicBool,
}

impl SyncScheduler {
    pub fn new(
        api: Arc<dyn ControllerApi>,
        sink: Arc<dyn VariableSink>,
        status: Arc<ConnectionState>,
    ) -> Self {
        Self {
            api,
            sink,
            status,
            data_busy: AtomicBool::new(false),
            presence_busy: AtomicBool::new(false),
        }
    }

    /// Data-sync loop (runs forever). First cycle fires immediately.
    pub async fn start_data_loop(self: Arc<Self>) {
        tracing::info!("[DataSync] Starting data sync loop");

        loop {
            let config = reload_config();
            let wait = config
                .as_ref()
                .map(|c| c.sync.data_interval_secs.max(1))
                .unwrap_or(600);

            if let Some(config) = config {
                if config.is_configured() {
                    if let Err(e) = self.run_data_cycle(&config).await {
                        tracing::warn!("[DataSync] Cycle failed: {}", e);
                    }
                } else {
                    tracing::debug!("[DataSync] Controller not configured, skipping");
                }
            }

            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    /// Presence loop (runs forever). First cycle fires immediately.
    pub async fn start_presence_loop(self: Arc<Self>) {
        tracing::info!("[Presence] Starting presence loop");

        loop {
            let config = reload_config();
            let wait = config
                .as_ref()
                .map(|c| c.sync.presence_interval_secs.max(1))
                .unwrap_or(30);

            if let Some(config) = config {
                if config.is_configured() {
                    if let Err(e) = self.run_presence_cycle(&config).await {
                        tracing::warn!("[Presence] Cycle failed: {}", e);
                    }
                } else {
                    tracing::debug!("[Presence] Controller not configured, skipping");
                }
            }

            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    /// One data-sync cycle: fetch health and wlan configuration, then commit
    /// the metric snapshot and the mirrored guest flag. Aborts before any
    /// commit on a session failure.
    pub async fn run_data_cycle(&self, config: &Config) -> Result<()> {
        if self
            .data_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("[DataSync] Previous cycle still running, skipping");
            return Ok(());
        }

        let result = self.data_cycle(config).await;
        self.data_busy.store(false, Ordering::SeqCst);

        self.sink.set_connection_status(self.status.get()).await;
        result
    }

    async fn data_cycle(&self, config: &Config) -> Result<()> {
        let creds = &config.controller;

        // Both fetches precede any commit
        let health = self.api.list_health(creds).await?;
        let wlans = self.api.list_wlanconf(creds).await?;

        let snapshot = metrics::extract(&health);
        tracing::debug!("[DataSync] UniFi data: {}", snapshot.to_log_value());

        for (position, (name, value)) in snapshot.iter().enumerate() {
            self.sink
                .upsert_value(ROOT_SCOPE, name, value.clone(), position as u32, None)
                .await;
        }

        if let Some(enabled) = guest::read_state(&wlans) {
            self.sink.set_value(GUEST_PORTAL_IDENT, json!(enabled)).await;
        }

        Ok(())
    }

    /// One presence cycle: rebuild the registry from the freshest client list
    /// and commit every tracked device's flag.
    pub async fn run_presence_cycle(&self, config: &Config) -> Result<()> {
        if self
            .presence_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("[Presence] Previous cycle still running, skipping");
            return Ok(());
        }

        let result = self.presence_cycle(config).await;
        self.presence_busy.store(false, Ordering::SeqCst);

        self.sink.set_connection_status(self.status.get()).await;
        result
    }

    async fn presence_cycle(&self, config: &Config) -> Result<()> {
        let devices = config.tracked_devices()?;
        let clients = self.api.list_clients(&config.controller).await?;

        let now = chrono::Utc::now().timestamp();
        let registry = presence::evaluate(&devices, &clients, config.online_window_secs(), now);
        tracing::debug!("[Presence] UniFi presence data: {}", registry.to_log_value());

        let category = self
            .sink
            .upsert_category(ROOT_SCOPE, PRESENCE_CATEGORY_NAME, PRESENCE_CATEGORY_IDENT)
            .await;

        for (position, entry) in registry.iter().enumerate() {
            self.sink
                .upsert_value(
                    &category,
                    &entry.name,
                    json!(entry.is_online),
                    position as u32,
                    Some(&entry.mac),
                )
                .await;
        }

        Ok(())
    }

    /// Host-facing actuator. Only the guest-network identifier is recognized;
    /// anything else, or a controller without a guest WLAN, returns false.
    pub async fn request_action(&self, config: &Config, ident: &str, value: bool) -> bool {
        if ident != GUEST_PORTAL_IDENT {
            tracing::debug!("[Action] Unrecognized identifier: {}", ident);
            return false;
        }

        guest::set_state(
            self.api.as_ref(),
            self.sink.as_ref(),
            &config.controller,
            value,
        )
        .await
    }
}

/// Configuration is a fresh snapshot per cycle
fn reload_config() -> Option<Config> {
    match Config::load() {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::error!("[Config] Reload failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use crate::config::ControllerConfig;
    use crate::error::AgentError;
    use crate::sink::MemorySink;
    use crate::unifi::{ClientEntry, ConnectionStatus, WlanConf};

    /// Scripted controller standing in for a live session
    struct ScriptedApi {
        health: Vec<Value>,
        wlans: Vec<WlanConf>,
        clients: Vec<ClientEntry>,
        fail_auth: bool,
        status: Arc<ConnectionState>,
        disable_calls: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedApi {
        fn new(status: Arc<ConnectionState>) -> Self {
            Self {
                health: vec![],
                wlans: vec![],
                clients: vec![],
                fail_auth: false,
                status,
                disable_calls: Mutex::new(vec![]),
            }
        }

        fn login(&self) -> Result<()> {
            if self.fail_auth {
                self.status.set(ConnectionStatus::AuthError);
                Err(AgentError::Auth("login rejected".to_string()))
            } else {
                self.status.set(ConnectionStatus::Ok);
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ControllerApi for ScriptedApi {
        async fn list_health(&self, _creds: &ControllerConfig) -> Result<Vec<Value>> {
            self.login()?;
            Ok(self.health.clone())
        }

        async fn list_wlanconf(&self, _creds: &ControllerConfig) -> Result<Vec<WlanConf>> {
            self.login()?;
            Ok(self.wlans.clone())
        }

        async fn list_clients(&self, _creds: &ControllerConfig) -> Result<Vec<ClientEntry>> {
            self.login()?;
            Ok(self.clients.clone())
        }

        async fn disable_wlan(
            &self,
            _creds: &ControllerConfig,
            id: &str,
            disable: bool,
        ) -> Result<bool> {
            self.login()?;
            self.disable_calls
                .lock()
                .await
                .push((id.to_string(), disable));
            Ok(true)
        }
    }

    fn guest_wlan(id: &str, enabled: bool) -> WlanConf {
        WlanConf {
            id: id.to_string(),
            name: Some("Guest".to_string()),
            enabled,
            is_guest: true,
        }
    }

    fn scheduler_with(api: ScriptedApi) -> (Arc<SyncScheduler>, Arc<MemorySink>) {
        let status = api.status.clone();
        let sink = MemorySink::new();
        let scheduler = Arc::new(SyncScheduler::new(Arc::new(api), sink.clone(), status));
        (scheduler, sink)
    }

    fn presence_config(devices: &str) -> Config {
        let mut config = Config::default();
        config.presence.devices = devices.to_string();
        config
    }

    #[tokio::test]
    async fn test_data_cycle_commits_snapshot_and_guest_flag() {
        let status = Arc::new(ConnectionState::new());
        let mut api = ScriptedApi::new(status);
        api.health = vec![
            json!({"wan_ip": "203.0.113.7", "latency": 12}),
            json!({"xput_down": 95.4, "xput_up": 10.1}),
        ];
        api.wlans = vec![guest_wlan("g1", true)];

        let (scheduler, sink) = scheduler_with(api);
        scheduler.run_data_cycle(&Config::default()).await.unwrap();

        let ip = sink.variable("instance/IP").await.unwrap();
        assert_eq!(ip.value, json!("203.0.113.7"));
        assert_eq!(ip.position, 0);

        let download = sink.variable("instance/Download").await.unwrap();
        assert_eq!(download.position, 2);

        assert_eq!(sink.get_value(GUEST_PORTAL_IDENT).await, Some(json!(true)));
        assert_eq!(sink.status().await, ConnectionStatus::Ok);
    }

    #[tokio::test]
    async fn test_data_cycle_is_idempotent() {
        let status = Arc::new(ConnectionState::new());
        let mut api = ScriptedApi::new(status);
        api.health = vec![json!({"wan_ip": "203.0.113.7", "latency": 12})];

        let (scheduler, sink) = scheduler_with(api);
        let config = Config::default();

        scheduler.run_data_cycle(&config).await.unwrap();
        let count = sink.variable_count().await;
        scheduler.run_data_cycle(&config).await.unwrap();

        assert_eq!(sink.variable_count().await, count);
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_before_any_commit() {
        let status = Arc::new(ConnectionState::new());
        let mut api = ScriptedApi::new(status);
        api.health = vec![json!({"wan_ip": "203.0.113.7"})];
        api.fail_auth = true;

        let (scheduler, sink) = scheduler_with(api);

        let result = scheduler.run_data_cycle(&Config::default()).await;
        assert!(matches!(result, Err(AgentError::Auth(_))));
        assert_eq!(sink.variable_count().await, 0);
        assert_eq!(sink.status().await, ConnectionStatus::AuthError);
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_presence_cycle() {
        let status = Arc::new(ConnectionState::new());
        let mut api = ScriptedApi::new(status);
        api.clients = vec![ClientEntry {
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            last_seen: chrono::Utc::now().timestamp(),
        }];
        api.fail_auth = true;

        let (scheduler, sink) = scheduler_with(api);
        let config = presence_config(r#"[{"mac": "aa:bb:cc:dd:ee:ff", "name": "Phone"}]"#);

        let result = scheduler.run_presence_cycle(&config).await;
        assert!(matches!(result, Err(AgentError::Auth(_))));
        assert_eq!(sink.variable_count().await, 0);
        assert_eq!(sink.status().await, ConnectionStatus::AuthError);
    }

    #[tokio::test]
    async fn test_presence_cycle_commits_registry_by_mac() {
        let status = Arc::new(ConnectionState::new());
        let mut api = ScriptedApi::new(status);
        let now = chrono::Utc::now().timestamp();
        api.clients = vec![
            ClientEntry {
                mac: "AA:BB:CC:DD:EE:FF".to_string(),
                last_seen: now - 60,
            },
            ClientEntry {
                mac: "11:22:33:44:55:66".to_string(),
                last_seen: now - 7200,
            },
        ];

        let (scheduler, sink) = scheduler_with(api);
        let config = presence_config(
            r#"[{"mac": "AA:BB:CC:DD:EE:FF", "name": "Phone"},
                {"mac": "11:22:33:44:55:66", "name": "Tablet"}]"#,
        );

        scheduler.run_presence_cycle(&config).await.unwrap();

        let phone = sink.variable("aa:bb:cc:dd:ee:ff").await.unwrap();
        assert_eq!(phone.value, json!(true));
        assert_eq!(phone.position, 0);

        let tablet = sink.variable("11:22:33:44:55:66").await.unwrap();
        assert_eq!(tablet.value, json!(false));
        assert_eq!(tablet.position, 1);
    }

    #[tokio::test]
    async fn test_busy_guard_skips_reentrant_cycle() {
        let status = Arc::new(ConnectionState::new());
        let mut api = ScriptedApi::new(status);
        api.health = vec![json!({"wan_ip": "203.0.113.7"})];

        let (scheduler, sink) = scheduler_with(api);
        scheduler.data_busy.store(true, Ordering::SeqCst);

        scheduler.run_data_cycle(&Config::default()).await.unwrap();
        assert_eq!(sink.variable_count().await, 0);

        scheduler.data_busy.store(false, Ordering::SeqCst);
        scheduler.run_data_cycle(&Config::default()).await.unwrap();
        assert_eq!(sink.variable_count().await, 1);
    }

    #[tokio::test]
    async fn test_request_action_toggles_guest_network() {
        let status = Arc::new(ConnectionState::new());
        let mut api = ScriptedApi::new(status);
        api.wlans = vec![guest_wlan("g1", false)];

        let (scheduler, sink) = scheduler_with(api);

        let ok = scheduler
            .request_action(&Config::default(), GUEST_PORTAL_IDENT, true)
            .await;
        assert!(ok);

        // enabling maps to disable=false on the controller primitive
        assert_eq!(sink.get_value(GUEST_PORTAL_IDENT).await, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_request_action_inverts_disable_flag() {
        let status = Arc::new(ConnectionState::new());
        let mut api = ScriptedApi::new(status);
        api.wlans = vec![guest_wlan("g1", true)];

        let status2 = api.status.clone();
        let sink = MemorySink::new();
        let api = Arc::new(api);
        let scheduler = SyncScheduler::new(api.clone(), sink.clone(), status2);

        assert!(
            scheduler
                .request_action(&Config::default(), GUEST_PORTAL_IDENT, false)
                .await
        );

        let calls = api.disable_calls.lock().await;
        assert_eq!(calls.as_slice(), &[("g1".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_request_action_without_guest_network() {
        let status = Arc::new(ConnectionState::new());
        let mut api = ScriptedApi::new(status);
        api.wlans = vec![WlanConf {
            id: "main".to_string(),
            name: Some("Main".to_string()),
            enabled: true,
            is_guest: false,
        }];

        let (scheduler, sink) = scheduler_with(api);

        let ok = scheduler
            .request_action(&Config::default(), GUEST_PORTAL_IDENT, true)
            .await;
        assert!(!ok);
        assert_eq!(sink.get_value(GUEST_PORTAL_IDENT).await, None);
    }

    #[tokio::test]
    async fn test_request_action_unknown_identifier() {
        let status = Arc::new(ConnectionState::new());
        let api = ScriptedApi::new(status);
        let (scheduler, sink) = scheduler_with(api);

        let ok = scheduler
            .request_action(&Config::default(), "thermostat", true)
            .await;
        assert!(!ok);
        assert_eq!(sink.variable_count().await, 0);
    }
}
