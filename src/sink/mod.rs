//! Variable sink: the host-side observable store the agent commits into
//!
//! The host platform's variable mechanics are out of scope; the agent only
//! sees this boundary. Upserts are idempotent, keyed by identifier when one is
//! given and by scoped name otherwise, so re-committing an identical snapshot
//! never creates duplicates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::unifi::ConnectionStatus;

/// Instance-level scope for top-level variables
pub const ROOT_SCOPE: &str = "instance";

/// Identifier of the guest-network switch variable
pub const GUEST_PORTAL_IDENT: &str = "guest_portal";

/// Identifier and display name of the presence category
pub const PRESENCE_CATEGORY_IDENT: &str = "presences";
pub const PRESENCE_CATEGORY_NAME: &str = "Presences";

#[async_trait]
pub trait VariableSink: Send + Sync {
    /// Create-or-update a named value under a parent scope
    async fn upsert_value(
        &self,
        parent: &str,
        name: &str,
        value: Value,
        position: u32,
        ident: Option<&str>,
    );

    /// Create-or-update a category, returning its scope handle
    async fn upsert_category(&self, parent: &str, name: &str, ident: &str) -> String;

    async fn get_value(&self, ident: &str) -> Option<Value>;

    async fn set_value(&self, ident: &str, value: Value);

    async fn set_connection_status(&self, status: ConnectionStatus);
}

#[derive(Debug, Clone)]
pub struct StoredVariable {
    pub parent: String,
    pub name: String,
    pub value: Value,
    pub position: u32,
}

/// In-process sink backed by a map, logging every commit
pub struct MemorySink {
    variables: RwLock<HashMap<String, StoredVariable>>,
    categories: RwLock<HashMap<String, String>>,
    status: RwLock<ConnectionStatus>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            variables: RwLock::new(HashMap::new()),
            categories: RwLock::new(HashMap::new()),
            status: RwLock::new(ConnectionStatus::Unknown),
        })
    }

    fn key(parent: &str, name: &str, ident: Option<&str>) -> String {
        match ident {
            Some(ident) => ident.to_string(),
            None => format!("{}/{}", parent, name),
        }
    }

    pub async fn variable_count(&self) -> usize {
        self.variables.read().await.len()
    }

    pub async fn variable(&self, key: &str) -> Option<StoredVariable> {
        self.variables.read().await.get(key).cloned()
    }

    pub async fn status(&self) -> ConnectionStatus {
        *self.status.read().await
    }
}

#[async_trait]
impl VariableSink for MemorySink {
    async fn upsert_value(
        &self,
        parent: &str,
        name: &str,
        value: Value,
        position: u32,
        ident: Option<&str>,
    ) {
        let key = Self::key(parent, name, ident);
        tracing::debug!("[Sink] {} = {} (position {})", key, value, position);

        let mut variables = self.variables.write().await;
        variables.insert(
            key,
            StoredVariable {
                parent: parent.to_string(),
                name: name.to_string(),
                value,
                position,
            },
        );
    }

    async fn upsert_category(&self, parent: &str, name: &str, ident: &str) -> String {
        let handle = format!("{}/{}", parent, ident);
        let mut categories = self.categories.write().await;
        categories
            .entry(ident.to_string())
            .or_insert_with(|| name.to_string());
        handle
    }

    async fn get_value(&self, ident: &str) -> Option<Value> {
        self.variables.read().await.get(ident).map(|v| v.value.clone())
    }

    async fn set_value(&self, ident: &str, value: Value) {
        tracing::debug!("[Sink] {} = {}", ident, value);

        let mut variables = self.variables.write().await;
        match variables.get_mut(ident) {
            Some(stored) => stored.value = value,
            None => {
                variables.insert(
                    ident.to_string(),
                    StoredVariable {
                        parent: ROOT_SCOPE.to_string(),
                        name: ident.to_string(),
                        value,
                        position: 0,
                    },
                );
            }
        }
    }

    async fn set_connection_status(&self, status: ConnectionStatus) {
        let mut current = self.status.write().await;
        if *current != status {
            tracing::info!("[Sink] Connection status: {:?}", status);
        }
        *current = status;
    }
}
