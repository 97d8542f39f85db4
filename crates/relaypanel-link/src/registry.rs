//! Registry of agent links, one per endpoint

use async_trait::async_trait;
use relaypanel_proto::AgentCommand;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::endpoint::AgentEndpoint;
use crate::error::LinkResult;
use crate::link::AgentLink;

/// Sends commands to agents.
///
/// Everything that drives agents depends on this trait rather than on the
/// registry, so enforcement and sync logic can be exercised without sockets.
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    async fn dispatch(&self, endpoint: &AgentEndpoint, command: AgentCommand)
        -> LinkResult<Value>;

    /// Make sure the agent's control channel is up
    async fn probe(&self, endpoint: &AgentEndpoint) -> LinkResult<()>;
}

/// Process-wide set of agent links, keyed by endpoint identity.
///
/// Links are created on first use and live until [`LinkRegistry::close_all`].
#[derive(Clone)]
pub struct LinkRegistry {
    links: Arc<Mutex<HashMap<AgentEndpoint, AgentLink>>>,
    config: LinkConfig,
}

impl LinkRegistry {
    pub fn new(config: LinkConfig) -> Self {
        info!(
            call_timeout = ?config.call_timeout,
            reconnect_backoff = ?config.reconnect_backoff,
            "Creating agent link registry"
        );
        Self {
            links: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Get the link for an endpoint, creating it unconnected if needed.
    ///
    /// Links for the same node under an older address or credentials are
    /// evicted and closed.
    pub async fn link(&self, endpoint: &AgentEndpoint) -> AgentLink {
        let (link, stale) = {
            let mut links = self.links.lock().unwrap_or_else(PoisonError::into_inner);

            if let Some(link) = links.get(endpoint) {
                return link.clone();
            }

            let stale_keys: Vec<AgentEndpoint> = links
                .keys()
                .filter(|key| key.node_id == endpoint.node_id)
                .cloned()
                .collect();
            let stale: Vec<AgentLink> = stale_keys
                .iter()
                .filter_map(|key| links.remove(key))
                .collect();

            let link = AgentLink::new(endpoint.clone(), self.config.clone());
            links.insert(endpoint.clone(), link.clone());
            debug!(url = %link.url(), node_id = endpoint.node_id, "created agent link");
            (link, stale)
        };

        for old in stale {
            info!(url = %old.url(), node_id = endpoint.node_id, "replacing stale agent link");
            old.close().await;
        }

        link
    }

    /// Get the link for an endpoint and make sure it is connected
    pub async fn connected(&self, endpoint: &AgentEndpoint) -> LinkResult<AgentLink> {
        let link = self.link(endpoint).await;
        link.connect().await?;
        Ok(link)
    }

    pub fn get(&self, endpoint: &AgentEndpoint) -> Option<AgentLink> {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Close and forget every link (process shutdown)
    pub async fn close_all(&self) {
        let links: Vec<AgentLink> = self
            .links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, link)| link)
            .collect();

        for link in &links {
            link.close().await;
        }
        info!(closed = links.len(), "closed all agent links");
    }
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new(LinkConfig::default())
    }
}

#[async_trait]
impl AgentDispatcher for LinkRegistry {
    async fn dispatch(
        &self,
        endpoint: &AgentEndpoint,
        command: AgentCommand,
    ) -> LinkResult<Value> {
        self.connected(endpoint).await?.call(command).await
    }

    async fn probe(&self, endpoint: &AgentEndpoint) -> LinkResult<()> {
        self.connected(endpoint).await.map(|_| ())
    }
}
