//! Session — wires the request client, the store and the push channel.
//!
//! Owned by whichever command runs the live console. Nothing here is global:
//! two sessions never share a socket, a retry counter or a state cell.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::client::{Backend, BackendClient};
use crate::config::Config;
use crate::domain::store::Store;
use crate::transport::{push_url, Connector, PushClient, ReconnectPolicy, WsConnector};

pub struct Session<B: Backend = BackendClient, C: Connector = WsConnector> {
    store: Arc<Store<B>>,
    push: PushClient<C>,
}

impl Session {
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = BackendClient::new(&config.backend_url, config.request_timeout())
            .context("building HTTP client")?;
        let push = PushClient::new(
            push_url(&config.backend_url),
            ReconnectPolicy::from(&config.reconnect),
        );
        Ok(Self::new(Store::new(backend), push))
    }
}

impl<B: Backend, C: Connector> Session<B, C> {
    pub fn new(store: Store<B>, push: PushClient<C>) -> Self {
        Self {
            store: Arc::new(store),
            push,
        }
    }

    pub fn store(&self) -> &Arc<Store<B>> {
        &self.store
    }

    pub fn push(&self) -> &PushClient<C> {
        &self.push
    }

    /// Open the push channel and pull the initial snapshot. The two race;
    /// the store's merge rules make either order converge.
    pub async fn start(&self) {
        info!(push_url = %self.push.url(), "starting console session");
        let messages = self.store.clone();
        let connectivity = self.store.clone();
        self.push.start(
            move |message| messages.apply_push_message(message),
            move |connected| connectivity.set_connected(connected),
        );
        self.store.hydrate().await;
    }

    /// Tear down the push channel. The store keeps its last state.
    pub fn shutdown(&self) {
        debug!(state = ?self.push.state(), "stopping push channel");
        self.push.stop();
        info!("console session stopped");
    }
}
