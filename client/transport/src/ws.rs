// This file is part of Substrate State Watch.

// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: GPL-3.0-or-later WITH Classpath-exception-2.0

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! jsonrpsee-backed transport implementation.

use crate::{
	types::RawStorageChangeSet, ChainId, StateTransport, StorageChangeSet, StorageSubscription,
	SubscriptionId, TransportError,
};
use async_trait::async_trait;
use futures::{
	channel::{mpsc, oneshot},
	FutureExt, SinkExt, StreamExt,
};
use jsonrpsee::{
	core::client::{ClientT, Subscription, SubscriptionClientT},
	rpc_params,
	ws_client::{WsClient, WsClientBuilder},
};
use parking_lot::{Mutex, RwLock};
use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};
use sw_storage_access::{BlockHash, RemoteKey};

const LOG_TARGET: &str = "rpc-transport";

/// Default timeout for one-shot RPC requests.
const RPC_TIMEOUT: Duration = Duration::from_secs(60);

/// Buffered updates per subscription before backpressure reaches the node
/// connection.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

type ShutdownRegistry = Arc<Mutex<HashMap<SubscriptionId, oneshot::Sender<()>>>>;

/// [`StateTransport`] over jsonrpsee WebSocket clients.
///
/// Connections are registered explicitly per chain and owned by this instance;
/// there is no process-wide default. Each live subscription is driven by a
/// forwarding task that translates wire notifications into
/// [`StorageChangeSet`]s and listens for the shutdown signal issued by
/// [`StateTransport::unsubscribe_storage`].
pub struct WsTransport {
	clients: RwLock<HashMap<ChainId, Arc<WsClient>>>,
	subscriptions: ShutdownRegistry,
	next_subscription_id: AtomicU64,
}

impl Default for WsTransport {
	fn default() -> Self {
		Self::new()
	}
}

impl WsTransport {
	/// New transport with no connections.
	pub fn new() -> Self {
		WsTransport {
			clients: RwLock::new(HashMap::new()),
			subscriptions: Arc::new(Mutex::new(HashMap::new())),
			next_subscription_id: AtomicU64::new(0),
		}
	}

	/// Open a WebSocket connection for `chain`, replacing any previous one.
	///
	/// Subscriptions opened over a replaced connection keep running until
	/// their streams end.
	pub async fn connect(&self, chain: ChainId, uri: &str) -> Result<(), TransportError> {
		log::debug!(target: LOG_TARGET, "Connecting to {uri} for chain {chain}");
		let client = WsClientBuilder::default()
			.request_timeout(RPC_TIMEOUT)
			.build(uri)
			.await
			.map_err(|e| TransportError::ConnectionUnavailable(format!("{chain}: {e}")))?;
		self.clients.write().insert(chain, Arc::new(client));
		Ok(())
	}

	/// Drop the connection of `chain`. Streams of subscriptions opened over
	/// it will end on their own.
	pub fn disconnect(&self, chain: &ChainId) {
		self.clients.write().remove(chain);
	}

	fn client(&self, chain: &ChainId) -> Result<Arc<WsClient>, TransportError> {
		self.clients
			.read()
			.get(chain)
			.cloned()
			.ok_or_else(|| TransportError::ConnectionUnavailable(chain.to_string()))
	}
}

#[async_trait]
impl StateTransport for WsTransport {
	async fn query_storage_at(
		&self,
		chain: &ChainId,
		keys: Vec<RemoteKey>,
		at: Option<BlockHash>,
	) -> Result<StorageChangeSet, TransportError> {
		let client = self.client(chain)?;
		let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
		let at = at.map(|hash| hash.to_string());

		let mut change_sets: Vec<RawStorageChangeSet> = client
			.request("state_queryStorageAt", rpc_params![keys, at])
			.await
			.map_err(|e| TransportError::QueryFailed(e.to_string()))?;

		// `state_queryStorageAt` reports a single change set for the queried
		// block.
		let raw = change_sets.pop().ok_or_else(|| {
			TransportError::BadResponse("empty state_queryStorageAt response".into())
		})?;
		raw.try_into()
	}

	async fn subscribe_storage(
		&self,
		chain: &ChainId,
		keys: Vec<RemoteKey>,
	) -> Result<StorageSubscription, TransportError> {
		let client = self.client(chain)?;
		let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();

		let inner: Subscription<RawStorageChangeSet> = client
			.subscribe("state_subscribeStorage", rpc_params![keys], "state_unsubscribeStorage")
			.await
			.map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

		let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
		self.subscriptions.lock().insert(id, shutdown_tx);

		log::debug!(target: LOG_TARGET, "Opened storage subscription {id} on chain {chain}");
		tokio::spawn(forward_updates(id, inner, update_tx, shutdown_rx, self.subscriptions.clone()));

		Ok(StorageSubscription { id, updates: update_rx.boxed() })
	}

	async fn unsubscribe_storage(&self, id: SubscriptionId) -> Result<(), TransportError> {
		match self.subscriptions.lock().remove(&id) {
			Some(shutdown) => {
				// A send failure means the forwarding task is already gone,
				// which is as unsubscribed as it gets.
				let _ = shutdown.send(());
				Ok(())
			},
			None => {
				log::trace!(target: LOG_TARGET, "Unsubscribe of unknown subscription {id}");
				Ok(())
			},
		}
	}
}

/// Pump wire notifications into the update channel until the subscription
/// ends, the receiver is dropped or a shutdown is signalled.
async fn forward_updates(
	id: SubscriptionId,
	mut inner: Subscription<RawStorageChangeSet>,
	mut updates: mpsc::Sender<Result<StorageChangeSet, TransportError>>,
	shutdown: oneshot::Receiver<()>,
	registry: ShutdownRegistry,
) {
	let mut shutdown = shutdown.fuse();
	let mut explicit_unsubscribe = false;
	loop {
		let notification = futures::select! {
			// The registry entry was removed by `unsubscribe_storage`.
			_ = shutdown => {
				explicit_unsubscribe = true;
				break;
			},
			notification = inner.next().fuse() => notification,
		};

		let outcome = match notification {
			Some(Ok(raw)) => StorageChangeSet::try_from(raw),
			Some(Err(e)) => Err(TransportError::BadResponse(e.to_string())),
			// Subscription closed on the node side.
			None => break,
		};
		if updates.send(outcome).await.is_err() {
			// Receiver gone; dropping `inner` issues the wire unsubscribe.
			break;
		}
	}

	if explicit_unsubscribe {
		if let Err(e) = inner.unsubscribe().await {
			log::debug!(target: LOG_TARGET, "Wire unsubscribe of {id} failed: {e}");
		}
	}

	registry.lock().remove(&id);
	log::trace!(target: LOG_TARGET, "Storage subscription {id} stream ended");
}
