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

//! Shared mocks of the engine's collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{channel::mpsc, StreamExt};
use parking_lot::Mutex;
use std::{
	collections::{HashMap, VecDeque},
	sync::Arc,
	time::Duration,
};
use sw_rpc_transport::{
	ChainId, StateTransport, StorageChangeSet, StorageSubscription, SubscriptionId, TransportError,
};
use sw_state_subscriptions::{SnapshotError, SnapshotProvider};
use sw_storage_access::{
	AccountId32, BlockHash, CodecSnapshot, RemoteKey, StorageEntryModifier, StorageHasher,
	StoragePath,
};
use tokio::sync::watch;

/// Scriptable in-memory transport that records every call.
pub struct MockTransport {
	inner: Mutex<MockInner>,
}

#[derive(Default)]
struct MockInner {
	next_id: u64,
	subscribe_calls: Vec<(ChainId, Vec<RemoteKey>)>,
	subscribe_error: Option<TransportError>,
	senders: HashMap<u64, mpsc::UnboundedSender<Result<StorageChangeSet, TransportError>>>,
	unsubscribed: Vec<SubscriptionId>,
	query_calls: Vec<(Vec<RemoteKey>, Option<BlockHash>)>,
	query_responses: VecDeque<StorageChangeSet>,
}

impl MockTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(MockTransport { inner: Mutex::new(MockInner::default()) })
	}

	/// Make every following subscribe call fail with `error`.
	pub fn fail_subscribes_with(&self, error: TransportError) {
		self.inner.lock().subscribe_error = Some(error);
	}

	/// Script the response of the next query call.
	pub fn push_query_response(&self, response: StorageChangeSet) {
		self.inner.lock().query_responses.push_back(response);
	}

	pub fn subscribe_count(&self) -> usize {
		self.inner.lock().subscribe_calls.len()
	}

	/// Keys passed to the `index`-th subscribe call.
	pub fn subscribed_keys(&self, index: usize) -> Vec<RemoteKey> {
		self.inner.lock().subscribe_calls[index].1.clone()
	}

	pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
		self.inner.lock().unsubscribed.clone()
	}

	/// Key pages and pinned blocks of all recorded query calls.
	pub fn query_calls(&self) -> Vec<(Vec<RemoteKey>, Option<BlockHash>)> {
		self.inner.lock().query_calls.clone()
	}

	/// Push an update into a live subscription. Returns whether a consumer
	/// was still listening.
	pub fn send_update(&self, id: SubscriptionId, update: StorageChangeSet) -> bool {
		self.inner
			.lock()
			.senders
			.get(&id.0)
			.map(|sender| sender.unbounded_send(Ok(update)).is_ok())
			.unwrap_or(false)
	}
}

#[async_trait]
impl StateTransport for MockTransport {
	async fn query_storage_at(
		&self,
		_chain: &ChainId,
		keys: Vec<RemoteKey>,
		at: Option<BlockHash>,
	) -> Result<StorageChangeSet, TransportError> {
		let mut inner = self.inner.lock();
		inner.query_calls.push((keys, at));
		inner
			.query_responses
			.pop_front()
			.ok_or_else(|| TransportError::QueryFailed("no scripted response".into()))
	}

	async fn subscribe_storage(
		&self,
		chain: &ChainId,
		keys: Vec<RemoteKey>,
	) -> Result<StorageSubscription, TransportError> {
		let mut inner = self.inner.lock();
		if let Some(error) = inner.subscribe_error.clone() {
			return Err(error);
		}

		let id = inner.next_id;
		inner.next_id += 1;
		inner.subscribe_calls.push((chain.clone(), keys));

		let (sender, receiver) = mpsc::unbounded();
		inner.senders.insert(id, sender);
		Ok(StorageSubscription { id: SubscriptionId(id), updates: receiver.boxed() })
	}

	async fn unsubscribe_storage(&self, id: SubscriptionId) -> Result<(), TransportError> {
		let mut inner = self.inner.lock();
		inner.unsubscribed.push(id);
		inner.senders.remove(&id.0);
		Ok(())
	}
}

/// Provider serving one fixed snapshot.
pub struct StaticSnapshots {
	snapshot: Arc<CodecSnapshot>,
}

impl StaticSnapshots {
	pub fn new(snapshot: CodecSnapshot) -> Arc<Self> {
		Arc::new(StaticSnapshots { snapshot: Arc::new(snapshot) })
	}
}

#[async_trait]
impl SnapshotProvider for StaticSnapshots {
	async fn snapshot(&self, _chain: &ChainId) -> Result<Arc<CodecSnapshot>, SnapshotError> {
		Ok(self.snapshot.clone())
	}
}

/// Provider that parks every fetch until the gate opens, so tests can hold a
/// pipeline in its pending phase.
pub struct GatedSnapshots {
	snapshot: Arc<CodecSnapshot>,
	gate: watch::Receiver<bool>,
}

impl GatedSnapshots {
	pub fn new(snapshot: CodecSnapshot) -> (Arc<Self>, watch::Sender<bool>) {
		let (sender, receiver) = watch::channel(false);
		(Arc::new(GatedSnapshots { snapshot: Arc::new(snapshot), gate: receiver }), sender)
	}
}

#[async_trait]
impl SnapshotProvider for GatedSnapshots {
	async fn snapshot(&self, chain: &ChainId) -> Result<Arc<CodecSnapshot>, SnapshotError> {
		let mut gate = self.gate.clone();
		gate.wait_for(|open| *open)
			.await
			.map_err(|_| SnapshotError::MetadataUnavailable(chain.to_string()))?;
		Ok(self.snapshot.clone())
	}
}

/// Provider with no metadata at all.
pub struct FailingSnapshots;

#[async_trait]
impl SnapshotProvider for FailingSnapshots {
	async fn snapshot(&self, chain: &ChainId) -> Result<Arc<CodecSnapshot>, SnapshotError> {
		Err(SnapshotError::MetadataUnavailable(chain.to_string()))
	}
}

pub fn test_chain() -> ChainId {
	ChainId::from("testnet")
}

pub fn account(seed: u8) -> AccountId32 {
	AccountId32([seed; 32])
}

pub fn block(seed: u8) -> BlockHash {
	BlockHash([seed; 32])
}

pub fn account_path() -> StoragePath {
	StoragePath::new("System", "Account")
}

/// Schema shared by most tests.
pub fn test_snapshot() -> CodecSnapshot {
	CodecSnapshot::builder(1)
		.plain(StoragePath::new("Timestamp", "Now"), StorageEntryModifier::Default)
		.map(account_path(), StorageEntryModifier::Default, vec![StorageHasher::Blake2_128Concat])
		.map(
			StoragePath::new("Staking", "Bonded"),
			StorageEntryModifier::Optional,
			vec![StorageHasher::Twox64Concat],
		)
		.map(
			StoragePath::new("Staking", "Ledger"),
			StorageEntryModifier::Optional,
			vec![StorageHasher::Blake2_128Concat],
		)
		.build()
}

/// Initialize test logging; repeated calls are ignored.
pub fn init_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll `condition` until it holds or the test deadline passes.
pub async fn wait_until(condition: impl Fn() -> bool) {
	for _ in 0..400 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("condition not reached within the test deadline");
}
