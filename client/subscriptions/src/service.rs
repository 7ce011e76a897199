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

//! The reference-counted subscription lifecycle manager.

use crate::{
	requests::resolve_remote_keys, SnapshotProvider, StorageRepository, SubscriptionError,
	SubscriptionRequest, LOG_TARGET,
};
use futures::{
	channel::oneshot,
	future::{abortable, AbortHandle},
	FutureExt, StreamExt,
};
use parking_lot::Mutex;
use std::{
	collections::{HashMap, HashSet},
	fmt,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};
use sw_rpc_transport::{
	ChainId, StateTransport, StorageSubscription, StorageUpdates, SubscriptionId,
};
use sw_storage_access::{BlockHash, LocalKey, RemoteKey};

/// Identifier under which logically identical subscription requests from
/// different callers are merged.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(pub String);

impl From<&str> for CacheKey {
	fn from(key: &str) -> Self {
		CacheKey(key.to_string())
	}
}

impl fmt::Display for CacheKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Service-assigned identity of one attached subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Outcome of [`RemoteSubscriptionService::attach`].
pub struct Attachment {
	/// Identity to pass to [`RemoteSubscriptionService::detach`].
	pub subscriber_id: SubscriberId,
	/// Resolves when the shared subscription is usable, or with the error
	/// that destroyed the attempt. Detaching before completion drops the
	/// channel instead.
	pub ready: oneshot::Receiver<Result<(), SubscriptionError>>,
}

/// Binds one `(remote, local)` key pair to the persist routine applied on
/// every update of that key.
#[derive(Clone, Debug)]
pub struct ChildSubscription {
	/// Key on the wire.
	pub remote_key: RemoteKey,
	/// Key in the local cache.
	pub local_key: LocalKey,
}

impl ChildSubscription {
	/// Persist one pushed change: a value upserts, its absence deletes.
	///
	/// Repository failures are logged and swallowed; a missing cached value
	/// is always representable downstream.
	pub(crate) async fn process<R: StorageRepository>(
		&self,
		value: Option<&[u8]>,
		block: BlockHash,
		repository: &R,
	) {
		let result = match value {
			Some(bytes) => repository.upsert(&self.local_key, bytes.to_vec()).await,
			None => repository.delete(&self.local_key).await,
		};

		match result {
			Ok(()) => log::trace!(
				target: LOG_TARGET,
				"Persisted update of {} at block {block}",
				self.local_key,
			),
			Err(e) => log::warn!(
				target: LOG_TARGET,
				"Failed to persist update of {}: {e}",
				self.local_key,
			),
		}
	}
}

struct PendingRecord {
	/// Distinguishes this attempt from any later one under the same cache
	/// key, so that a completion of a torn-down attempt cannot promote a
	/// stranger record.
	generation: u64,
	subscribers: HashSet<SubscriberId>,
	waiters: Vec<oneshot::Sender<Result<(), SubscriptionError>>>,
	pipeline: AbortHandle,
}

struct ActiveRecord {
	wire_id: SubscriptionId,
	subscribers: HashSet<SubscriberId>,
	children: Arc<HashMap<RemoteKey, ChildSubscription>>,
	fan_out: AbortHandle,
}

#[derive(Default)]
struct Registrations {
	pending: HashMap<CacheKey, PendingRecord>,
	active: HashMap<CacheKey, ActiveRecord>,
}

/// Deduplicating, reference-counted manager of wire storage subscriptions.
///
/// Per cache key the record moves `absent → pending → active → absent`; at
/// most one record exists at a time, whatever the number of subscribers, and
/// at most one wire subscription is ever open for it. All record state lives
/// behind one mutex; the encode/subscribe pipeline and all wire I/O run
/// outside of it.
pub struct RemoteSubscriptionService<T, P, R> {
	transport: Arc<T>,
	snapshots: Arc<P>,
	repository: Arc<R>,
	registrations: Mutex<Registrations>,
	next_subscriber_id: AtomicU64,
	next_generation: AtomicU64,
}

impl<T, P, R> RemoteSubscriptionService<T, P, R>
where
	T: StateTransport,
	P: SnapshotProvider,
	R: StorageRepository,
{
	/// New service over the injected collaborators.
	pub fn new(transport: Arc<T>, snapshots: Arc<P>, repository: Arc<R>) -> Arc<Self> {
		Arc::new(RemoteSubscriptionService {
			transport,
			snapshots,
			repository,
			registrations: Mutex::new(Registrations::default()),
			next_subscriber_id: AtomicU64::new(0),
			next_generation: AtomicU64::new(0),
		})
	}

	/// Attach a subscriber to the shared subscription identified by
	/// `cache_key`, creating it if this is the first subscriber.
	///
	/// An already active record is joined with no wire I/O; a pending one
	/// queues the subscriber onto the in-flight attempt. Only an absent
	/// record starts the encode/subscribe pipeline.
	pub fn attach(
		self: &Arc<Self>,
		requests: Vec<SubscriptionRequest>,
		chain: ChainId,
		cache_key: CacheKey,
	) -> Attachment {
		let subscriber_id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));
		let (ready_tx, ready_rx) = oneshot::channel();

		let mut registrations = self.registrations.lock();
		if let Some(active) = registrations.active.get_mut(&cache_key) {
			active.subscribers.insert(subscriber_id);
			let _ = ready_tx.send(Ok(()));
			log::trace!(
				target: LOG_TARGET,
				"Subscriber {subscriber_id} joined active subscription {cache_key}",
			);
			return Attachment { subscriber_id, ready: ready_rx };
		}
		if let Some(pending) = registrations.pending.get_mut(&cache_key) {
			pending.subscribers.insert(subscriber_id);
			pending.waiters.push(ready_tx);
			log::trace!(
				target: LOG_TARGET,
				"Subscriber {subscriber_id} queued on pending subscription {cache_key}",
			);
			return Attachment { subscriber_id, ready: ready_rx };
		}

		let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
		let (pipeline, pipeline_handle) = abortable(self.clone().open_pipeline(
			requests,
			chain,
			cache_key.clone(),
			generation,
		));
		registrations.pending.insert(
			cache_key.clone(),
			PendingRecord {
				generation,
				subscribers: HashSet::from([subscriber_id]),
				waiters: vec![ready_tx],
				pipeline: pipeline_handle,
			},
		);
		drop(registrations);

		log::debug!(
			target: LOG_TARGET,
			"Subscriber {subscriber_id} opened pending subscription {cache_key}",
		);
		tokio::spawn(pipeline.map(|_| ()));
		Attachment { subscriber_id, ready: ready_rx }
	}

	/// Detach a subscriber from the record under `cache_key`, tearing the
	/// record down when the last one leaves.
	///
	/// Idempotent: unknown cache keys and subscriber ids are no-ops and
	/// never touch unrelated records.
	pub fn detach(&self, cache_key: &CacheKey, subscriber_id: SubscriberId) {
		let mut closed_active = None;
		{
			let mut registrations = self.registrations.lock();
			if let Some(pending) = registrations.pending.get_mut(cache_key) {
				pending.subscribers.remove(&subscriber_id);
				if pending.subscribers.is_empty() {
					let pending = registrations
						.pending
						.remove(cache_key)
						.expect("record was just looked up under the same lock; qed");
					// Waiters are dropped with the record: detaching callers
					// asked for the teardown themselves.
					pending.pipeline.abort();
					log::debug!(
						target: LOG_TARGET,
						"Cancelled pending subscription {cache_key}",
					);
				}
			} else if let Some(active) = registrations.active.get_mut(cache_key) {
				active.subscribers.remove(&subscriber_id);
				if active.subscribers.is_empty() {
					closed_active = registrations.active.remove(cache_key);
				}
			}
		}

		if let Some(record) = closed_active {
			record.fan_out.abort();
			let wire_id = record.wire_id;
			let transport = self.transport.clone();
			// Fire-and-forget: the detach is complete from the caller's point
			// of view whatever the wire says.
			tokio::spawn(async move {
				if let Err(e) = transport.unsubscribe_storage(wire_id).await {
					log::debug!(target: LOG_TARGET, "Unsubscribe of {wire_id} failed: {e}");
				}
			});
			log::debug!(
				target: LOG_TARGET,
				"Closed subscription {cache_key} (wire id {wire_id})",
			);
		}
	}

	/// Whether any record (pending or active) exists under `cache_key`.
	pub fn contains(&self, cache_key: &CacheKey) -> bool {
		let registrations = self.registrations.lock();
		registrations.pending.contains_key(cache_key) ||
			registrations.active.contains_key(cache_key)
	}

	/// Number of subscribers currently attached under `cache_key`.
	pub fn subscriber_count(&self, cache_key: &CacheKey) -> usize {
		let registrations = self.registrations.lock();
		registrations
			.pending
			.get(cache_key)
			.map(|record| record.subscribers.len())
			.or_else(|| registrations.active.get(cache_key).map(|record| record.subscribers.len()))
			.unwrap_or(0)
	}

	/// Whether the record under `cache_key` is active (wire subscription
	/// open).
	pub fn is_active(&self, cache_key: &CacheKey) -> bool {
		self.registrations.lock().active.contains_key(cache_key)
	}

	/// The full encode/subscribe pipeline of one pending record. Runs
	/// outside the record lock; its outcome is committed under it.
	async fn open_pipeline(
		self: Arc<Self>,
		requests: Vec<SubscriptionRequest>,
		chain: ChainId,
		cache_key: CacheKey,
		generation: u64,
	) {
		match self.encode_and_subscribe(&chain, &requests).await {
			Ok((pairs, subscription)) => self.commit_active(cache_key, generation, pairs, subscription),
			Err(error) => self.fail_pending(&cache_key, generation, error),
		}
	}

	async fn encode_and_subscribe(
		&self,
		chain: &ChainId,
		requests: &[SubscriptionRequest],
	) -> Result<(Vec<(RemoteKey, LocalKey)>, StorageSubscription), SubscriptionError> {
		let snapshot = self.snapshots.snapshot(chain).await?;
		let pairs = resolve_remote_keys(requests, &snapshot)?;
		let keys: Vec<RemoteKey> = pairs.iter().map(|(remote, _)| remote.clone()).collect();
		let subscription = self.transport.subscribe_storage(chain, keys).await?;
		Ok((pairs, subscription))
	}

	/// Commit `pending → active`, unless the pending record was torn down
	/// (or replaced by a younger attempt) while the pipeline ran.
	fn commit_active(
		&self,
		cache_key: CacheKey,
		generation: u64,
		pairs: Vec<(RemoteKey, LocalKey)>,
		subscription: StorageSubscription,
	) {
		let StorageSubscription { id: wire_id, updates } = subscription;
		let children: HashMap<RemoteKey, ChildSubscription> = pairs
			.into_iter()
			.map(|(remote_key, local_key)| {
				(remote_key.clone(), ChildSubscription { remote_key, local_key })
			})
			.collect();
		let children = Arc::new(children);
		let (fan_out, fan_out_handle) =
			abortable(run_fan_out(updates, children.clone(), self.repository.clone()));

		let waiters = {
			let mut registrations = self.registrations.lock();
			let matches = registrations
				.pending
				.get(&cache_key)
				.map(|pending| pending.generation == generation)
				.unwrap_or(false);
			if !matches {
				drop(registrations);
				log::debug!(
					target: LOG_TARGET,
					"Dropping completed pipeline of tombstoned subscription {cache_key}",
				);
				let transport = self.transport.clone();
				tokio::spawn(async move {
					let _ = transport.unsubscribe_storage(wire_id).await;
				});
				return;
			}

			let pending = registrations
				.pending
				.remove(&cache_key)
				.expect("record was just looked up under the same lock; qed");
			registrations.active.insert(
				cache_key.clone(),
				ActiveRecord {
					wire_id,
					subscribers: pending.subscribers,
					children,
					fan_out: fan_out_handle,
				},
			);
			pending.waiters
		};

		tokio::spawn(fan_out.map(|_| ()));
		for waiter in waiters {
			let _ = waiter.send(Ok(()));
		}
		log::debug!(
			target: LOG_TARGET,
			"Subscription {cache_key} is active (wire id {wire_id})",
		);
	}

	/// Destroy a pending record and report `error` to all of its waiters.
	fn fail_pending(&self, cache_key: &CacheKey, generation: u64, error: SubscriptionError) {
		let waiters = {
			let mut registrations = self.registrations.lock();
			let matches = registrations
				.pending
				.get(cache_key)
				.map(|pending| pending.generation == generation)
				.unwrap_or(false);
			if !matches {
				// Torn down or replaced while the pipeline ran; nothing to
				// report to.
				return;
			}
			registrations
				.pending
				.remove(cache_key)
				.expect("record was just looked up under the same lock; qed")
				.waiters
		};

		log::warn!(target: LOG_TARGET, "Subscription {cache_key} failed: {error}");
		for waiter in waiters {
			let _ = waiter.send(Err(error.clone()));
		}
	}
}

/// Distribute updates of one wire subscription to its child subscriptions.
///
/// Children whose key is absent from a change set are left untouched; no
/// change never implies deletion. Transport errors after activation are
/// logged only; teardown is the subscribers' decision.
async fn run_fan_out<R: StorageRepository>(
	mut updates: StorageUpdates,
	children: Arc<HashMap<RemoteKey, ChildSubscription>>,
	repository: Arc<R>,
) {
	while let Some(next) = updates.next().await {
		match next {
			Ok(update) => {
				let writes = update.changes.iter().filter_map(|(key, value)| {
					children
						.get(key)
						.map(|child| child.process(value.as_deref(), update.block, &*repository))
				});
				futures::future::join_all(writes).await;
			},
			Err(error) => {
				log::warn!(
					target: LOG_TARGET,
					"Transport error on active storage subscription: {error}",
				);
			},
		}
	}
	log::debug!(target: LOG_TARGET, "Storage update stream ended");
}
