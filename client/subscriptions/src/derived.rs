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

//! Derived account subscriptions.
//!
//! The staking pallet links accounts in both directions: `Bonded` maps a
//! stash to its controller, `Ledger` maps a controller to a ledger carrying
//! the stash back-reference. [`StakingLinkResolver`] watches both entries of
//! one account, decodes whichever side changes, keeps the persisted
//! stash↔controller association in step and maintains a secondary watch on
//! the resolved controller's ledger. Observers learn about link changes
//! through [`StakingLinkResolver::link_events`] and are themselves
//! responsible for any follow-on subscriptions, which keeps the dependency
//! direction acyclic.

use crate::{
	service::ChildSubscription, SnapshotProvider, StorageRepository, SubscriptionError, LOG_TARGET,
};
use codec::{Decode, Encode};
use futures::{
	channel::mpsc,
	future::{abortable, AbortHandle},
	FutureExt, StreamExt,
};
use parking_lot::Mutex;
use std::sync::Arc;
use sw_rpc_transport::{
	ChainId, StateTransport, StorageChangeSet, StorageSubscription, StorageUpdates, SubscriptionId,
};
use sw_storage_access::{AccountId32, KeyEncoder, LocalKey, RemoteKey, StoragePath};

/// `Staking::Bonded`: stash → controller pointer.
pub fn bonded_path() -> StoragePath {
	StoragePath::new("Staking", "Bonded")
}

/// `Staking::Ledger`: controller → staking ledger.
pub fn ledger_path() -> StoragePath {
	StoragePath::new("Staking", "Ledger")
}

/// Leading fields of the on-chain staking ledger. Only the stash
/// back-reference is decoded here; trailing ledger fields are left in the
/// raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct StakingLedger {
	/// The stash this ledger belongs to.
	pub stash: AccountId32,
}

/// A change of the resolved stash↔controller association.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkUpdate {
	/// The stash side of the link.
	pub stash: AccountId32,
	/// The controller side of the link.
	pub controller: AccountId32,
}

/// Cache key of the raw `Bonded` value of `account`.
pub fn bonded_local_key(chain: &ChainId, account: &AccountId32) -> LocalKey {
	LocalKey(format!("{chain}:staking:bonded:{account}"))
}

/// Cache key of the raw `Ledger` value of `account`.
pub fn ledger_local_key(chain: &ChainId, account: &AccountId32) -> LocalKey {
	LocalKey(format!("{chain}:staking:ledger:{account}"))
}

/// Cache key of the stash → controller association row.
pub fn link_local_key(chain: &ChainId, stash: &AccountId32) -> LocalKey {
	LocalKey(format!("{chain}:staking:link:{stash}"))
}

/// Cache key of the controller → stash association row.
pub fn controller_local_key(chain: &ChainId, controller: &AccountId32) -> LocalKey {
	LocalKey(format!("{chain}:staking:controller:{controller}"))
}

struct SecondaryWatch {
	controller: AccountId32,
	wire_id: SubscriptionId,
	driver: AbortHandle,
}

#[derive(Default)]
struct ResolverState {
	primary: Option<SubscriptionId>,
	driver: Option<AbortHandle>,
	secondary: Option<SecondaryWatch>,
	link: Option<(AccountId32, AccountId32)>,
}

/// Watches one account's staking entries and keeps the derived
/// stash↔controller association and the dependent ledger watch current.
pub struct StakingLinkResolver<T, P, R> {
	transport: Arc<T>,
	snapshots: Arc<P>,
	repository: Arc<R>,
	chain: ChainId,
	account: AccountId32,
	state: Mutex<ResolverState>,
	sinks: Mutex<Vec<mpsc::UnboundedSender<LinkUpdate>>>,
}

impl<T, P, R> StakingLinkResolver<T, P, R>
where
	T: StateTransport,
	P: SnapshotProvider,
	R: StorageRepository,
{
	/// New resolver for `account` on `chain`. Call
	/// [`StakingLinkResolver::start`] to open the primary subscription.
	pub fn new(
		transport: Arc<T>,
		snapshots: Arc<P>,
		repository: Arc<R>,
		chain: ChainId,
		account: AccountId32,
	) -> Arc<Self> {
		Arc::new(StakingLinkResolver {
			transport,
			snapshots,
			repository,
			chain,
			account,
			state: Mutex::new(ResolverState::default()),
			sinks: Mutex::new(Vec::new()),
		})
	}

	/// Stream of association changes. Closed sinks are pruned on the next
	/// notification.
	pub fn link_events(&self) -> mpsc::UnboundedReceiver<LinkUpdate> {
		let (sink, events) = mpsc::unbounded();
		self.sinks.lock().push(sink);
		events
	}

	/// Currently resolved `(stash, controller)` pair, if any update yielded
	/// one yet.
	pub fn current_link(&self) -> Option<(AccountId32, AccountId32)> {
		self.state.lock().link
	}

	/// Encode both primary keys as one pipeline and open the combined wire
	/// subscription. A second call on a running resolver is a no-op.
	pub async fn start(self: &Arc<Self>) -> Result<(), SubscriptionError> {
		if self.state.lock().primary.is_some() {
			return Ok(());
		}

		let snapshot = self.snapshots.snapshot(&self.chain).await?;
		let encoder = KeyEncoder::new(&snapshot);
		let account = self.account.encode();
		// Both keys must encode before anything is opened; one failure fails
		// the whole start.
		let bonded_key = encoder.map_key(&bonded_path(), &account)?;
		let ledger_key = encoder.map_key(&ledger_path(), &account)?;

		let subscription = self
			.transport
			.subscribe_storage(&self.chain, vec![bonded_key.clone(), ledger_key.clone()])
			.await?;
		let StorageSubscription { id: wire_id, updates } = subscription;

		let (driver, driver_handle) =
			abortable(self.clone().run(updates, bonded_key, ledger_key));
		{
			let mut state = self.state.lock();
			state.primary = Some(wire_id);
			state.driver = Some(driver_handle);
		}
		tokio::spawn(driver.map(|_| ()));

		log::debug!(
			target: LOG_TARGET,
			"Watching staking entries of {} on {} (wire id {wire_id})",
			self.account,
			self.chain,
		);
		Ok(())
	}

	/// Abort the update loops and close both wire subscriptions.
	pub async fn stop(&self) {
		let (primary, driver, secondary) = {
			let mut state = self.state.lock();
			(state.primary.take(), state.driver.take(), state.secondary.take())
		};

		if let Some(driver) = driver {
			driver.abort();
		}
		if let Some(watch) = secondary {
			watch.driver.abort();
			let _ = self.transport.unsubscribe_storage(watch.wire_id).await;
		}
		if let Some(wire_id) = primary {
			let _ = self.transport.unsubscribe_storage(wire_id).await;
		}
	}

	async fn run(
		self: Arc<Self>,
		mut updates: StorageUpdates,
		bonded_key: RemoteKey,
		ledger_key: RemoteKey,
	) {
		while let Some(next) = updates.next().await {
			match next {
				Ok(update) => self.process_update(update, &bonded_key, &ledger_key).await,
				Err(error) => {
					log::warn!(
						target: LOG_TARGET,
						"Transport error on staking watch of {}: {error}",
						self.account,
					);
				},
			}
		}
		log::debug!(target: LOG_TARGET, "Staking watch of {} ended", self.account);
	}

	async fn process_update(
		&self,
		update: StorageChangeSet,
		bonded_key: &RemoteKey,
		ledger_key: &RemoteKey,
	) {
		let mut bonded_change: Option<Option<Vec<u8>>> = None;
		let mut ledger_change: Option<Option<Vec<u8>>> = None;
		for (key, value) in &update.changes {
			if key == bonded_key {
				bonded_change = Some(value.clone());
			} else if key == ledger_key {
				ledger_change = Some(value.clone());
			}
		}

		// Persist the raw primary values the same way service children do.
		if let Some(value) = &bonded_change {
			let child = ChildSubscription {
				remote_key: bonded_key.clone(),
				local_key: bonded_local_key(&self.chain, &self.account),
			};
			child.process(value.as_deref(), update.block, &*self.repository).await;
		}
		if let Some(value) = &ledger_change {
			let child = ChildSubscription {
				remote_key: ledger_key.clone(),
				local_key: ledger_local_key(&self.chain, &self.account),
			};
			child.process(value.as_deref(), update.block, &*self.repository).await;
		}

		// Decode only the entries that actually changed.
		let bonded_controller = self.decode_changed::<AccountId32>(&bonded_change, "Bonded");
		let ledger_stash =
			self.decode_changed::<StakingLedger>(&ledger_change, "Ledger").map(|l| l.stash);

		// The direct pointer takes precedence over the ledger back-reference.
		let derived = if let Some(controller) = bonded_controller {
			Some((self.account, controller))
		} else {
			ledger_stash.map(|stash| (stash, self.account))
		};

		match derived {
			Some((stash, controller)) => self.apply_link(stash, controller).await,
			// No cross-reference in either direction: absence of evidence is
			// not deletion evidence, so nothing is written or removed.
			None => {},
		}
	}

	fn decode_changed<V: Decode>(&self, change: &Option<Option<Vec<u8>>>, entry: &str) -> Option<V> {
		let bytes = change.as_ref().and_then(|value| value.as_deref())?;
		match V::decode(&mut &bytes[..]) {
			Ok(value) => Some(value),
			Err(e) => {
				log::warn!(
					target: LOG_TARGET,
					"Undecodable {entry} value for {}: {e}",
					self.account,
				);
				None
			},
		}
	}

	/// Persist the association if it changed, drop the stale one, realign
	/// the secondary watch and notify observers.
	async fn apply_link(&self, stash: AccountId32, controller: AccountId32) {
		let forward_key = link_local_key(&self.chain, &stash);
		let cached = match self.repository.get(&forward_key).await {
			Ok(Some(bytes)) => AccountId32::decode(&mut &bytes[..]).ok(),
			Ok(None) => None,
			Err(e) => {
				log::warn!(target: LOG_TARGET, "Reading cached link of {stash} failed: {e}");
				None
			},
		};

		if cached != Some(controller) {
			// The stale reverse row goes first so that old and new
			// association never coexist in the repository.
			if let Some(stale) = cached {
				if let Err(e) =
					self.repository.delete(&controller_local_key(&self.chain, &stale)).await
				{
					log::warn!(target: LOG_TARGET, "Removing stale link row failed: {e}");
				}
			}
			if let Err(e) = self.repository.upsert(&forward_key, controller.encode()).await {
				log::warn!(target: LOG_TARGET, "Persisting link of {stash} failed: {e}");
			}
			if let Err(e) = self
				.repository
				.upsert(&controller_local_key(&self.chain, &controller), stash.encode())
				.await
			{
				log::warn!(target: LOG_TARGET, "Persisting link row of {controller} failed: {e}");
			}

			log::debug!(target: LOG_TARGET, "Resolved staking link {stash} -> {controller}");
			self.notify(LinkUpdate { stash, controller });
		}

		self.ensure_secondary(controller).await;
		self.state.lock().link = Some((stash, controller));
	}

	/// Keep the secondary ledger watch pointed at `controller`, replacing a
	/// stale one. The stale subscription is torn down before the replacement
	/// opens.
	async fn ensure_secondary(&self, controller: AccountId32) {
		if controller == self.account {
			// The primary key set already covers this account's ledger.
			let stale = self.state.lock().secondary.take();
			if let Some(stale) = stale {
				stale.driver.abort();
				let _ = self.transport.unsubscribe_storage(stale.wire_id).await;
			}
			return;
		}

		let up_to_date = self
			.state
			.lock()
			.secondary
			.as_ref()
			.map(|watch| watch.controller == controller)
			.unwrap_or(false);
		if up_to_date {
			return;
		}

		let stale = self.state.lock().secondary.take();
		if let Some(stale) = stale {
			stale.driver.abort();
			if let Err(e) = self.transport.unsubscribe_storage(stale.wire_id).await {
				log::debug!(target: LOG_TARGET, "Unsubscribe of stale ledger watch failed: {e}");
			}
		}

		match self.open_secondary(controller).await {
			Ok(watch) => self.state.lock().secondary = Some(watch),
			// The association stands; observers decide whether to retry.
			Err(e) => log::warn!(
				target: LOG_TARGET,
				"Opening ledger watch of {controller} failed: {e}",
			),
		}
	}

	async fn open_secondary(
		&self,
		controller: AccountId32,
	) -> Result<SecondaryWatch, SubscriptionError> {
		let snapshot = self.snapshots.snapshot(&self.chain).await?;
		let key = KeyEncoder::new(&snapshot).map_key(&ledger_path(), &controller.encode())?;
		let subscription = self.transport.subscribe_storage(&self.chain, vec![key.clone()]).await?;
		let StorageSubscription { id: wire_id, mut updates } = subscription;

		let child = ChildSubscription {
			remote_key: key,
			local_key: ledger_local_key(&self.chain, &controller),
		};
		let repository = self.repository.clone();
		let (task, driver) = abortable(async move {
			while let Some(next) = updates.next().await {
				match next {
					Ok(update) => {
						for (key, value) in &update.changes {
							if key == &child.remote_key {
								child.process(value.as_deref(), update.block, &*repository).await;
							}
						}
					},
					Err(error) => {
						log::warn!(target: LOG_TARGET, "Transport error on ledger watch: {error}");
					},
				}
			}
		});
		tokio::spawn(task.map(|_| ()));

		log::debug!(
			target: LOG_TARGET,
			"Watching ledger of {controller} (wire id {wire_id})",
		);
		Ok(SecondaryWatch { controller, wire_id, driver })
	}

	fn notify(&self, update: LinkUpdate) {
		self.sinks.lock().retain(|sink| sink.unbounded_send(update).is_ok());
	}
}
