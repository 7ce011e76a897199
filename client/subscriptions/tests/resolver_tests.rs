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

//! Cross-reference resolution scenarios of the staking link resolver.

mod common;

use codec::Encode;
use common::*;
use std::sync::Arc;
use sw_rpc_transport::{StorageChangeSet, SubscriptionId};
use sw_state_subscriptions::{
	derived::{
		bonded_local_key, bonded_path, controller_local_key, ledger_path, link_local_key,
		LinkUpdate, StakingLedger, StakingLinkResolver,
	},
	InMemoryRepository,
};
use sw_storage_access::{AccountId32, KeyEncoder, RemoteKey};

fn bonded_key(account: &AccountId32) -> RemoteKey {
	let snapshot = test_snapshot();
	KeyEncoder::new(&snapshot).map_key(&bonded_path(), &account.encode()).unwrap()
}

fn ledger_key(account: &AccountId32) -> RemoteKey {
	let snapshot = test_snapshot();
	KeyEncoder::new(&snapshot).map_key(&ledger_path(), &account.encode()).unwrap()
}

fn change_set(block_seed: u8, changes: Vec<(RemoteKey, Option<Vec<u8>>)>) -> StorageChangeSet {
	StorageChangeSet { block: block(block_seed), changes }
}

struct Setup {
	transport: Arc<MockTransport>,
	repository: Arc<InMemoryRepository>,
	resolver: Arc<StakingLinkResolver<MockTransport, StaticSnapshots, InMemoryRepository>>,
}

async fn started_resolver(account_seed: u8) -> Setup {
	let transport = MockTransport::new();
	let repository = Arc::new(InMemoryRepository::new());
	let resolver = StakingLinkResolver::new(
		transport.clone(),
		StaticSnapshots::new(test_snapshot()),
		repository.clone(),
		test_chain(),
		account(account_seed),
	);
	resolver.start().await.unwrap();
	Setup { transport, repository, resolver }
}

#[tokio::test]
async fn start_opens_one_combined_primary_subscription() {
	let setup = started_resolver(1).await;

	assert_eq!(setup.transport.subscribe_count(), 1);
	assert_eq!(
		setup.transport.subscribed_keys(0),
		vec![bonded_key(&account(1)), ledger_key(&account(1))],
	);

	// A second start is a no-op.
	setup.resolver.start().await.unwrap();
	assert_eq!(setup.transport.subscribe_count(), 1);
}

#[tokio::test]
async fn bonded_pointer_resolves_and_opens_the_ledger_watch() {
	init_logger();
	let setup = started_resolver(1).await;
	let stash = account(1);
	let controller = account(2);
	let mut events = setup.resolver.link_events();

	setup.transport.send_update(
		SubscriptionId(0),
		change_set(1, vec![(bonded_key(&stash), Some(controller.encode()))]),
	);

	let link_row = link_local_key(&test_chain(), &stash);
	wait_until(|| setup.repository.entries().contains_key(&link_row)).await;

	let entries = setup.repository.entries();
	assert_eq!(entries.get(&link_row), Some(&controller.encode()));
	assert_eq!(
		entries.get(&controller_local_key(&test_chain(), &controller)),
		Some(&stash.encode()),
	);
	// The raw bonded value was persisted like any child subscription would.
	assert_eq!(
		entries.get(&bonded_local_key(&test_chain(), &stash)),
		Some(&controller.encode()),
	);

	// A secondary watch on the controller's ledger was opened.
	wait_until(|| setup.transport.subscribe_count() == 2).await;
	assert_eq!(setup.transport.subscribed_keys(1), vec![ledger_key(&controller)]);

	assert_eq!(setup.resolver.current_link(), Some((stash, controller)));
	assert_eq!(events.try_next().unwrap(), Some(LinkUpdate { stash, controller }));
}

#[tokio::test]
async fn changed_pointer_replaces_the_association_and_the_ledger_watch() {
	let setup = started_resolver(1).await;
	let stash = account(1);
	let first_controller = account(2);
	let second_controller = account(3);

	setup.transport.send_update(
		SubscriptionId(0),
		change_set(1, vec![(bonded_key(&stash), Some(first_controller.encode()))]),
	);
	wait_until(|| setup.transport.subscribe_count() == 2).await;

	// The controller changes between updates.
	setup.transport.send_update(
		SubscriptionId(0),
		change_set(2, vec![(bonded_key(&stash), Some(second_controller.encode()))]),
	);

	let link_row = link_local_key(&test_chain(), &stash);
	wait_until(|| {
		setup.repository.entries().get(&link_row) == Some(&second_controller.encode())
	})
	.await;

	// The stale association is gone, the new one is in place; at no point do
	// both reverse rows coexist.
	let entries = setup.repository.entries();
	assert_eq!(
		entries.get(&controller_local_key(&test_chain(), &second_controller)),
		Some(&stash.encode()),
	);
	assert!(entries.get(&controller_local_key(&test_chain(), &first_controller)).is_none());

	// The stale ledger watch was torn down before the replacement opened.
	wait_until(|| setup.transport.subscribe_count() == 3).await;
	assert_eq!(setup.transport.unsubscribed(), vec![SubscriptionId(1)]);
	assert_eq!(setup.transport.subscribed_keys(2), vec![ledger_key(&second_controller)]);
	assert_eq!(setup.resolver.current_link(), Some((stash, second_controller)));
}

#[tokio::test]
async fn ledger_back_reference_resolves_without_a_secondary_watch() {
	// Account 4 is a controller; its ledger carries the stash back-reference.
	let setup = started_resolver(4).await;
	let controller = account(4);
	let stash = account(5);

	setup.transport.send_update(
		SubscriptionId(0),
		change_set(1, vec![(
			ledger_key(&controller),
			Some(StakingLedger { stash }.encode()),
		)]),
	);

	let link_row = link_local_key(&test_chain(), &stash);
	wait_until(|| setup.repository.entries().contains_key(&link_row)).await;
	assert_eq!(setup.repository.entries().get(&link_row), Some(&controller.encode()));
	assert_eq!(setup.resolver.current_link(), Some((stash, controller)));

	// The primary set already watches this account's ledger; no secondary is
	// opened.
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;
	assert_eq!(setup.transport.subscribe_count(), 1);
}

#[tokio::test]
async fn direct_pointer_takes_precedence_over_the_back_reference() {
	let setup = started_resolver(1).await;
	let stash = account(1);
	let controller = account(2);
	let unrelated_stash = account(9);

	// One change set carrying both entries: the direct pointer wins.
	setup.transport.send_update(
		SubscriptionId(0),
		change_set(1, vec![
			(ledger_key(&stash), Some(StakingLedger { stash: unrelated_stash }.encode())),
			(bonded_key(&stash), Some(controller.encode())),
		]),
	);

	let link_row = link_local_key(&test_chain(), &stash);
	wait_until(|| setup.repository.entries().contains_key(&link_row)).await;
	assert_eq!(setup.repository.entries().get(&link_row), Some(&controller.encode()));
	assert!(setup
		.repository
		.entries()
		.get(&link_local_key(&test_chain(), &unrelated_stash))
		.is_none());
}

#[tokio::test]
async fn absent_cross_reference_writes_nothing() {
	let setup = started_resolver(1).await;
	let stash = account(1);
	let mut events = setup.resolver.link_events();

	// A cleared pointer is no evidence of a new link; nothing is created or
	// deleted.
	setup.transport.send_update(
		SubscriptionId(0),
		change_set(1, vec![(bonded_key(&stash), None)]),
	);

	// Give the driver time to process, then check nothing was derived.
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;
	let entries = setup.repository.entries();
	assert!(entries.get(&link_local_key(&test_chain(), &stash)).is_none());
	assert_eq!(setup.resolver.current_link(), None);
	assert!(events.try_next().is_err(), "no link event was emitted");
	assert_eq!(setup.transport.subscribe_count(), 1);
}

#[tokio::test]
async fn stop_closes_both_wire_subscriptions() {
	let setup = started_resolver(1).await;
	let stash = account(1);
	let controller = account(2);

	setup.transport.send_update(
		SubscriptionId(0),
		change_set(1, vec![(bonded_key(&stash), Some(controller.encode()))]),
	);
	wait_until(|| setup.transport.subscribe_count() == 2).await;

	setup.resolver.stop().await;
	let unsubscribed = setup.transport.unsubscribed();
	assert!(unsubscribed.contains(&SubscriptionId(0)));
	assert!(unsubscribed.contains(&SubscriptionId(1)));
}
