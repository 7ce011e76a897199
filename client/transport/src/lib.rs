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

//! The bidirectional request/subscribe channel to remote nodes.
//!
//! [`StateTransport`] is the seam the subscription engine talks through: a
//! one-shot storage query, a storage subscription producing a stream of
//! [`StorageChangeSet`]s and an explicit unsubscribe. [`WsTransport`] is the
//! production implementation over jsonrpsee WebSocket clients, holding one
//! connection per chain in an instance-owned registry.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

use sw_storage_access::{BlockHash, RemoteKey};

mod error;
mod types;
mod ws;

pub use error::TransportError;
pub use types::{RawStorageChangeSet, StorageChangeSet};
pub use ws::WsTransport;

/// Identifier of a chain a connection is held for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub String);

impl From<&str> for ChainId {
	fn from(id: &str) -> Self {
		ChainId(id.to_string())
	}
}

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Transport-assigned identifier of one live wire subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Stream of updates delivered for one wire subscription, in the order the
/// transport emits them.
pub type StorageUpdates = BoxStream<'static, Result<StorageChangeSet, TransportError>>;

/// One open wire subscription.
pub struct StorageSubscription {
	/// Identifier to pass to [`StateTransport::unsubscribe_storage`].
	pub id: SubscriptionId,
	/// Update stream. An exhausted stream means the transport dropped the
	/// subscription; it is the caller's decision whether to resubscribe.
	pub updates: StorageUpdates,
}

impl fmt::Debug for StorageSubscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StorageSubscription").field("id", &self.id).finish()
	}
}

/// The request/subscribe channel to a set of remote nodes, keyed by chain.
#[async_trait]
pub trait StateTransport: Send + Sync + 'static {
	/// Query the values of the given keys in one round-trip, optionally
	/// pinned to a block.
	async fn query_storage_at(
		&self,
		chain: &ChainId,
		keys: Vec<RemoteKey>,
		at: Option<BlockHash>,
	) -> Result<StorageChangeSet, TransportError>;

	/// Open one wire subscription over the given key set.
	async fn subscribe_storage(
		&self,
		chain: &ChainId,
		keys: Vec<RemoteKey>,
	) -> Result<StorageSubscription, TransportError>;

	/// Close a wire subscription. Unknown identifiers are ignored.
	async fn unsubscribe_storage(&self, id: SubscriptionId) -> Result<(), TransportError>;
}
