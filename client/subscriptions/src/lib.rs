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

//! The chain-state subscription engine.
//!
//! Consumers describe the storage entries they care about as
//! [`SubscriptionRequest`]s and hand them to the
//! [`RemoteSubscriptionService`], which deduplicates overlapping consumers by
//! cache key, materializes binary keys from the chain's codec snapshot, opens
//! exactly one wire subscription per unique key set and fans node
//! notifications back out to per-key child subscriptions that persist values
//! through the injected [`StorageRepository`].
//!
//! One-shot reads go through the [`StorageRequestFactory`], which batches and
//! re-associates paginated storage queries. The
//! [`derived::StakingLinkResolver`] builds the dependent-subscription pattern
//! on top: watch an account, decode the account it points at, watch that one
//! too.

pub mod derived;
mod error;
mod query;
mod repository;
mod requests;
mod service;
mod snapshot;

pub use error::{RepositoryError, SnapshotError, SubscriptionError};
pub use query::{StorageRequestFactory, StorageResponse, STORAGE_QUERY_PAGE_SIZE};
pub use repository::{InMemoryRepository, StorageRepository};
pub use requests::{resolve_remote_keys, KeyParam, ParamSlot, SubscriptionRequest};
pub use service::{
	Attachment, CacheKey, ChildSubscription, RemoteSubscriptionService, SubscriberId,
};
pub use snapshot::{CachingSnapshotProvider, SnapshotProvider};

pub(crate) const LOG_TARGET: &str = "state-sub";
