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

//! The codec snapshot seam.

use crate::SnapshotError;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use sw_rpc_transport::ChainId;
use sw_storage_access::CodecSnapshot;
use tokio::sync::RwLock;

/// Supplies the current metadata-derived codec snapshot of a chain.
///
/// Asynchronous because producing a snapshot may require fetching and parsing
/// the node's runtime metadata.
#[async_trait]
pub trait SnapshotProvider: Send + Sync + 'static {
	/// Current snapshot of `chain`.
	async fn snapshot(&self, chain: &ChainId) -> Result<Arc<CodecSnapshot>, SnapshotError>;
}

/// Caches snapshots per chain on top of any [`SnapshotProvider`].
///
/// The fetch runs without holding the cache lock; racing callers may fetch
/// twice and the later insert wins, which is harmless for an immutable
/// snapshot of the same schema.
pub struct CachingSnapshotProvider<P> {
	inner: P,
	cache: RwLock<HashMap<ChainId, Arc<CodecSnapshot>>>,
}

impl<P> CachingSnapshotProvider<P> {
	/// Wrap `inner` with an empty cache.
	pub fn new(inner: P) -> Self {
		CachingSnapshotProvider { inner, cache: RwLock::new(HashMap::new()) }
	}

	/// Drop the cached snapshot of `chain`, forcing the next call through to
	/// the inner provider. This is how a runtime upgrade (new spec version)
	/// becomes visible.
	pub async fn invalidate(&self, chain: &ChainId) {
		self.cache.write().await.remove(chain);
	}
}

#[async_trait]
impl<P: SnapshotProvider> SnapshotProvider for CachingSnapshotProvider<P> {
	async fn snapshot(&self, chain: &ChainId) -> Result<Arc<CodecSnapshot>, SnapshotError> {
		if let Some(snapshot) = self.cache.read().await.get(chain) {
			return Ok(snapshot.clone());
		}

		let fetched = self.inner.snapshot(chain).await?;
		self.cache.write().await.insert(chain.clone(), fetched.clone());
		Ok(fetched)
	}
}
