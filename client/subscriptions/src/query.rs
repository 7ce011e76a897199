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

//! One-shot, paginated storage queries.

use crate::{SubscriptionError, LOG_TARGET};
use codec::Decode;
use std::{collections::HashMap, sync::Arc};
use sw_rpc_transport::{ChainId, StateTransport};
use sw_storage_access::{
	BlockHash, CodecSnapshot, EncodingError, KeyEncoder, RemoteKey, StorageEntryMeta,
	StorageEntryModifier, StoragePath,
};

/// Node-side query limit: at most this many keys per wire round-trip.
pub const STORAGE_QUERY_PAGE_SIZE: usize = 1000;

/// Value of one queried key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageResponse<V> {
	/// The queried key.
	pub key: RemoteKey,
	/// Raw value bytes as returned by the node, if any.
	pub raw: Option<Vec<u8>>,
	/// Decoded value. For `Default`-modified entries a missing raw value
	/// decodes to the metadata default; only `Optional` entries are `None`
	/// here.
	pub value: Option<V>,
}

/// Batches storage keys into paginated one-shot queries and re-associates the
/// results with the request order.
///
/// Purely functional apart from the injected transport; safe to share and
/// call concurrently.
pub struct StorageRequestFactory<T> {
	transport: Arc<T>,
	page_size: usize,
}

impl<T: StateTransport> StorageRequestFactory<T> {
	/// New factory over the given transport.
	pub fn new(transport: Arc<T>) -> Self {
		StorageRequestFactory { transport, page_size: STORAGE_QUERY_PAGE_SIZE }
	}

	/// Override the page size. Mainly useful to tests; the default matches
	/// the node-side limit.
	pub fn with_page_size(mut self, page_size: usize) -> Self {
		self.page_size = page_size.max(1);
		self
	}

	/// Query raw values of `keys`, in key order.
	///
	/// Pages are issued sequentially and every page after the first is
	/// pinned to the block reported by the first, so the whole batch reads
	/// one consistent state view even while the chain advances. The node
	/// reports changes in no particular order; results are mapped back to
	/// the caller's order through a key→position index.
	pub async fn query_raw(
		&self,
		chain: &ChainId,
		keys: &[RemoteKey],
		at: Option<BlockHash>,
	) -> Result<Vec<Option<Vec<u8>>>, SubscriptionError> {
		let mut positions: HashMap<&RemoteKey, Vec<usize>> = HashMap::new();
		for (index, key) in keys.iter().enumerate() {
			positions.entry(key).or_default().push(index);
		}

		let mut results: Vec<Option<Vec<u8>>> = vec![None; keys.len()];
		let mut pinned_at = at;
		for page in keys.chunks(self.page_size) {
			let change_set =
				self.transport.query_storage_at(chain, page.to_vec(), pinned_at).await?;
			if pinned_at.is_none() {
				pinned_at = Some(change_set.block);
			}

			for (key, value) in change_set.changes {
				if let Some(indices) = positions.get(&key) {
					for &index in indices {
						results[index] = value.clone();
					}
				} else {
					log::trace!(target: LOG_TARGET, "Dropping unrequested key {key} from response");
				}
			}
		}

		Ok(results)
	}

	/// Query and decode the values of `keys`, all belonging to the storage
	/// entry at `path`, in key order.
	pub async fn query_batch<V: Decode>(
		&self,
		chain: &ChainId,
		keys: &[RemoteKey],
		snapshot: &CodecSnapshot,
		path: &StoragePath,
	) -> Result<Vec<StorageResponse<V>>, SubscriptionError> {
		let entry = snapshot
			.entry(path)
			.ok_or_else(|| EncodingError::InvalidPath(path.to_string()))?;

		let raw_values = self.query_raw(chain, keys, None).await?;
		keys.iter()
			.zip(raw_values)
			.map(|(key, raw)| {
				let value = decode_with_fallback::<V>(entry, raw.as_deref())?;
				Ok(StorageResponse { key: key.clone(), raw, value })
			})
			.collect()
	}

	/// Query the singleton entry at `path`.
	pub async fn query_value<V: Decode>(
		&self,
		chain: &ChainId,
		snapshot: &CodecSnapshot,
		path: &StoragePath,
	) -> Result<StorageResponse<V>, SubscriptionError> {
		let key = KeyEncoder::new(snapshot).plain_key(path)?;
		self.query_single(chain, key, snapshot, path).await
	}

	/// Query a single-key map entry at `path` for one parameter.
	pub async fn query_map_value<V: Decode>(
		&self,
		chain: &ChainId,
		snapshot: &CodecSnapshot,
		path: &StoragePath,
		param: &[u8],
	) -> Result<StorageResponse<V>, SubscriptionError> {
		let key = KeyEncoder::new(snapshot).map_key(path, param)?;
		self.query_single(chain, key, snapshot, path).await
	}

	/// Query a double-map entry at `path` for one parameter pair.
	pub async fn query_double_map_value<V: Decode>(
		&self,
		chain: &ChainId,
		snapshot: &CodecSnapshot,
		path: &StoragePath,
		param1: &[u8],
		param2: &[u8],
	) -> Result<StorageResponse<V>, SubscriptionError> {
		let key = KeyEncoder::new(snapshot).double_map_key(path, param1, param2)?;
		self.query_single(chain, key, snapshot, path).await
	}

	/// Query a single-key map entry at `path` for many parameters, in
	/// parameter order.
	pub async fn query_map_values<V: Decode>(
		&self,
		chain: &ChainId,
		snapshot: &CodecSnapshot,
		path: &StoragePath,
		params: &[Vec<u8>],
	) -> Result<Vec<StorageResponse<V>>, SubscriptionError> {
		let encoder = KeyEncoder::new(snapshot);
		let keys = params
			.iter()
			.map(|param| encoder.map_key(path, param))
			.collect::<Result<Vec<_>, _>>()?;
		self.query_batch(chain, &keys, snapshot, path).await
	}

	async fn query_single<V: Decode>(
		&self,
		chain: &ChainId,
		key: RemoteKey,
		snapshot: &CodecSnapshot,
		path: &StoragePath,
	) -> Result<StorageResponse<V>, SubscriptionError> {
		let mut responses = self.query_batch(chain, &[key], snapshot, path).await?;
		Ok(responses.pop().expect("query_batch returns one response per key; qed"))
	}
}

/// Decode a raw value under the entry's declared fallback policy.
fn decode_with_fallback<V: Decode>(
	entry: &StorageEntryMeta,
	raw: Option<&[u8]>,
) -> Result<Option<V>, SubscriptionError> {
	let bytes = match raw {
		Some(bytes) => bytes,
		None => match entry.modifier {
			StorageEntryModifier::Default => entry.default.as_slice(),
			StorageEntryModifier::Optional => return Ok(None),
		},
	};

	V::decode(&mut &bytes[..])
		.map(Some)
		.map_err(|e| SubscriptionError::ValueDecode(e.to_string()))
}
