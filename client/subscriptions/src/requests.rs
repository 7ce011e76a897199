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

//! Subscription request descriptors and deferred key parameters.

use crate::SubscriptionError;
use codec::Encode;
use std::sync::{Arc, OnceLock};
use sw_storage_access::{
	CodecSnapshot, EncodingError, KeyEncoder, LocalKey, RemoteKey, StoragePath,
};

/// A key parameter that may not be known yet.
///
/// Parameters of a dependent subscription are often produced by an earlier
/// async step (a query, another subscription's decoded value). Instead of
/// chaining closures, the unknown value is a shared [`ParamSlot`] the
/// upstream step fills once; encoding resolves all slots first and fails
/// with [`EncodingError::MissingParams`] if one is still empty.
#[derive(Clone, Debug)]
pub enum KeyParam {
	/// Already SCALE-encoded value.
	Value(Vec<u8>),
	/// Slot filled by an upstream step.
	Slot(ParamSlot),
}

impl KeyParam {
	/// Parameter from an encodable value.
	pub fn value(value: &impl Encode) -> Self {
		KeyParam::Value(value.encode())
	}

	/// Parameter from raw SCALE bytes.
	pub fn raw(bytes: Vec<u8>) -> Self {
		KeyParam::Value(bytes)
	}

	/// SCALE bytes of the parameter, if known.
	pub fn resolve(&self) -> Result<Vec<u8>, EncodingError> {
		match self {
			KeyParam::Value(bytes) => Ok(bytes.clone()),
			KeyParam::Slot(slot) => slot.get().ok_or(EncodingError::MissingParams),
		}
	}
}

/// Fill-once result slot shared between the producer of a value and the
/// requests that key off it.
#[derive(Clone, Debug, Default)]
pub struct ParamSlot(Arc<OnceLock<Vec<u8>>>);

impl ParamSlot {
	/// New empty slot.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Fill the slot with an encodable value. Returns `false` if it was
	/// already filled; the first value stays.
	pub fn fill(&self, value: &impl Encode) -> bool {
		self.fill_raw(value.encode())
	}

	/// Fill the slot with raw SCALE bytes.
	pub fn fill_raw(&self, bytes: Vec<u8>) -> bool {
		self.0.set(bytes).is_ok()
	}

	fn get(&self) -> Option<Vec<u8>> {
		self.0.get().cloned()
	}
}

/// Descriptor of one storage entry a subscriber wants watched.
///
/// `local_key` doubles as the identity of the locally cached value; the
/// remote key is only materialized when a codec snapshot is at hand.
#[derive(Clone, Debug)]
pub enum SubscriptionRequest {
	/// Singleton entry.
	Unkeyed {
		/// Storage entry.
		path: StoragePath,
		/// Cache identity of the value.
		local_key: LocalKey,
	},
	/// Entry of a single-key map.
	SingleKey {
		/// Storage entry.
		path: StoragePath,
		/// Cache identity of the value.
		local_key: LocalKey,
		/// The map key.
		param: KeyParam,
	},
	/// Entry of a double map.
	DoubleKey {
		/// Storage entry.
		path: StoragePath,
		/// Cache identity of the value.
		local_key: LocalKey,
		/// Both map keys, in declared order.
		params: (KeyParam, KeyParam),
	},
	/// Entry of an N-key map.
	NKey {
		/// Storage entry.
		path: StoragePath,
		/// Cache identity of the value.
		local_key: LocalKey,
		/// All map keys, in declared order.
		params: Vec<KeyParam>,
	},
}

impl SubscriptionRequest {
	/// Cache identity of the requested value.
	pub fn local_key(&self) -> &LocalKey {
		match self {
			SubscriptionRequest::Unkeyed { local_key, .. } |
			SubscriptionRequest::SingleKey { local_key, .. } |
			SubscriptionRequest::DoubleKey { local_key, .. } |
			SubscriptionRequest::NKey { local_key, .. } => local_key,
		}
	}

	/// Storage entry the request addresses.
	pub fn path(&self) -> &StoragePath {
		match self {
			SubscriptionRequest::Unkeyed { path, .. } |
			SubscriptionRequest::SingleKey { path, .. } |
			SubscriptionRequest::DoubleKey { path, .. } |
			SubscriptionRequest::NKey { path, .. } => path,
		}
	}

	/// Materialize the remote key: resolve all deferred parameters, then
	/// encode.
	pub fn remote_key(&self, encoder: &KeyEncoder<'_>) -> Result<RemoteKey, EncodingError> {
		match self {
			SubscriptionRequest::Unkeyed { path, .. } => encoder.plain_key(path),
			SubscriptionRequest::SingleKey { path, param, .. } =>
				encoder.map_key(path, &param.resolve()?),
			SubscriptionRequest::DoubleKey { path, params, .. } =>
				encoder.double_map_key(path, &params.0.resolve()?, &params.1.resolve()?),
			SubscriptionRequest::NKey { path, params, .. } => {
				let resolved =
					params.iter().map(KeyParam::resolve).collect::<Result<Vec<_>, _>>()?;
				let components: Vec<&[u8]> = resolved.iter().map(AsRef::as_ref).collect();
				encoder.key(path, &components)
			},
		}
	}
}

/// Encode a request batch into ordered `(remote, local)` key pairs.
///
/// Fails as a whole on the first request that cannot be encoded. The output
/// always carries exactly one pair per request, in request order; the final
/// count check guards the positional association downstream consumers rely
/// on.
pub fn resolve_remote_keys(
	requests: &[SubscriptionRequest],
	snapshot: &CodecSnapshot,
) -> Result<Vec<(RemoteKey, LocalKey)>, SubscriptionError> {
	let encoder = KeyEncoder::new(snapshot);
	let mut pairs = Vec::with_capacity(requests.len());
	for request in requests {
		pairs.push((request.remote_key(&encoder)?, request.local_key().clone()));
	}

	if pairs.len() != requests.len() {
		return Err(SubscriptionError::RemoteKeysMismatch {
			remote: pairs.len(),
			local: requests.len(),
		});
	}

	Ok(pairs)
}

#[cfg(test)]
mod tests {
	use super::*;
	use sw_storage_access::{StorageEntryModifier, StorageHasher};

	fn snapshot() -> CodecSnapshot {
		CodecSnapshot::builder(1)
			.plain(StoragePath::new("Timestamp", "Now"), StorageEntryModifier::Default)
			.map(
				StoragePath::new("System", "Account"),
				StorageEntryModifier::Default,
				vec![StorageHasher::Blake2_128Concat],
			)
			.build()
	}

	#[test]
	fn deferred_parameter_resolves_after_fill() {
		let slot = ParamSlot::empty();
		let request = SubscriptionRequest::SingleKey {
			path: StoragePath::new("System", "Account"),
			local_key: "account".into(),
			param: KeyParam::Slot(slot.clone()),
		};

		let snapshot = snapshot();
		let encoder = KeyEncoder::new(&snapshot);
		assert_eq!(request.remote_key(&encoder), Err(EncodingError::MissingParams));

		assert!(slot.fill(&[9u8; 32]));
		let key = request.remote_key(&encoder).unwrap();
		assert!(key.as_bytes().ends_with(&[9u8; 32].encode()));

		// A second fill does not displace the first value.
		assert!(!slot.fill(&[1u8; 32]));
		assert_eq!(request.remote_key(&encoder).unwrap(), key);
	}

	#[test]
	fn batch_preserves_request_order() {
		let snapshot = snapshot();
		let requests: Vec<_> = (0u8..5)
			.map(|i| SubscriptionRequest::SingleKey {
				path: StoragePath::new("System", "Account"),
				local_key: format!("account-{i}").into(),
				param: KeyParam::value(&[i; 32]),
			})
			.collect();

		let pairs = resolve_remote_keys(&requests, &snapshot).unwrap();
		assert_eq!(pairs.len(), requests.len());
		for (i, (remote, local)) in pairs.iter().enumerate() {
			assert_eq!(local, &LocalKey(format!("account-{i}")));
			assert!(remote.as_bytes().ends_with(&[i as u8; 32].encode()));
		}
	}

	#[test]
	fn batch_fails_on_first_unresolved_parameter() {
		let snapshot = snapshot();
		let requests = vec![
			SubscriptionRequest::Unkeyed {
				path: StoragePath::new("Timestamp", "Now"),
				local_key: "now".into(),
			},
			SubscriptionRequest::SingleKey {
				path: StoragePath::new("System", "Account"),
				local_key: "account".into(),
				param: KeyParam::Slot(ParamSlot::empty()),
			},
		];

		let err = resolve_remote_keys(&requests, &snapshot).unwrap_err();
		assert_eq!(err, SubscriptionError::Encoding(EncodingError::MissingParams));
	}
}
