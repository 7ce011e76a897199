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

//! Wire models of the `state_*` storage methods.

use crate::TransportError;
use serde::{Deserialize, Serialize};
use sw_storage_access::{BlockHash, RemoteKey};

/// Block-scoped list of storage changes, as delivered by both
/// `state_queryStorageAt` and `state_subscribeStorage` notifications.
///
/// A `None` value means the key holds no value at that block. Keys of the
/// subscribed set that did not change are simply absent from `changes`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageChangeSet {
	/// Block the changes apply to.
	pub block: BlockHash,
	/// Changed keys and their new raw values.
	pub changes: Vec<(RemoteKey, Option<Vec<u8>>)>,
}

/// `StorageChangeSet` as it appears on the wire: hex strings throughout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawStorageChangeSet {
	/// `0x`-prefixed block hash.
	pub block: String,
	/// `0x`-prefixed key and optional value pairs.
	pub changes: Vec<(String, Option<String>)>,
}

pub(crate) fn decode_hex(payload: &str) -> Result<Vec<u8>, TransportError> {
	let stripped = payload.strip_prefix("0x").unwrap_or(payload);
	hex::decode(stripped)
		.map_err(|e| TransportError::BadResponse(format!("bad hex payload {payload:?}: {e}")))
}

impl TryFrom<RawStorageChangeSet> for StorageChangeSet {
	type Error = TransportError;

	fn try_from(raw: RawStorageChangeSet) -> Result<Self, Self::Error> {
		let block_bytes = decode_hex(&raw.block)?;
		let block = BlockHash::from_slice(&block_bytes).ok_or_else(|| {
			TransportError::BadResponse(format!("block hash of {} bytes", block_bytes.len()))
		})?;

		let changes = raw
			.changes
			.into_iter()
			.map(|(key, value)| {
				let key = RemoteKey(decode_hex(&key)?);
				let value = value.as_deref().map(decode_hex).transpose()?;
				Ok((key, value))
			})
			.collect::<Result<_, TransportError>>()?;

		Ok(StorageChangeSet { block, changes })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn change_set_parses_from_wire_json() {
		let json = r#"{
			"block": "0x0101010101010101010101010101010101010101010101010101010101010101",
			"changes": [
				["0x2a", "0xdeadbeef"],
				["0x2b", null]
			]
		}"#;

		let raw: RawStorageChangeSet = serde_json::from_str(json).unwrap();
		let set = StorageChangeSet::try_from(raw).unwrap();

		assert_eq!(set.block, BlockHash([1u8; 32]));
		assert_eq!(
			set.changes,
			vec![
				(RemoteKey(vec![0x2a]), Some(vec![0xde, 0xad, 0xbe, 0xef])),
				(RemoteKey(vec![0x2b]), None),
			],
		);
	}

	#[test]
	fn short_block_hash_is_rejected() {
		let raw = RawStorageChangeSet { block: "0x0102".into(), changes: vec![] };
		let err = StorageChangeSet::try_from(raw).unwrap_err();
		assert!(matches!(err, TransportError::BadResponse(_)));
	}

	#[test]
	fn non_hex_payload_is_rejected() {
		assert!(matches!(decode_hex("0xzz"), Err(TransportError::BadResponse(_))));
		assert_eq!(decode_hex("2a").unwrap(), vec![0x2a]);
	}
}
