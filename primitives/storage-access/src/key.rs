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

//! The binary key encoder.

use crate::{EncodingError, RemoteKey, StorageEntryKind, StoragePath};
use crate::metadata::CodecSnapshot;
use sp_crypto_hashing::twox_128;

/// Path prefix shared by every key of a storage entry:
/// `twox128(pallet) ++ twox128(item)`.
pub fn storage_prefix(path: &StoragePath) -> Vec<u8> {
	let mut prefix = Vec::with_capacity(32);
	prefix.extend_from_slice(&twox_128(path.pallet().as_bytes()));
	prefix.extend_from_slice(&twox_128(path.item().as_bytes()));
	prefix
}

/// Encodes storage paths plus SCALE-encoded key parameters into remote keys,
/// consulting a [`CodecSnapshot`] for entry shapes and hasher selection.
///
/// The encoder is stateless apart from the borrowed snapshot; given the same
/// snapshot it always produces the same keys and it preserves the order of
/// any parameter list it is driven over.
#[derive(Clone, Copy, Debug)]
pub struct KeyEncoder<'a> {
	snapshot: &'a CodecSnapshot,
}

impl<'a> KeyEncoder<'a> {
	/// New encoder over the given snapshot.
	pub fn new(snapshot: &'a CodecSnapshot) -> Self {
		KeyEncoder { snapshot }
	}

	/// Key of a plain (singleton) entry.
	pub fn plain_key(&self, path: &StoragePath) -> Result<RemoteKey, EncodingError> {
		self.key(path, &[])
	}

	/// Key of a single-key map entry.
	pub fn map_key(&self, path: &StoragePath, param: &[u8]) -> Result<RemoteKey, EncodingError> {
		self.key(path, &[param])
	}

	/// Key of a double-map entry. Components are concatenated in declared
	/// order, each under its own hasher.
	pub fn double_map_key(
		&self,
		path: &StoragePath,
		param1: &[u8],
		param2: &[u8],
	) -> Result<RemoteKey, EncodingError> {
		self.key(path, &[param1, param2])
	}

	/// Key of an entry addressed by an ordered tuple of components. This is
	/// the funnel every other form reduces to.
	pub fn key(&self, path: &StoragePath, params: &[&[u8]]) -> Result<RemoteKey, EncodingError> {
		let entry = self
			.snapshot
			.entry(path)
			.ok_or_else(|| EncodingError::InvalidPath(path.to_string()))?;

		let hashers: &[_] = match &entry.kind {
			StorageEntryKind::Plain if params.is_empty() => &[],
			StorageEntryKind::Map { hashers } if hashers.len() == params.len() => hashers.as_slice(),
			_ => {
				return Err(EncodingError::IncompatibleType {
					path: path.to_string(),
					expected: entry.key_arity(),
					got: params.len(),
				})
			},
		};

		let mut key = storage_prefix(path);
		for (hasher, param) in hashers.iter().zip(params) {
			key.extend_from_slice(&hasher.hash(param));
		}

		Ok(RemoteKey(key))
	}
}
