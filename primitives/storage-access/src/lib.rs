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

//! Primitives for addressing remote chain storage.
//!
//! Storage entries of a Substrate-like node are addressed by binary keys whose
//! shape is dictated by the runtime metadata: a two-part `twox128` prefix
//! identifying the entry, followed by one hashed component per declared map
//! key. This crate provides the value types shared by the whole workspace and
//! the [`KeyEncoder`] that materializes keys from a [`CodecSnapshot`].
//!
//! Everything in this crate is purely functional given a snapshot and may be
//! called concurrently without synchronization.

use codec::{Decode, Encode};
use std::fmt;

mod error;
mod hasher;
mod key;
mod metadata;

pub use error::EncodingError;
pub use hasher::StorageHasher;
pub use key::{storage_prefix, KeyEncoder};
pub use metadata::{
	CodecSnapshot, CodecSnapshotBuilder, StorageEntryKind, StorageEntryMeta, StorageEntryModifier,
};

/// Identifier of a single storage entry in the runtime metadata schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoragePath {
	pallet: String,
	item: String,
}

impl StoragePath {
	/// New path from pallet and item names, as spelled in the metadata.
	pub fn new(pallet: impl Into<String>, item: impl Into<String>) -> Self {
		StoragePath { pallet: pallet.into(), item: item.into() }
	}

	/// Name of the pallet owning the entry.
	pub fn pallet(&self) -> &str {
		&self.pallet
	}

	/// Name of the storage entry within the pallet.
	pub fn item(&self) -> &str {
		&self.item
	}
}

impl fmt::Display for StoragePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}::{}", self.pallet, self.item)
	}
}

/// Binary storage key as understood by the remote node.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteKey(pub Vec<u8>);

impl RemoteKey {
	/// Key bytes.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl From<Vec<u8>> for RemoteKey {
	fn from(bytes: Vec<u8>) -> Self {
		RemoteKey(bytes)
	}
}

impl AsRef<[u8]> for RemoteKey {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Display for RemoteKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(&self.0))
	}
}

impl fmt::Debug for RemoteKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "RemoteKey(0x{})", hex::encode(&self.0))
	}
}

/// Identifier of a locally cached storage value.
///
/// Local keys are chosen by the subscriber and are entirely opaque to the
/// remote node. The engine only guarantees that every remote key of a batch
/// keeps its positional association with the local key it was requested
/// under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalKey(pub String);

impl From<&str> for LocalKey {
	fn from(key: &str) -> Self {
		LocalKey(key.to_string())
	}
}

impl From<String> for LocalKey {
	fn from(key: String) -> Self {
		LocalKey(key)
	}
}

impl fmt::Display for LocalKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Hash of a remote block.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
	/// Hash from a byte slice. `None` if the slice length is not 32.
	pub fn from_slice(bytes: &[u8]) -> Option<Self> {
		<[u8; 32]>::try_from(bytes).ok().map(BlockHash)
	}
}

impl fmt::Display for BlockHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for BlockHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BlockHash(0x{})", hex::encode(self.0))
	}
}

/// 32-byte account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct AccountId32(pub [u8; 32]);

impl From<[u8; 32]> for AccountId32 {
	fn from(raw: [u8; 32]) -> Self {
		AccountId32(raw)
	}
}

impl AsRef<[u8]> for AccountId32 {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Display for AccountId32 {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for AccountId32 {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "AccountId32(0x{})", hex::encode(self.0))
	}
}
