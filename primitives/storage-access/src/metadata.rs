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

//! The codec snapshot: a metadata-derived view of the storage schema.

use crate::{StorageHasher, StoragePath};
use std::collections::HashMap;

/// Modifier declared for a storage entry value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageEntryModifier {
	/// Entry may legitimately hold no value.
	Optional,
	/// A missing value decodes to the metadata-declared default.
	Default,
}

/// Shape of a storage entry's key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageEntryKind {
	/// Singleton entry addressed by the bare path prefix.
	Plain,
	/// Map entry addressed by one hashed component per declared hasher.
	///
	/// Single maps declare one hasher, double maps two; N-maps declare an
	/// ordered list of arbitrary length. Positions may use different hashers.
	Map {
		/// Hashers in declared key order.
		hashers: Vec<StorageHasher>,
	},
}

/// Metadata of one storage entry, as carried by the snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEntryMeta {
	/// Value modifier.
	pub modifier: StorageEntryModifier,
	/// Key shape.
	pub kind: StorageEntryKind,
	/// SCALE-encoded default value. Empty for [`StorageEntryModifier::Optional`].
	pub default: Vec<u8>,
}

impl StorageEntryMeta {
	/// Number of key components the entry expects.
	pub fn key_arity(&self) -> usize {
		match &self.kind {
			StorageEntryKind::Plain => 0,
			StorageEntryKind::Map { hashers } => hashers.len(),
		}
	}
}

/// Versioned, immutable view of the runtime metadata sufficient to encode and
/// decode a set of storage entries.
///
/// Snapshots are produced by an external provider (typically by fetching and
/// parsing the node's runtime metadata) and are identified by the runtime
/// spec version. The engine treats them as opaque, shareable values: a stale
/// snapshot manifests as [`crate::EncodingError::InvalidPath`] and is the
/// provider's cue to produce a fresh one.
#[derive(Clone, Debug)]
pub struct CodecSnapshot {
	spec_version: u32,
	entries: HashMap<StoragePath, StorageEntryMeta>,
}

impl CodecSnapshot {
	/// Start building a snapshot for the given spec version.
	pub fn builder(spec_version: u32) -> CodecSnapshotBuilder {
		CodecSnapshotBuilder { spec_version, entries: HashMap::new() }
	}

	/// Runtime spec version the snapshot was derived from.
	pub fn spec_version(&self) -> u32 {
		self.spec_version
	}

	/// Metadata of the given entry, if the schema knows it.
	pub fn entry(&self, path: &StoragePath) -> Option<&StorageEntryMeta> {
		self.entries.get(path)
	}
}

/// Builder for [`CodecSnapshot`].
#[derive(Debug)]
pub struct CodecSnapshotBuilder {
	spec_version: u32,
	entries: HashMap<StoragePath, StorageEntryMeta>,
}

impl CodecSnapshotBuilder {
	/// Declare a plain (singleton) entry.
	pub fn plain(self, path: StoragePath, modifier: StorageEntryModifier) -> Self {
		self.entry(path, StorageEntryMeta { modifier, kind: StorageEntryKind::Plain, default: vec![] })
	}

	/// Declare a map entry with the given hasher list.
	pub fn map(
		self,
		path: StoragePath,
		modifier: StorageEntryModifier,
		hashers: Vec<StorageHasher>,
	) -> Self {
		self.entry(path, StorageEntryMeta { modifier, kind: StorageEntryKind::Map { hashers }, default: vec![] })
	}

	/// Declare an entry from its full metadata.
	pub fn entry(mut self, path: StoragePath, meta: StorageEntryMeta) -> Self {
		self.entries.insert(path, meta);
		self
	}

	/// Attach a SCALE-encoded default value to the most natural place: the
	/// entry declared under `path`. No-op if the path was never declared.
	pub fn default_value(mut self, path: &StoragePath, default: Vec<u8>) -> Self {
		if let Some(meta) = self.entries.get_mut(path) {
			meta.default = default;
		}
		self
	}

	/// Finish the snapshot.
	pub fn build(self) -> CodecSnapshot {
		CodecSnapshot { spec_version: self.spec_version, entries: self.entries }
	}
}
