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

//! Storage key hashers.

use sp_crypto_hashing::{blake2_128, blake2_256, twox_128, twox_256, twox_64};

/// Hasher declared by the metadata for one key position of a storage map.
///
/// The `Concat` variants append the pre-image after the digest, which is what
/// makes the corresponding maps iterable by prefix. Which hasher applies to
/// which position is read from the codec snapshot, never assumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageHasher {
	/// 128-bit Blake2 digest.
	Blake2_128,
	/// 256-bit Blake2 digest.
	Blake2_256,
	/// 128-bit Blake2 digest followed by the pre-image.
	Blake2_128Concat,
	/// 128-bit XX digest.
	Twox128,
	/// 256-bit XX digest.
	Twox256,
	/// 64-bit XX digest followed by the pre-image.
	Twox64Concat,
	/// The pre-image itself.
	Identity,
}

impl StorageHasher {
	/// Apply the hasher to an already SCALE-encoded key component.
	pub fn hash(&self, encoded: &[u8]) -> Vec<u8> {
		match self {
			StorageHasher::Blake2_128 => blake2_128(encoded).to_vec(),
			StorageHasher::Blake2_256 => blake2_256(encoded).to_vec(),
			StorageHasher::Blake2_128Concat => {
				let mut out = blake2_128(encoded).to_vec();
				out.extend_from_slice(encoded);
				out
			},
			StorageHasher::Twox128 => twox_128(encoded).to_vec(),
			StorageHasher::Twox256 => twox_256(encoded).to_vec(),
			StorageHasher::Twox64Concat => {
				let mut out = twox_64(encoded).to_vec();
				out.extend_from_slice(encoded);
				out
			},
			StorageHasher::Identity => encoded.to_vec(),
		}
	}
}
