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

//! Key encoding errors.

use thiserror::Error;

/// Error that may occur while encoding a storage key.
///
/// None of these are retryable at this level. A stale snapshot is the usual
/// cause of [`EncodingError::InvalidPath`]; whether to refresh the snapshot
/// and retry is the caller's decision.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EncodingError {
	/// A deferred key parameter has not been resolved yet.
	#[error("required key parameter is not resolved yet")]
	MissingParams,
	/// The storage path is absent from the codec snapshot.
	#[error("storage entry {0} is not present in the codec snapshot")]
	InvalidPath(String),
	/// The supplied key components do not match the declared entry shape.
	#[error("storage entry {path} expects {expected} key component(s), got {got}")]
	IncompatibleType {
		/// Entry the components were supplied against.
		path: String,
		/// Component count declared by the metadata.
		expected: usize,
		/// Component count actually supplied.
		got: usize,
	},
}
