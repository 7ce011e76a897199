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

//! Engine errors.
//!
//! A failed pending pipeline reports the same error value to every queued
//! waiter, so the whole taxonomy is `Clone`.

use sw_rpc_transport::TransportError;
use sw_storage_access::EncodingError;
use thiserror::Error;

/// Error of the codec snapshot provider.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SnapshotError {
	/// No codec snapshot can be produced for the chain.
	#[error("runtime metadata unavailable for chain {0}")]
	MetadataUnavailable(String),
}

/// Error of the local persistence repository.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RepositoryError {
	/// The underlying store failed.
	#[error("local storage failure: {0}")]
	Storage(String),
}

/// Umbrella error reported to subscribers and query callers.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SubscriptionError {
	/// Key encoding failed.
	#[error(transparent)]
	Encoding(#[from] EncodingError),
	/// The transport failed.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The codec snapshot could not be produced.
	#[error(transparent)]
	Snapshot(#[from] SnapshotError),
	/// The local repository failed.
	#[error(transparent)]
	Repository(#[from] RepositoryError),
	/// Encoding produced a different number of remote keys than local keys.
	#[error("encoded {remote} remote key(s) for {local} local key(s)")]
	RemoteKeysMismatch {
		/// Remote keys produced.
		remote: usize,
		/// Local keys requested.
		local: usize,
	},
	/// A storage value (or its declared default) does not decode.
	#[error("storage value does not decode: {0}")]
	ValueDecode(String),
}
