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

//! Transport errors.

use thiserror::Error;

/// Error of a transport-level operation.
///
/// Carries the underlying failure as text so that one error value can be
/// cloned out to every waiter of a shared subscription attempt.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
	/// No live connection exists for the chain.
	#[error("no live connection for chain {0}")]
	ConnectionUnavailable(String),
	/// The node rejected or dropped a subscribe call.
	#[error("storage subscribe failed: {0}")]
	SubscribeFailed(String),
	/// A one-shot query failed.
	#[error("storage query failed: {0}")]
	QueryFailed(String),
	/// A wire unsubscribe failed; the subscription is gone regardless.
	#[error("storage unsubscribe failed: {0}")]
	UnsubscribeFailed(String),
	/// The node sent a payload that does not parse as the expected shape.
	#[error("malformed node response: {0}")]
	BadResponse(String),
}
