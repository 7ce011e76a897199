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

//! The local persistence seam.

use crate::RepositoryError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use sw_storage_access::LocalKey;

/// Keyed store the engine persists decoded storage values into.
///
/// Implementations must tolerate concurrent writes to distinct keys; child
/// subscriptions of one change set persist in parallel. No transactional
/// guarantees are assumed across keys.
#[async_trait]
pub trait StorageRepository: Send + Sync + 'static {
	/// Current value under `key`.
	async fn get(&self, key: &LocalKey) -> Result<Option<Vec<u8>>, RepositoryError>;

	/// Insert or replace the value under `key`.
	async fn upsert(&self, key: &LocalKey, value: Vec<u8>) -> Result<(), RepositoryError>;

	/// Remove the value under `key`, if any.
	async fn delete(&self, key: &LocalKey) -> Result<(), RepositoryError>;
}

/// Map-backed repository for embedding and tests.
#[derive(Default)]
pub struct InMemoryRepository {
	values: RwLock<HashMap<LocalKey, Vec<u8>>>,
}

impl InMemoryRepository {
	/// New empty repository.
	pub fn new() -> Self {
		Self::default()
	}

	/// Copy of all stored entries.
	pub fn entries(&self) -> HashMap<LocalKey, Vec<u8>> {
		self.values.read().clone()
	}
}

#[async_trait]
impl StorageRepository for InMemoryRepository {
	async fn get(&self, key: &LocalKey) -> Result<Option<Vec<u8>>, RepositoryError> {
		Ok(self.values.read().get(key).cloned())
	}

	async fn upsert(&self, key: &LocalKey, value: Vec<u8>) -> Result<(), RepositoryError> {
		self.values.write().insert(key.clone(), value);
		Ok(())
	}

	async fn delete(&self, key: &LocalKey) -> Result<(), RepositoryError> {
		self.values.write().remove(key);
		Ok(())
	}
}
