// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Persistence boundaries.
//!
//! The ledger, pipeline and reward desk only ever talk to these traits.
//! Records are partitioned by [`UserId`]; see [`crate::memory`] for the
//! in-process implementations.

use crate::account::Account;
use crate::base::{Fingerprint, RewardId, UserId};
use crate::error::StoreError;
use crate::receipt::Receipt;
use crate::reward::Reward;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Point balances.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load(&self, user_id: &UserId) -> Result<Option<Account>, StoreError>;

    /// Commits `next` only if the stored version is still `next.version() - 1`
    /// (or the account is absent and `next.version() == 1`).
    ///
    /// Returns `Ok(false)` when another writer got there first.
    async fn compare_and_set(&self, next: &Account) -> Result<bool, StoreError>;
}

/// Accepted receipts.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Persists a receipt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateFingerprint`] if a receipt with the same
    /// image fingerprint is already stored.
    async fn insert(&self, receipt: Receipt) -> Result<(), StoreError>;

    /// Withdraws the receipt holding `fingerprint`, if any.
    async fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError>;

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Receipt>, StoreError>;

    /// Counts receipts of `user_id` created in `[from, to)`.
    async fn count_for_user_between(
        &self,
        user_id: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

/// Result of the one-time reward transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemTransition {
    /// This call moved the reward to `Redeemed`.
    Redeemed(Reward),
    /// An earlier call already did; the stored reward is returned unchanged.
    AlreadyRedeemed(Reward),
    NotFound,
}

/// Issued rewards.
#[async_trait]
pub trait RewardStore: Send + Sync {
    async fn insert(&self, reward: Reward) -> Result<(), StoreError>;

    /// Atomically flips `redeemed` and stamps `redeemed_at`.
    async fn redeem(&self, id: &RewardId, at: DateTime<Utc>)
    -> Result<RedeemTransition, StoreError>;

    /// Rewards of `user_id`, newest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Reward>, StoreError>;
}

/// Object storage for raw receipt images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key` and returns a URL for the stored object.
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>)
    -> Result<String, StoreError>;

    /// Deletes the object under `key`. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
