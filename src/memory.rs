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

//! In-process store implementations backed by [`DashMap`].
//!
//! Every check-and-write goes through the entry API so it happens under a
//! single shard lock; this is what makes the compare-and-set, the
//! fingerprint uniqueness constraint and the redeem transition atomic.

use crate::account::Account;
use crate::base::{Fingerprint, RewardId, UserId};
use crate::error::StoreError;
use crate::receipt::Receipt;
use crate::reward::Reward;
use crate::store::{AccountStore, BlobStore, ReceiptStore, RedeemTransition, RewardStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<UserId, Account>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a balance without any version check. Test and seeding helper.
    pub fn seed(&self, user_id: UserId, points: u64) {
        let version = self
            .accounts
            .get(&user_id)
            .map(|account| account.version())
            .unwrap_or(0);
        self.accounts
            .insert(user_id.clone(), Account::restore(user_id, points, version + 1));
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn load(&self, user_id: &UserId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(user_id).map(|account| account.value().clone()))
    }

    async fn compare_and_set(&self, next: &Account) -> Result<bool, StoreError> {
        let expected = next.version().saturating_sub(1);
        match self.accounts.entry(next.user_id().clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().version() != expected {
                    return Ok(false);
                }
                entry.insert(next.clone());
                Ok(true)
            }
            Entry::Vacant(entry) => {
                if expected != 0 {
                    return Ok(false);
                }
                entry.insert(next.clone());
                Ok(true)
            }
        }
    }
}

/// Receipts keyed by image fingerprint, which doubles as the uniqueness constraint.
#[derive(Debug, Default)]
pub struct MemoryReceiptStore {
    receipts: DashMap<Fingerprint, Receipt>,
}

impl MemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    pub fn receipts_for(&self, user_id: &UserId) -> Vec<Receipt> {
        self.receipts
            .iter()
            .filter(|receipt| &receipt.user_id == user_id)
            .map(|receipt| receipt.value().clone())
            .collect()
    }
}

#[async_trait]
impl ReceiptStore for MemoryReceiptStore {
    async fn insert(&self, receipt: Receipt) -> Result<(), StoreError> {
        match self.receipts.entry(receipt.image_fingerprint.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateFingerprint),
            Entry::Vacant(entry) => {
                entry.insert(receipt);
                Ok(())
            }
        }
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.receipts.remove(fingerprint);
        Ok(())
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Receipt>, StoreError> {
        Ok(self.receipts.get(fingerprint).map(|receipt| receipt.value().clone()))
    }

    async fn count_for_user_between(
        &self,
        user_id: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Ok(self
            .receipts
            .iter()
            .filter(|receipt| {
                &receipt.user_id == user_id && receipt.created_at >= from && receipt.created_at < to
            })
            .count())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRewardStore {
    rewards: DashMap<RewardId, Reward>,
    /// Reward ids per user in issue order.
    by_user: DashMap<UserId, Vec<RewardId>>,
}

impl MemoryRewardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

#[async_trait]
impl RewardStore for MemoryRewardStore {
    async fn insert(&self, reward: Reward) -> Result<(), StoreError> {
        let id = reward.id;
        let user_id = reward.user_id.clone();
        match self.rewards.entry(id) {
            Entry::Occupied(_) => return Err(StoreError::Conflict(id.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(reward);
            }
        }
        self.by_user.entry(user_id).or_default().push(id);
        Ok(())
    }

    async fn redeem(
        &self,
        id: &RewardId,
        at: DateTime<Utc>,
    ) -> Result<RedeemTransition, StoreError> {
        let Some(mut reward) = self.rewards.get_mut(id) else {
            return Ok(RedeemTransition::NotFound);
        };
        if reward.mark_redeemed(at) {
            Ok(RedeemTransition::Redeemed(reward.clone()))
        } else {
            Ok(RedeemTransition::AlreadyRedeemed(reward.clone()))
        }
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Reward>, StoreError> {
        let ids = self
            .by_user
            .get(user_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| self.rewards.get(id).map(|reward| reward.value().clone()))
            .collect())
    }
}

/// Keeps uploaded images in memory and hands out `memory://` URLs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, (String, Vec<u8>)>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.blobs.get(key).map(|blob| blob.value().clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError> {
        self.blobs
            .insert(key.to_string(), (content_type.to_string(), bytes));
        Ok(format!("memory://receipts/{key}"))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.blobs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ReceiptId;
    use crate::reward::{RewardRequest, RewardTier};
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 3, hour, 0, 0).unwrap()
    }

    fn receipt(user: &str, bytes: &[u8], created_at: DateTime<Utc>) -> Receipt {
        Receipt {
            id: ReceiptId::generate(),
            user_id: UserId::new(user),
            image_fingerprint: Fingerprint::of(bytes),
            amount: Decimal::from(20),
            points_earned: 2,
            merchant_name: None,
            transaction_date: None,
            raw_date_text: None,
            blob_url: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_version() {
        let store = MemoryAccountStore::new();
        let fresh = Account::new(UserId::new("u1"));
        let first = fresh.apply(5).unwrap();
        assert!(store.compare_and_set(&first).await.unwrap());

        // Same base snapshot again: version 1 is already taken.
        let stale = fresh.apply(7).unwrap();
        assert!(!store.compare_and_set(&stale).await.unwrap());

        let loaded = store.load(&UserId::new("u1")).await.unwrap().unwrap();
        assert_eq!(loaded.points(), 5);
    }

    #[tokio::test]
    async fn compare_and_set_rejects_missing_base() {
        let store = MemoryAccountStore::new();
        let orphan = Account::restore(UserId::new("u1"), 10, 4);
        assert!(!store.compare_and_set(&orphan).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_fingerprint_rejected_across_users() {
        let store = MemoryReceiptStore::new();
        store.insert(receipt("u1", b"img", at(9))).await.unwrap();
        let result = store.insert(receipt("u2", b"img", at(10))).await;
        assert_eq!(result, Err(StoreError::DuplicateFingerprint));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn removed_fingerprint_can_be_stored_again() {
        let store = MemoryReceiptStore::new();
        let first = receipt("u1", b"img", at(9));
        store.insert(first.clone()).await.unwrap();
        store.remove(&first.image_fingerprint).await.unwrap();
        assert!(store.is_empty());

        store.insert(receipt("u1", b"img", at(10))).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn deleted_blob_is_gone() {
        let store = MemoryBlobStore::new();
        let url = store.put("u1/r.jpg", "image/jpeg", b"img".to_vec()).await.unwrap();
        assert_eq!(url, "memory://receipts/u1/r.jpg");

        store.delete("u1/r.jpg").await.unwrap();
        store.delete("u1/r.jpg").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn count_respects_half_open_window() {
        let store = MemoryReceiptStore::new();
        store.insert(receipt("u1", b"a", at(0))).await.unwrap();
        store.insert(receipt("u1", b"b", at(12))).await.unwrap();
        store.insert(receipt("u2", b"c", at(12))).await.unwrap();
        store.insert(receipt("u1", b"d", at(0) + chrono::Duration::days(1))).await.unwrap();

        let count = store
            .count_for_user_between(&UserId::new("u1"), at(0), at(0) + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn redeem_transitions_once() {
        let store = MemoryRewardStore::new();
        let reward = Reward::issue(
            UserId::new("u1"),
            RewardRequest::Tier(RewardTier::Bronze).resolve(0),
            at(8),
        );
        let id = reward.id;
        store.insert(reward).await.unwrap();

        let RedeemTransition::Redeemed(first) = store.redeem(&id, at(9)).await.unwrap() else {
            panic!("first redeem should transition");
        };
        let RedeemTransition::AlreadyRedeemed(second) = store.redeem(&id, at(10)).await.unwrap()
        else {
            panic!("second redeem should be refused");
        };
        assert_eq!(first.redeemed_at, Some(at(9)));
        assert_eq!(second.redeemed_at, Some(at(9)));
        assert_eq!(
            store.redeem(&RewardId::generate(), at(11)).await.unwrap(),
            RedeemTransition::NotFound
        );
    }

    #[tokio::test]
    async fn rewards_listed_newest_first() {
        let store = MemoryRewardStore::new();
        let user = UserId::new("u1");
        let older = Reward::issue(user.clone(), RewardRequest::Tier(RewardTier::Bronze).resolve(0), at(8));
        let newer = Reward::issue(user.clone(), RewardRequest::Tier(RewardTier::Gold).resolve(0), at(9));
        store.insert(older.clone()).await.unwrap();
        store.insert(newer.clone()).await.unwrap();

        let listed = store.list_for_user(&user).await.unwrap();
        assert_eq!(listed, vec![newer, older]);
        assert!(store.list_for_user(&UserId::new("nobody")).await.unwrap().is_empty());
    }
}
