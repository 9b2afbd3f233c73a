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

//! Point balance ledger.
//!
//! The [`Ledger`] is the only component that writes balances. It handles
//! credits from accepted receipts and debits for reward issuance.
//!
//! # Balance Updates
//!
//! - **Credits**: [`Ledger::apply_delta`] with a positive delta.
//! - **Guarded debits**: [`Ledger::guarded_debit`] checks the balance and
//!   removes the points in one step, or fails without touching anything.
//!
//! # Thread Safety
//!
//! Every update is a load / compute / compare-and-set loop against the
//! [`AccountStore`]. A lost race is detected by the version check and the
//! update is recomputed from the fresh snapshot, so concurrent handlers for
//! the same user never overwrite each other.

use crate::account::Account;
use crate::base::UserId;
use crate::error::LedgerError;
use crate::store::AccountStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of compare-and-set attempts per update.
pub const DEFAULT_MAX_RETRIES: u32 = 64;

/// Point ledger over an [`AccountStore`].
///
/// # Invariants
///
/// - Balances never go below zero.
/// - Each committed update is relative to the last committed balance.
#[derive(Clone)]
pub struct Ledger {
    accounts: Arc<dyn AccountStore>,
    max_retries: u32,
}

impl Ledger {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self::with_max_retries(accounts, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(accounts: Arc<dyn AccountStore>, max_retries: u32) -> Self {
        Ledger {
            accounts,
            max_retries: max_retries.max(1),
        }
    }

    /// Returns the member's account, or a zero-point account if none exists yet.
    ///
    /// The zero account is not persisted; the first update creates it.
    pub async fn get_balance(&self, user_id: &UserId) -> Result<Account, LedgerError> {
        Ok(self
            .accounts
            .load(user_id)
            .await?
            .unwrap_or_else(|| Account::new(user_id.clone())))
    }

    /// Adds `delta` points (which may be negative) and persists the result.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientFunds`] - A negative delta exceeds the balance.
    /// - [`LedgerError::Contention`] - Every attempt lost to a concurrent writer.
    /// - [`LedgerError::Store`] - The account store failed.
    pub async fn apply_delta(&self, user_id: &UserId, delta: i64) -> Result<Account, LedgerError> {
        let account = self.update(user_id, |account| account.apply(delta)).await?;
        info!(user = %user_id, delta, balance = account.points(), "balance updated");
        Ok(account)
    }

    /// Removes `amount` points if, and only if, the balance covers them.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - `amount` is zero.
    /// - [`LedgerError::InsufficientFunds`] - Balance is below `amount`; nothing changes.
    /// - [`LedgerError::Contention`] - Every attempt lost to a concurrent writer.
    /// - [`LedgerError::Store`] - The account store failed.
    pub async fn guarded_debit(&self, user_id: &UserId, amount: u64) -> Result<Account, LedgerError> {
        let account = self.update(user_id, |account| account.debit(amount)).await?;
        info!(user = %user_id, amount, balance = account.points(), "points debited");
        Ok(account)
    }

    async fn update<F>(&self, user_id: &UserId, mutate: F) -> Result<Account, LedgerError>
    where
        F: Fn(&Account) -> Result<Account, LedgerError>,
    {
        for attempt in 1..=self.max_retries {
            let current = self.get_balance(user_id).await?;
            // Business errors (insufficient points) are final, not retried.
            let next = mutate(&current)?;
            if self.accounts.compare_and_set(&next).await? {
                return Ok(next);
            }
            debug!(user = %user_id, attempt, "balance changed underneath update, retrying");
            tokio::task::yield_now().await;
        }

        warn!(user = %user_id, attempts = self.max_retries, "giving up on contended balance");
        Err(LedgerError::Contention {
            attempts: self.max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::MemoryAccountStore;
    use async_trait::async_trait;

    /// Store that always reports a lost race.
    struct AlwaysConflicting;

    #[async_trait]
    impl AccountStore for AlwaysConflicting {
        async fn load(&self, _user_id: &UserId) -> Result<Option<Account>, StoreError> {
            Ok(None)
        }

        async fn compare_and_set(&self, _next: &Account) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let ledger = Ledger::with_max_retries(Arc::new(AlwaysConflicting), 3);
        let result = ledger.apply_delta(&UserId::new("u1"), 5).await;
        assert_eq!(result, Err(LedgerError::Contention { attempts: 3 }));
    }

    #[tokio::test]
    async fn insufficient_funds_is_not_retried() {
        let store = Arc::new(MemoryAccountStore::new());
        store.seed(UserId::new("u1"), 10);
        let ledger = Ledger::with_max_retries(store.clone(), 1);

        let result = ledger.guarded_debit(&UserId::new("u1"), 11).await;
        assert_eq!(result, Err(LedgerError::InsufficientFunds));
        assert_eq!(ledger.get_balance(&UserId::new("u1")).await.unwrap().points(), 10);
    }

    #[tokio::test]
    async fn get_balance_does_not_persist() {
        let store = Arc::new(MemoryAccountStore::new());
        let ledger = Ledger::new(store.clone());

        let account = ledger.get_balance(&UserId::new("ghost")).await.unwrap();
        assert_eq!(account.points(), 0);
        assert!(store.load(&UserId::new("ghost")).await.unwrap().is_none());
    }
}
