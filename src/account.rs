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

//! Point balance of a single loyalty member.
//!
//! An [`Account`] is an immutable snapshot: mutations produce the next
//! snapshot with its `version` bumped by one, and the store accepts it only
//! if nobody committed in between.
//!
//! ```text
//!  v0 (unsaved, 0 pts) ──apply(+4)──► v1 (4 pts) ──debit(4)──► v2 (0 pts)
//! ```
//!
//! # Example
//!
//! ```
//! use crown_ledger::{Account, UserId};
//!
//! let account = Account::new(UserId::new("alice"));
//! assert_eq!(account.points(), 0);
//! assert_eq!(account.version(), 0);
//! ```

use crate::base::UserId;
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};

/// Ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    user_id: UserId,
    points: u64,
    /// Number of committed writes. Zero means the account was never saved.
    version: u64,
}

impl Account {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            points: 0,
            version: 0,
        }
    }

    /// Rebuilds a previously committed account, e.g. when loading from a store.
    pub fn restore(user_id: UserId, points: u64, version: u64) -> Self {
        Self {
            user_id,
            points,
            version,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn points(&self) -> u64 {
        self.points
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the snapshot that results from adding `delta` points.
    ///
    /// A negative delta that would take the balance below zero is refused
    /// with [`LedgerError::InsufficientFunds`].
    pub(crate) fn apply(&self, delta: i64) -> Result<Account, LedgerError> {
        let points = match self.points.checked_add_signed(delta) {
            Some(points) => points,
            None if delta < 0 => return Err(LedgerError::InsufficientFunds),
            None => return Err(LedgerError::InvalidAmount),
        };
        Ok(self.next(points))
    }

    /// Returns the snapshot after removing `amount` points.
    pub(crate) fn debit(&self, amount: u64) -> Result<Account, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.points < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        Ok(self.next(self.points - amount))
    }

    fn next(&self, points: u64) -> Account {
        Account {
            user_id: self.user_id.clone(),
            points,
            version: self.version + 1,
        }
    }
}
