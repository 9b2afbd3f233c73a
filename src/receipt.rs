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

//! Accepted receipts and validation reason codes.

use crate::base::{Fingerprint, ReceiptId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An accepted receipt. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: ReceiptId,
    pub user_id: UserId,
    pub image_fingerprint: Fingerprint,
    /// Uncapped extracted amount, or the fallback amount.
    pub amount: Decimal,
    pub points_earned: u64,
    pub merchant_name: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub raw_date_text: Option<String>,
    pub blob_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Machine-readable outcome of a single validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    DuplicateReceipt,
    MerchantNotBurgerKing,
    DateNotDetected,
    ReceiptTooOld,
    ReceiptInFuture,
    InvalidAmount,
    DailyLimitReached,
}

impl ReasonCode {
    /// Blocking reasons reject the submission; the rest are advisories.
    pub fn is_blocking(self) -> bool {
        !matches!(self, ReasonCode::InvalidAmount)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::DuplicateReceipt => "DUPLICATE_RECEIPT",
            ReasonCode::MerchantNotBurgerKing => "MERCHANT_NOT_BURGER_KING",
            ReasonCode::DateNotDetected => "DATE_NOT_DETECTED",
            ReasonCode::ReceiptTooOld => "RECEIPT_TOO_OLD",
            ReasonCode::ReceiptInFuture => "RECEIPT_IN_FUTURE",
            ReasonCode::InvalidAmount => "INVALID_AMOUNT",
            ReasonCode::DailyLimitReached => "DAILY_LIMIT_REACHED",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reason code with its human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: ReasonCode,
    pub message: String,
}

impl Reason {
    pub fn new(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
