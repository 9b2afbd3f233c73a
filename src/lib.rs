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

//! # Crown Ledger
//!
//! This library provides the loyalty engine behind the "crowns" program:
//! members photograph purchase receipts to earn points and spend those
//! points on rewards that staff redeem in person.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Sole writer of point balances; atomic credits and guarded debits
//! - [`ReceiptPipeline`]: Decides whether a receipt photo earns points
//! - [`RewardDesk`]: Issues reward tokens and redeems each exactly once
//! - [`store`]: Persistence boundaries, with in-memory versions in [`memory`]
//! - [`api`]: HTTP surface for the web clients
//!
//! ## Example
//!
//! ```
//! use crown_ledger::{Ledger, UserId, memory::MemoryAccountStore};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ledger = Ledger::new(Arc::new(MemoryAccountStore::new()));
//! let alice = UserId::new("alice");
//!
//! ledger.apply_delta(&alice, 4).await.unwrap();
//! let account = ledger.guarded_debit(&alice, 3).await.unwrap();
//! assert_eq!(account.points(), 1);
//! # });
//! ```
//!
//! ## Thread Safety
//!
//! Handlers share nothing but the stores. Balance updates are
//! compare-and-set loops, so concurrent requests for the same member never
//! lose an update.

pub mod account;
pub mod api;
mod base;
pub mod clock;
pub mod config;
pub mod date;
pub mod error;
pub mod extractor;
mod ledger;
pub mod memory;
pub mod pipeline;
mod receipt;
mod redemption;
pub mod reward;
pub mod store;

pub use account::Account;
pub use base::{Fingerprint, ReceiptId, RewardId, UserId};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::LoyaltyConfig;
pub use error::{ExtractionError, LedgerError, StoreError};
pub use extractor::{DocumentExtractor, Extraction, HttpExtractor, MerchantMatch, UnavailableExtractor};
pub use ledger::Ledger;
pub use pipeline::{ReceiptPipeline, Submission, SubmissionOutcome};
pub use receipt::{Reason, ReasonCode, Receipt};
pub use redemption::{IssuedReward, RedemptionResult, RewardDesk};
pub use reward::{Reward, RewardRequest, RewardTier};
