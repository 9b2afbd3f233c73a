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

//! Error types for ledger, store and extractor failures.

use thiserror::Error;

/// Balance mutation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Debit amount is zero
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Debit would leave the balance negative
    #[error("insufficient points")]
    InsufficientFunds,

    /// Compare-and-set kept losing to concurrent writers
    #[error("balance update abandoned after {attempts} conflicting attempts")]
    Contention { attempts: u32 },

    /// Underlying account store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures reported by the persistence collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A receipt with the same image fingerprint already exists
    #[error("receipt fingerprint already recorded")]
    DuplicateFingerprint,

    /// A record with the same identifier already exists
    #[error("record already exists: {0}")]
    Conflict(String),
}

/// Document extractor failures.
///
/// These never abort a submission; the pipeline treats every extracted
/// field as absent instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("extractor request failed: {0}")]
    Transport(String),

    #[error("extractor did not answer within {0} ms")]
    Timeout(u64),

    #[error("extractor returned an unreadable document: {0}")]
    Malformed(String),

    #[error("no document extractor configured")]
    NotConfigured,
}
