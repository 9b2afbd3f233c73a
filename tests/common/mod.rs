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

//! Shared fixtures: scripted extractor, fixed clock and in-memory wiring.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use crown_ledger::api::{AppState, Backends};
use crown_ledger::memory::{
    MemoryAccountStore, MemoryBlobStore, MemoryReceiptStore, MemoryRewardStore,
};
use crown_ledger::{DocumentExtractor, ExtractionError, Extraction, FixedClock, LoyaltyConfig};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 2025-04-03 12:00 in a UTC+0 "local" zone.
pub fn noon() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2025, 4, 3, 12, 0, 0)
        .unwrap()
}

pub fn today() -> NaiveDate {
    noon().date_naive()
}

/// A clean Burger King receipt dated today.
pub fn good_extraction() -> Extraction {
    Extraction {
        total_amount: Some(dec!(42.50)),
        merchant_name: Some("BURGER KING #0231".into()),
        merchant_confidence: Some(0.97),
        transaction_date: None,
        raw_date_text: Some("03/04/2025".into()),
    }
}

/// Extractor whose answer is set by the test.
pub struct ScriptedExtractor {
    answer: Mutex<Result<Extraction, ExtractionError>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new(extraction: Extraction) -> Self {
        Self {
            answer: Mutex::new(Ok(extraction)),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answer(&self, extraction: Extraction) {
        *self.answer.lock() = Ok(extraction);
    }

    pub fn fail(&self, error: ExtractionError) {
        *self.answer.lock() = Err(error);
    }

    pub fn delay(&self, by: Duration) {
        *self.delay.lock() = Some(by);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentExtractor for ScriptedExtractor {
    async fn extract(&self, _bytes: &[u8], _content_type: &str) -> Result<Extraction, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.answer.lock().clone()
    }
}

/// In-memory service with handles on every collaborator.
pub struct Harness {
    pub accounts: Arc<MemoryAccountStore>,
    pub receipts: Arc<MemoryReceiptStore>,
    pub rewards: Arc<MemoryRewardStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub extractor: Arc<ScriptedExtractor>,
    pub clock: Arc<FixedClock>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LoyaltyConfig::default())
    }

    pub fn with_config(config: LoyaltyConfig) -> Self {
        let accounts = Arc::new(MemoryAccountStore::new());
        let receipts = Arc::new(MemoryReceiptStore::new());
        let rewards = Arc::new(MemoryRewardStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let extractor = Arc::new(ScriptedExtractor::new(good_extraction()));
        let clock = Arc::new(FixedClock::new(noon()));

        let state = AppState::new(
            config,
            Backends {
                accounts: accounts.clone(),
                receipts: receipts.clone(),
                rewards: rewards.clone(),
                blobs: blobs.clone(),
                extractor: extractor.clone(),
                clock: clock.clone(),
            },
        );

        Self {
            accounts,
            receipts,
            rewards,
            blobs,
            extractor,
            clock,
            state,
        }
    }
}

/// Distinct fake image bytes.
pub fn image(tag: &str) -> Vec<u8> {
    format!("\u{FF}\u{D8}fake-jpeg-{tag}").into_bytes()
}
