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

//! Receipt validation pipeline.
//!
//! Rules run in priority order:
//!
//! | # | Rule | Outcome on failure |
//! |---|------|--------------------|
//! | 1 | Image fingerprint already known | `DUPLICATE_RECEIPT`, extractor never called |
//! | 2 | Extraction | never fails; fields become absent |
//! | 3 | Merchant is the brand | `MERCHANT_NOT_BURGER_KING` (unknown passes) |
//! | 4 | Date resolvable and recent | `DATE_NOT_DETECTED`, `RECEIPT_TOO_OLD`, `RECEIPT_IN_FUTURE` |
//! | 5 | Positive amount | fallback amount + `INVALID_AMOUNT` advisory |
//! | 6 | Daily cap | `DAILY_LIMIT_REACHED` |
//!
//! Accepted receipts are stored and credited through the [`Ledger`]. If the
//! credit fails the receipt and its image are withdrawn again.

use crate::base::{Fingerprint, ReceiptId, UserId};
use crate::clock::Clock;
use crate::config::LoyaltyConfig;
use crate::date::{age_in_days, resolve_transaction_date};
use crate::error::{ExtractionError, LedgerError, StoreError};
use crate::extractor::{DocumentExtractor, Extraction, MerchantMatch};
use crate::ledger::Ledger;
use crate::receipt::{Reason, ReasonCode, Receipt};
use crate::store::{BlobStore, ReceiptStore};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A receipt photo submitted by a member.
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_id: UserId,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Fields echoed back to the member, whatever the outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportedFields {
    /// Extracted amount; `None` when nothing usable was read.
    pub amount: Option<Decimal>,
    pub merchant_name: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub raw_date_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedReceipt {
    pub receipt: Receipt,
    pub new_balance: u64,
    /// Non-blocking reasons, e.g. `INVALID_AMOUNT`.
    pub advisories: Vec<Reason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedReceipt {
    pub reasons: Vec<Reason>,
    pub fields: ReportedFields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted(AcceptedReceipt),
    Duplicate { fingerprint: Fingerprint },
    DailyLimitReached { limit: usize },
    Rejected(RejectedReceipt),
}

/// Verdict of the content rules (merchant, date, amount) for one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub blocking: Vec<Reason>,
    pub advisories: Vec<Reason>,
    /// Amount to store: the extracted one, or the fallback.
    pub amount: Decimal,
    pub fields: ReportedFields,
}

/// Applies the merchant, date and amount rules.
///
/// Pure: no store access, `today` is the local calendar day.
pub fn evaluate(extraction: &Extraction, today: NaiveDate, config: &LoyaltyConfig) -> Evaluation {
    let mut reasons = Vec::new();

    if MerchantMatch::classify(
        extraction,
        &config.brand_aliases,
        config.merchant_min_confidence,
    ) == MerchantMatch::Mismatch
    {
        reasons.push(Reason::new(
            ReasonCode::MerchantNotBurgerKing,
            "The receipt does not come from a Burger King restaurant.",
        ));
    }

    let resolved = resolve_transaction_date(
        extraction.raw_date_text.as_deref(),
        extraction.transaction_date,
        today,
    );
    match resolved {
        None => reasons.push(Reason::new(
            ReasonCode::DateNotDetected,
            "The purchase date could not be read from the receipt.",
        )),
        Some(resolved) => {
            let age = age_in_days(resolved.date, today);
            if age > config.max_receipt_age_days {
                reasons.push(Reason::new(
                    ReasonCode::ReceiptTooOld,
                    format!(
                        "The receipt is {age} days old; only receipts from the last {} days are accepted.",
                        config.max_receipt_age_days
                    ),
                ));
            } else if -age > config.future_tolerance_days {
                reasons.push(Reason::new(
                    ReasonCode::ReceiptInFuture,
                    "The receipt date is in the future.",
                ));
            }
        }
    }

    let extracted_amount = extraction
        .total_amount
        .filter(|amount| *amount > Decimal::ZERO);
    let amount = match extracted_amount {
        Some(amount) => amount,
        None => {
            reasons.push(Reason::new(
                ReasonCode::InvalidAmount,
                "The total could not be read; a standard amount was credited instead.",
            ));
            config.fallback_amount
        }
    };

    let (blocking, advisories): (Vec<Reason>, Vec<Reason>) =
        reasons.into_iter().partition(|r| r.code.is_blocking());

    Evaluation {
        blocking,
        advisories,
        amount,
        fields: ReportedFields {
            amount: extracted_amount,
            merchant_name: extraction.merchant_name.clone(),
            transaction_date: resolved.map(|r| r.date),
            raw_date_text: extraction.raw_date_text.clone(),
        },
    }
}

/// `floor(min(amount, cap) / units_per_point)`.
pub fn points_for(amount: Decimal, config: &LoyaltyConfig) -> u64 {
    if config.currency_units_per_point <= Decimal::ZERO || amount <= Decimal::ZERO {
        return 0;
    }
    (amount.min(config.points_amount_cap) / config.currency_units_per_point)
        .floor()
        .to_u64()
        .unwrap_or(0)
}

/// Validates submissions and credits accepted ones.
#[derive(Clone)]
pub struct ReceiptPipeline {
    receipts: Arc<dyn ReceiptStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn DocumentExtractor>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    config: Arc<LoyaltyConfig>,
}

impl ReceiptPipeline {
    pub fn new(
        receipts: Arc<dyn ReceiptStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn DocumentExtractor>,
        ledger: Ledger,
        clock: Arc<dyn Clock>,
        config: Arc<LoyaltyConfig>,
    ) -> Self {
        Self {
            receipts,
            blobs,
            extractor,
            ledger,
            clock,
            config,
        }
    }

    /// Runs every rule against `submission` and, on acceptance, stores the
    /// receipt and credits the points.
    ///
    /// Rejections are returned as [`SubmissionOutcome`] values. Only store
    /// failures surface as errors; nothing is mutated on a rejection.
    pub async fn submit(&self, submission: Submission) -> Result<SubmissionOutcome, LedgerError> {
        let fingerprint = Fingerprint::of(&submission.bytes);
        let user_id = submission.user_id.clone();

        if self.receipts.find_by_fingerprint(&fingerprint).await?.is_some() {
            warn!(user = %user_id, %fingerprint, "duplicate receipt image");
            return Ok(SubmissionOutcome::Duplicate { fingerprint });
        }

        let extraction = self.extract(&submission).await;
        let today = self.clock.today();
        let mut evaluation = evaluate(&extraction, today, &self.config);

        let (day_start, day_end) = self.clock.today_bounds();
        let accepted_today = self
            .receipts
            .count_for_user_between(&user_id, day_start, day_end)
            .await?;
        let limit = self.config.daily_receipt_limit;
        if accepted_today >= limit {
            if evaluation.blocking.is_empty() {
                warn!(user = %user_id, accepted_today, "daily receipt limit reached");
                return Ok(SubmissionOutcome::DailyLimitReached { limit });
            }
            evaluation.blocking.push(Reason::new(
                ReasonCode::DailyLimitReached,
                format!("Only {limit} receipts can be submitted per day."),
            ));
        }

        if !evaluation.blocking.is_empty() {
            let codes: Vec<&str> = evaluation.blocking.iter().map(|r| r.code.as_str()).collect();
            warn!(user = %user_id, reasons = ?codes, "receipt rejected");
            return Ok(SubmissionOutcome::Rejected(RejectedReceipt {
                reasons: evaluation.blocking,
                fields: evaluation.fields,
            }));
        }

        let points = points_for(evaluation.amount, &self.config);
        let receipt_id = ReceiptId::generate();
        let blob_key = format!(
            "{}/{}{}",
            user_id,
            receipt_id,
            extension_of(&submission.file_name)
        );
        let blob_url = self
            .blobs
            .put(&blob_key, &submission.content_type, submission.bytes)
            .await?;

        let receipt = Receipt {
            id: receipt_id,
            user_id: user_id.clone(),
            image_fingerprint: fingerprint.clone(),
            amount: evaluation.amount,
            points_earned: points,
            merchant_name: evaluation.fields.merchant_name,
            transaction_date: evaluation.fields.transaction_date,
            raw_date_text: evaluation.fields.raw_date_text,
            blob_url: Some(blob_url),
            created_at: self.clock.now_utc(),
        };

        if let Err(e) = self.receipts.insert(receipt.clone()).await {
            self.discard_image(&blob_key).await;
            // Lost the race against an identical upload.
            if matches!(e, StoreError::DuplicateFingerprint) {
                warn!(user = %user_id, %fingerprint, "duplicate receipt image caught on insert");
                return Ok(SubmissionOutcome::Duplicate { fingerprint });
            }
            return Err(e.into());
        }

        // A stored receipt always has its points credited.
        let account = match self.ledger.apply_delta(&user_id, points as i64).await {
            Ok(account) => account,
            Err(e) => {
                error!(user = %user_id, receipt = %receipt.id, error = %e, "credit failed, withdrawing receipt");
                if let Err(remove) = self.receipts.remove(&fingerprint).await {
                    error!(receipt = %receipt.id, error = %remove, "receipt could not be withdrawn");
                }
                self.discard_image(&blob_key).await;
                return Err(e);
            }
        };

        info!(
            user = %user_id,
            receipt = %receipt.id,
            amount = %receipt.amount,
            points,
            balance = account.points(),
            "receipt accepted"
        );

        Ok(SubmissionOutcome::Accepted(AcceptedReceipt {
            receipt,
            new_balance: account.points(),
            advisories: evaluation.advisories,
        }))
    }

    async fn discard_image(&self, key: &str) {
        if let Err(e) = self.blobs.delete(key).await {
            warn!(key, error = %e, "receipt image left orphaned");
        }
    }

    async fn extract(&self, submission: &Submission) -> Extraction {
        let timeout = self.config.extractor_timeout;
        let result = match tokio::time::timeout(
            timeout,
            self.extractor
                .extract(&submission.bytes, &submission.content_type),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::Timeout(timeout.as_millis() as u64)),
        };

        result.unwrap_or_else(|e| {
            warn!(user = %submission.user_id, error = %e, "extraction failed, continuing without fields");
            Extraction::default()
        })
    }
}

fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 3).unwrap()
    }

    fn good() -> Extraction {
        Extraction {
            total_amount: Some(dec!(42.50)),
            merchant_name: Some("Burger King".into()),
            merchant_confidence: Some(0.99),
            transaction_date: None,
            raw_date_text: Some("03/04/2025".into()),
        }
    }

    fn codes(reasons: &[Reason]) -> Vec<ReasonCode> {
        reasons.iter().map(|r| r.code).collect()
    }

    #[test]
    fn clean_receipt_passes() {
        let evaluation = evaluate(&good(), today(), &LoyaltyConfig::default());
        assert!(evaluation.blocking.is_empty());
        assert!(evaluation.advisories.is_empty());
        assert_eq!(evaluation.amount, dec!(42.50));
        assert_eq!(evaluation.fields.transaction_date, Some(today()));
    }

    #[test]
    fn empty_extraction_is_rejected_for_date_only() {
        let evaluation = evaluate(&Extraction::default(), today(), &LoyaltyConfig::default());
        assert_eq!(codes(&evaluation.blocking), vec![ReasonCode::DateNotDetected]);
        assert_eq!(codes(&evaluation.advisories), vec![ReasonCode::InvalidAmount]);
        assert_eq!(evaluation.amount, dec!(10));
        assert_eq!(evaluation.fields.amount, None);
    }

    #[test]
    fn mismatch_and_old_date_are_both_reported() {
        let extraction = Extraction {
            merchant_name: Some("Pizza Palace".into()),
            raw_date_text: Some("25/03/2025".into()),
            ..good()
        };
        let evaluation = evaluate(&extraction, today(), &LoyaltyConfig::default());
        assert_eq!(
            codes(&evaluation.blocking),
            vec![ReasonCode::MerchantNotBurgerKing, ReasonCode::ReceiptTooOld]
        );
    }

    #[test]
    fn two_day_old_receipt_is_still_fresh() {
        let extraction = Extraction {
            raw_date_text: Some("01/04/2025".into()),
            ..good()
        };
        let evaluation = evaluate(&extraction, today(), &LoyaltyConfig::default());
        assert!(evaluation.blocking.is_empty());
    }

    #[test]
    fn small_future_skew_is_tolerated() {
        let tomorrow = Extraction {
            raw_date_text: None,
            transaction_date: Some(NaiveDate::from_ymd_opt(2025, 4, 4).unwrap()),
            ..good()
        };
        assert!(evaluate(&tomorrow, today(), &LoyaltyConfig::default()).blocking.is_empty());

        let later = Extraction {
            raw_date_text: None,
            transaction_date: Some(NaiveDate::from_ymd_opt(2025, 4, 6).unwrap()),
            ..good()
        };
        assert_eq!(
            codes(&evaluate(&later, today(), &LoyaltyConfig::default()).blocking),
            vec![ReasonCode::ReceiptInFuture]
        );
    }

    #[test]
    fn non_positive_amount_uses_fallback() {
        let extraction = Extraction {
            total_amount: Some(dec!(-3)),
            ..good()
        };
        let evaluation = evaluate(&extraction, today(), &LoyaltyConfig::default());
        assert!(evaluation.blocking.is_empty());
        assert_eq!(codes(&evaluation.advisories), vec![ReasonCode::InvalidAmount]);
        assert_eq!(evaluation.amount, dec!(10));
    }

    #[test]
    fn points_are_floored_and_capped() {
        let config = LoyaltyConfig::default();
        assert_eq!(points_for(dec!(42.50), &config), 4);
        assert_eq!(points_for(dec!(9.99), &config), 0);
        assert_eq!(points_for(dec!(200), &config), 20);
        assert_eq!(points_for(dec!(1000), &config), 20);
        assert_eq!(points_for(Decimal::ZERO, &config), 0);
    }

    #[test]
    fn extension_is_sanitised() {
        assert_eq!(extension_of("IMG_0042.JPG"), ".jpg");
        assert_eq!(extension_of("receipt"), "");
        assert_eq!(extension_of("../../etc/passwd"), "");
    }
}
