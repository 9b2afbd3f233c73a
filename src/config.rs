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

//! Loyalty program policy.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// Tunable constants of the loyalty program.
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | CURRENCY_UNITS_PER_POINT | 10 | Spend needed for one point |
/// | POINTS_AMOUNT_CAP | 200 | Largest amount that still earns points |
/// | FALLBACK_AMOUNT | 10 | Amount credited when none could be read |
/// | DAILY_RECEIPT_LIMIT | 3 | Accepted receipts per member per local day |
/// | MAX_RECEIPT_AGE_DAYS | 2 | Oldest accepted receipt, in calendar days |
/// | FUTURE_TOLERANCE_DAYS | 1 | Apparent futureness tolerated from parsing noise |
/// | MERCHANT_MIN_CONFIDENCE | 0.5 | Extractor confidence needed to call a mismatch |
/// | BRAND_ALIASES | burger king,bk | Comma separated merchant spellings |
/// | DEFAULT_CUSTOM_REWARD_COST | 100 | Cost of legacy rewards sent without one |
/// | EXTRACTOR_TIMEOUT_MS | 10000 | Upper bound on one extractor call |
/// | LEDGER_MAX_RETRIES | 64 | Compare-and-set attempts before giving up |
/// | MAX_UPLOAD_BYTES | 10485760 | Largest accepted request body |
/// | USER_ID_HEADER | x-user-id | Header carrying the resolved member id |
#[derive(Debug, Clone)]
pub struct LoyaltyConfig {
    pub currency_units_per_point: Decimal,
    pub points_amount_cap: Decimal,
    pub fallback_amount: Decimal,
    pub daily_receipt_limit: usize,
    pub max_receipt_age_days: i64,
    pub future_tolerance_days: i64,
    pub merchant_min_confidence: f32,
    pub brand_aliases: Vec<String>,
    pub default_custom_reward_cost: u64,
    pub extractor_timeout: Duration,
    pub ledger_max_retries: u32,
    pub max_upload_bytes: usize,
    pub user_id_header: String,
}

impl LoyaltyConfig {
    /// Loads the policy from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            currency_units_per_point: env_or(
                "CURRENCY_UNITS_PER_POINT",
                defaults.currency_units_per_point,
            ),
            points_amount_cap: env_or("POINTS_AMOUNT_CAP", defaults.points_amount_cap),
            fallback_amount: env_or("FALLBACK_AMOUNT", defaults.fallback_amount),
            daily_receipt_limit: env_or("DAILY_RECEIPT_LIMIT", defaults.daily_receipt_limit),
            max_receipt_age_days: env_or("MAX_RECEIPT_AGE_DAYS", defaults.max_receipt_age_days),
            future_tolerance_days: env_or("FUTURE_TOLERANCE_DAYS", defaults.future_tolerance_days),
            merchant_min_confidence: env_or(
                "MERCHANT_MIN_CONFIDENCE",
                defaults.merchant_min_confidence,
            ),
            brand_aliases: std::env::var("BRAND_ALIASES")
                .ok()
                .map(|raw| parse_aliases(&raw))
                .filter(|aliases| !aliases.is_empty())
                .unwrap_or(defaults.brand_aliases),
            default_custom_reward_cost: env_or(
                "DEFAULT_CUSTOM_REWARD_COST",
                defaults.default_custom_reward_cost,
            ),
            extractor_timeout: std::env::var("EXTRACTOR_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.extractor_timeout),
            ledger_max_retries: env_or("LEDGER_MAX_RETRIES", defaults.ledger_max_retries),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            user_id_header: std::env::var("USER_ID_HEADER")
                .ok()
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(defaults.user_id_header),
        }
    }
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            currency_units_per_point: Decimal::from(10),
            points_amount_cap: Decimal::from(200),
            fallback_amount: Decimal::from(10),
            daily_receipt_limit: 3,
            max_receipt_age_days: 2,
            future_tolerance_days: 1,
            merchant_min_confidence: 0.5,
            brand_aliases: vec!["burger king".to_string(), "bk".to_string()],
            default_custom_reward_cost: 100,
            extractor_timeout: Duration::from_secs(10),
            ledger_max_retries: 64,
            max_upload_bytes: 10 * 1024 * 1024,
            user_id_header: "x-user-id".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_aliases(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|alias| alias.trim().to_string())
        .filter(|alias| !alias.is_empty())
        .collect()
}
