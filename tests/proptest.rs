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


//! Property-based tests for the ledger and the receipt rules.
//!
//! These tests verify invariants that should hold for any sequence of
//! balance updates and any receipt amount or date.

use chrono::{Duration, NaiveDate};
use crown_ledger::date::{age_in_days, disambiguate};
use crown_ledger::memory::MemoryAccountStore;
use crown_ledger::pipeline::points_for;
use crown_ledger::{Ledger, LedgerError, LoyaltyConfig, UserId};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// A receipt total between 0.01 and 5000.00.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=500_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// A calendar day between 2020 and 2030.
fn arb_day() -> impl Strategy<Value = NaiveDate> {
    (0i64..4000).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(offset)
    })
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Credit(u32),
    Debit(u32),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..=50).prop_map(Op::Credit),
        (1u32..=80).prop_map(Op::Debit),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// =============================================================================
// Ledger Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Credits alone sum exactly.
    #[test]
    fn credits_sum_to_balance(credits in prop::collection::vec(1i64..=1000, 1..20)) {
        let ledger = Ledger::new(Arc::new(MemoryAccountStore::new()));
        let user = UserId::new("u1");

        let balance = runtime().block_on(async {
            for credit in &credits {
                ledger.apply_delta(&user, *credit).await.unwrap();
            }
            ledger.get_balance(&user).await.unwrap()
        });

        prop_assert_eq!(balance.points() as i64, credits.iter().sum::<i64>());
    }

    /// Any mix of credits and guarded debits matches a reference model,
    /// and a refused debit never changes the balance.
    #[test]
    fn guarded_debits_follow_the_model(ops in prop::collection::vec(arb_op(), 1..40)) {
        let ledger = Ledger::new(Arc::new(MemoryAccountStore::new()));
        let user = UserId::new("u1");
        let mut model: u64 = 0;

        let rt = runtime();
        for op in ops {
            match op {
                Op::Credit(points) => {
                    let account = rt.block_on(ledger.apply_delta(&user, points as i64)).unwrap();
                    model += points as u64;
                    prop_assert_eq!(account.points(), model);
                }
                Op::Debit(points) => {
                    let result = rt.block_on(ledger.guarded_debit(&user, points as u64));
                    if model >= points as u64 {
                        model -= points as u64;
                        prop_assert_eq!(result.unwrap().points(), model);
                    } else {
                        prop_assert_eq!(result, Err(LedgerError::InsufficientFunds));
                    }
                }
            }
        }

        let balance = rt.block_on(ledger.get_balance(&user)).unwrap();
        prop_assert_eq!(balance.points(), model);
    }
}

// =============================================================================
// Receipt Rule Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Points are the floor of the capped amount over the ratio.
    #[test]
    fn points_floor_the_capped_amount(amount in arb_amount()) {
        let config = LoyaltyConfig::default();
        let points = Decimal::from(points_for(amount, &config));
        let basis = amount.min(config.points_amount_cap);

        prop_assert!(points * config.currency_units_per_point <= basis);
        prop_assert!((points + Decimal::ONE) * config.currency_units_per_point > basis);
        prop_assert!(points <= Decimal::from(20));
    }

    /// Points never decrease as the amount grows.
    #[test]
    fn points_are_monotonic(a in arb_amount(), b in arb_amount()) {
        let config = LoyaltyConfig::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(points_for(low, &config) <= points_for(high, &config));
    }

    /// A date printed either way round near today is read back as itself.
    #[test]
    fn recent_dates_are_read_in_either_order(today in arb_day(), offset in -10i64..=10) {
        let printed = today + Duration::days(offset);

        let day_first = printed.format("%d/%m/%Y").to_string();
        let month_first = printed.format("%m/%d/%Y").to_string();

        prop_assert_eq!(disambiguate(&day_first, today).map(|r| r.date), Some(printed));
        prop_assert_eq!(disambiguate(&month_first, today).map(|r| r.date), Some(printed));
        prop_assert_eq!(age_in_days(printed, today), -offset);
    }

    /// Two-digit years land in the 2000s.
    #[test]
    fn short_years_expand(today in arb_day()) {
        let printed = today.format("%d/%m/%y").to_string();
        prop_assert_eq!(disambiguate(&printed, today).map(|r| r.date), Some(today));
    }
}
