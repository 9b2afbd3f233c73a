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

//! Receipt date resolution.
//!
//! Printed receipts use `D/M/Y` or `M/D/Y` interchangeably. When a numeric
//! token could be either, both readings are built and the one closest to
//! today wins: only near-term dates can pass the recency rule anyway.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4}|\d{2})\b").expect("valid date pattern")
});

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid date pattern"));

/// Where a resolved date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    DayFirst,
    MonthFirst,
    Iso,
    Extractor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: NaiveDate,
    pub source: DateSource,
}

/// Resolves the transaction date from the printed text, falling back to the
/// extractor's structured value.
pub fn resolve_transaction_date(
    raw_text: Option<&str>,
    structured: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<ResolvedDate> {
    raw_text
        .and_then(|text| disambiguate(text, today).or_else(|| parse_iso(text)))
        .or_else(|| {
            structured.map(|date| ResolvedDate {
                date,
                source: DateSource::Extractor,
            })
        })
}

/// Picks the plausible reading closest to `today` among every `A/B/Y` token
/// in `text`.
///
/// Within a token, ties go to the day-first reading; across tokens, to the
/// earlier one.
pub fn disambiguate(text: &str, today: NaiveDate) -> Option<ResolvedDate> {
    NUMERIC_DATE
        .captures_iter(text)
        .filter_map(|captures| {
            let first: u32 = captures[1].parse().ok()?;
            let second: u32 = captures[2].parse().ok()?;
            let year = expand_year(&captures[3])?;
            read_token(first, second, year, today)
        })
        .min_by_key(|resolved| distance(resolved.date, today))
}

fn read_token(first: u32, second: u32, year: i32, today: NaiveDate) -> Option<ResolvedDate> {
    let day_first = NaiveDate::from_ymd_opt(year, second, first).map(|date| ResolvedDate {
        date,
        source: DateSource::DayFirst,
    });
    let month_first = NaiveDate::from_ymd_opt(year, first, second).map(|date| ResolvedDate {
        date,
        source: DateSource::MonthFirst,
    });

    match (day_first, month_first) {
        (Some(d), Some(m)) => {
            if distance(m.date, today) < distance(d.date, today) {
                Some(m)
            } else {
                Some(d)
            }
        }
        (d, m) => d.or(m),
    }
}

fn parse_iso(text: &str) -> Option<ResolvedDate> {
    let captures = ISO_DATE.captures(text)?;
    let date = NaiveDate::from_ymd_opt(
        captures[1].parse().ok()?,
        captures[2].parse().ok()?,
        captures[3].parse().ok()?,
    )?;
    Some(ResolvedDate {
        date,
        source: DateSource::Iso,
    })
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    if raw.len() == 2 { Some(2000 + year) } else { Some(year) }
}

fn distance(date: NaiveDate, today: NaiveDate) -> i64 {
    (date - today).num_days().abs()
}

/// Whole calendar days between `date` and `today`; negative for future dates.
pub fn age_in_days(date: NaiveDate, today: NaiveDate) -> i64 {
    (today - date).num_days()
}
