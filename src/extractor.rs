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

//! Document extraction boundary.
//!
//! An extractor turns receipt image bytes into best-effort fields. Any field
//! may be missing, and the call itself may fail; the validation pipeline
//! handles both as data.

use crate::error::ExtractionError;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fields read off a receipt. Everything is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Extraction {
    pub total_amount: Option<Decimal>,
    pub merchant_name: Option<String>,
    /// Extractor confidence in `merchant_name`, `0.0..=1.0`.
    pub merchant_confidence: Option<f32>,
    pub transaction_date: Option<NaiveDate>,
    /// Date exactly as printed, e.g. `"13/02/2025"`.
    pub raw_date_text: Option<String>,
}

/// Tri-state merchant verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerchantMatch {
    Confirmed,
    Mismatch,
    Unknown,
}

impl MerchantMatch {
    /// Classifies the extracted merchant against the brand's spellings.
    ///
    /// Names and aliases are compared as lowercase alphanumeric words, so an
    /// alias only matches whole words of the name (`"BK #12"` matches `bk`,
    /// `"Cobb Kitchen"` does not). A multi-word alias also matches its words
    /// run together (`"BurgerKing"`). A non-matching name only counts as a
    /// mismatch when the extractor is confident enough (or gave no confidence
    /// at all).
    pub fn classify(extraction: &Extraction, aliases: &[String], min_confidence: f32) -> Self {
        let Some(name) = extraction.merchant_name.as_deref() else {
            return MerchantMatch::Unknown;
        };
        let words = words(name);
        if words.is_empty() {
            return MerchantMatch::Unknown;
        }
        if aliases.iter().any(|alias| contains_alias(&words, alias)) {
            return MerchantMatch::Confirmed;
        }
        match extraction.merchant_confidence {
            Some(confidence) if confidence < min_confidence => MerchantMatch::Unknown,
            _ => MerchantMatch::Mismatch,
        }
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_alias(name: &[String], alias: &str) -> bool {
    let alias = words(alias);
    if alias.is_empty() {
        return false;
    }
    let joined = alias.concat();
    name.windows(alias.len()).any(|window| window == alias.as_slice())
        || name.iter().any(|word| *word == joined)
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<Extraction, ExtractionError>;
}

/// Extractor used when none is configured; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableExtractor;

#[async_trait]
impl DocumentExtractor for UnavailableExtractor {
    async fn extract(&self, _bytes: &[u8], _content_type: &str) -> Result<Extraction, ExtractionError> {
        Err(ExtractionError::NotConfigured)
    }
}

/// Posts the raw image to an HTTP extraction endpoint that answers with an
/// [`Extraction`] JSON document.
#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExtractor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl DocumentExtractor for HttpExtractor {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<Extraction, ExtractionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractionError::Transport(format!(
                "extractor answered {}",
                response.status()
            )));
        }

        response
            .json::<Extraction>()
            .await
            .map_err(|e| ExtractionError::Malformed(e.to_string()))
    }
}
