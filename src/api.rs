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

//! REST API for the loyalty web clients.
//!
//! ## Endpoints
//!
//! - `GET /balance` - Points of the calling member
//! - `GET /rewards` - Reward history of the calling member, newest first
//! - `POST /upload-receipt` - Submit a receipt photo for points
//! - `POST /redeem-reward` - Spend points on a tier (or a legacy custom reward)
//! - `POST|GET /validate-reward` - Staff check-and-redeem of a reward token
//! - `GET /health` - Liveness probe
//!
//! The calling member is identified by a header (default `x-user-id`) set
//! by the upstream identity layer.
//!
//! ## Example Usage
//!
//! ```bash
//! curl -H "x-user-id: alice" http://localhost:3000/balance
//!
//! curl -X POST http://localhost:3000/redeem-reward \
//!   -H "x-user-id: alice" -H "Content-Type: application/json" \
//!   -d '{"tier": "bronze"}'
//!
//! curl "http://localhost:3000/validate-reward?rewardId=CROWN-REWARD:<id>"
//! ```

use crate::base::UserId;
use crate::clock::Clock;
use crate::config::LoyaltyConfig;
use crate::error::LedgerError;
use crate::extractor::DocumentExtractor;
use crate::ledger::Ledger;
use crate::pipeline::{ReceiptPipeline, Submission, SubmissionOutcome};
use crate::receipt::{Reason, ReasonCode};
use crate::redemption::{RedemptionResult, RewardDesk};
use crate::reward::{Reward, RewardRequest, RewardTier, parse_reward_reference};
use crate::store::{AccountStore, BlobStore, ReceiptStore, RewardStore};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, FromRequestParts, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

// === Application State ===

/// External collaborators the service is wired to.
pub struct Backends {
    pub accounts: Arc<dyn AccountStore>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub rewards: Arc<dyn RewardStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub extractor: Arc<dyn DocumentExtractor>,
    pub clock: Arc<dyn Clock>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub pipeline: ReceiptPipeline,
    pub desk: RewardDesk,
    pub config: Arc<LoyaltyConfig>,
}

impl AppState {
    pub fn new(config: LoyaltyConfig, backends: Backends) -> Self {
        let config = Arc::new(config);
        let ledger = Ledger::with_max_retries(backends.accounts, config.ledger_max_retries);
        let pipeline = ReceiptPipeline::new(
            backends.receipts,
            backends.blobs,
            backends.extractor,
            ledger.clone(),
            backends.clock.clone(),
            config.clone(),
        );
        let desk = RewardDesk::new(
            backends.rewards,
            ledger.clone(),
            backends.clock,
            config.default_custom_reward_cost,
        );
        Self {
            ledger,
            pipeline,
            desk,
            config,
        }
    }
}

// === Error Handling ===

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

/// Request-scoped failures, each mapped to a status and a stable code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("caller identity could not be resolved")]
    Unauthenticated,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("unknown reward tier '{0}'")]
    UnknownTier(String),

    #[error("not enough points for this reward")]
    NotEnoughPoints,

    #[error("reward cost must be positive")]
    InvalidPointsCost,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds => ApiError::NotEnoughPoints,
            LedgerError::InvalidAmount => ApiError::InvalidPointsCost,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::UnknownTier(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_TIER"),
            ApiError::NotEnoughPoints => (StatusCode::BAD_REQUEST, "NOT_ENOUGH_POINTS"),
            ApiError::InvalidPointsCost => (StatusCode::BAD_REQUEST, "INVALID_POINTS_COST"),
            ApiError::Internal(detail) => {
                // Logged, never echoed to the client.
                error!(error = %detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        let message = match &self {
            ApiError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error: code, message })).into_response()
    }
}

// === Caller Identity ===

/// The member making the request, resolved from the identity header.
#[derive(Debug, Clone)]
pub struct Caller(pub UserId);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(state.config.user_id_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Caller(UserId::new(value)))
            .ok_or(ApiError::Unauthenticated)
    }
}

// === Request/Response DTOs ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub points: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardView {
    pub id: String,
    pub name: String,
    pub points_cost: u64,
    pub redeemed: bool,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub tier: Option<RewardTier>,
}

impl From<Reward> for RewardView {
    fn from(reward: Reward) -> Self {
        Self {
            id: reward.id.to_string(),
            name: reward.name,
            points_cost: reward.points_cost,
            redeemed: reward.redeemed,
            created_at: reward.created_at,
            redeemed_at: reward.redeemed_at,
            tier: reward.tier,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RewardHistoryResponse {
    pub rewards: Vec<RewardView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub file_base64: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub points_earned: u64,
    pub new_balance: u64,
    pub receipt_id: String,
    pub receipt_blob_url: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub raw_date_text: Option<String>,
    pub merchant_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Reason>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionResponse {
    pub error: &'static str,
    pub reasons: Vec<Reason>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    pub transaction_date: Option<NaiveDate>,
    pub raw_date_text: Option<String>,
    pub merchant_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub tier: Option<String>,
    pub reward_name: Option<String>,
    pub points_cost: Option<u64>,
}

impl RedeemRequest {
    fn into_reward_request(self) -> Result<RewardRequest, ApiError> {
        if let Some(tier) = self.tier.filter(|t| !t.trim().is_empty()) {
            return tier
                .parse::<RewardTier>()
                .map(RewardRequest::Tier)
                .map_err(|e| ApiError::UnknownTier(e.0));
        }
        match self.reward_name.filter(|n| !n.trim().is_empty()) {
            Some(name) => Ok(RewardRequest::Custom {
                name: name.trim().to_string(),
                points_cost: self.points_cost,
            }),
            None => Err(ApiError::InvalidRequest(
                "either tier or rewardName is required".into(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub reward_id: String,
    pub reward_name: String,
    pub points_cost: u64,
    pub new_balance: u64,
    pub qr_payload: String,
    pub short_code: String,
    pub tier: Option<RewardTier>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub reward_id: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
}

// === Handlers ===

async fn health() -> &'static str {
    "ok"
}

/// GET /balance
async fn get_balance(
    State(state): State<AppState>,
    Caller(user_id): Caller,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state.ledger.get_balance(&user_id).await?;
    Ok(Json(BalanceResponse {
        user_id,
        points: account.points(),
    }))
}

/// GET /rewards
async fn list_rewards(
    State(state): State<AppState>,
    Caller(user_id): Caller,
) -> Result<Json<RewardHistoryResponse>, ApiError> {
    let rewards = state.desk.history(&user_id).await?;
    Ok(Json(RewardHistoryResponse {
        rewards: rewards.into_iter().map(RewardView::from).collect(),
    }))
}

/// POST /upload-receipt
async fn upload_receipt(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let encoded = request
        .file_base64
        .as_deref()
        .map(strip_data_url)
        .filter(|b64| !b64.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("fileBase64 is required".into()))?;
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| ApiError::InvalidRequest(format!("fileBase64 is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(ApiError::InvalidRequest("uploaded file is empty".into()));
    }

    let submission = Submission {
        user_id: user_id.clone(),
        file_name: request.file_name.unwrap_or_else(|| "receipt".to_string()),
        content_type: request
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        bytes,
    };

    let response = match state.pipeline.submit(submission).await? {
        SubmissionOutcome::Accepted(accepted) => {
            let receipt = accepted.receipt;
            Json(UploadResponse {
                user_id,
                amount: receipt.amount,
                points_earned: receipt.points_earned,
                new_balance: accepted.new_balance,
                receipt_id: receipt.id.to_string(),
                receipt_blob_url: receipt.blob_url,
                transaction_date: receipt.transaction_date,
                raw_date_text: receipt.raw_date_text,
                merchant_name: receipt.merchant_name,
                warnings: accepted.advisories,
            })
            .into_response()
        }
        SubmissionOutcome::Duplicate { .. } => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: ReasonCode::DuplicateReceipt.as_str(),
                message: "This receipt has already been submitted.".to_string(),
            }),
        )
            .into_response(),
        SubmissionOutcome::DailyLimitReached { limit } => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: ReasonCode::DailyLimitReached.as_str(),
                message: format!("Only {limit} receipts can be submitted per day."),
            }),
        )
            .into_response(),
        SubmissionOutcome::Rejected(rejected) => (
            StatusCode::BAD_REQUEST,
            Json(RejectionResponse {
                error: "RECEIPT_REJECTED",
                reasons: rejected.reasons,
                amount: rejected.fields.amount,
                transaction_date: rejected.fields.transaction_date,
                raw_date_text: rejected.fields.raw_date_text,
                merchant_name: rejected.fields.merchant_name,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

/// POST /redeem-reward
async fn redeem_reward(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    payload: Result<Json<RedeemRequest>, JsonRejection>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let Json(request) = payload?;
    let request = request.into_reward_request()?;
    let issued = state.desk.issue_reward(&user_id, &request).await?;
    let reward = issued.reward;

    Ok(Json(RedeemResponse {
        reward_id: reward.id.to_string(),
        qr_payload: reward.qr_payload(),
        short_code: reward.short_code(),
        reward_name: reward.name,
        points_cost: reward.points_cost,
        new_balance: issued.new_balance,
        tier: reward.tier,
    }))
}

/// POST /validate-reward
async fn validate_reward_body(
    State(state): State<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    validate_reward(&state, request.reward_id.as_deref()).await
}

/// GET /validate-reward?rewardId=
async fn validate_reward_query(
    State(state): State<AppState>,
    query: Result<Query<ValidateRequest>, QueryRejection>,
) -> Result<Response, ApiError> {
    let request = query.map(|Query(q)| q).unwrap_or_default();
    validate_reward(&state, request.reward_id.as_deref()).await
}

async fn validate_reward(state: &AppState, reward_id: Option<&str>) -> Result<Response, ApiError> {
    let Some(reference) = reward_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ValidateResponse {
                reason: Some("MISSING_ID"),
                ..ValidateResponse::default()
            }),
        )
            .into_response());
    };

    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            Json(ValidateResponse {
                reason: Some("NOT_FOUND"),
                ..ValidateResponse::default()
            }),
        )
            .into_response()
    };

    // A reference that is not an id cannot name a stored reward.
    let Some(id) = parse_reward_reference(reference) else {
        return Ok(not_found());
    };

    let response = match state.desk.redeem_reward(&id).await? {
        RedemptionResult::Valid(reward) => Json(ValidateResponse {
            valid: true,
            reward_name: Some(reward.name),
            user_id: Some(reward.user_id),
            ..ValidateResponse::default()
        })
        .into_response(),
        RedemptionResult::AlreadyRedeemed(reward) => (
            StatusCode::CONFLICT,
            Json(ValidateResponse {
                reason: Some("ALREADY_REDEEMED"),
                reward_name: Some(reward.name),
                redeemed_at: reward.redeemed_at,
                ..ValidateResponse::default()
            }),
        )
            .into_response(),
        RedemptionResult::NotFound => not_found(),
    };
    Ok(response)
}

/// Accepts both bare base64 and `data:<mime>;base64,<payload>` URLs.
fn strip_data_url(input: &str) -> &str {
    let input = input.trim();
    match input.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => input,
    }
}

// === Router ===

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/balance", get(get_balance))
        .route("/rewards", get(list_rewards))
        .route("/upload-receipt", post(upload_receipt))
        .route("/redeem-reward", post(redeem_reward))
        .route(
            "/validate-reward",
            get(validate_reward_query).post(validate_reward_body),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
