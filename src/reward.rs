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

//! Reward tokens and the tier catalog.
//!
//! Rewards follow a two-state machine:
//!
//! ```text
//!  Issued ──redeem──► Redeemed (terminal)
//! ```

use crate::base::{RewardId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix of the scannable payload shown to staff.
pub const QR_PREFIX: &str = "CROWN-REWARD:";

/// Length of the human-typeable short code.
const SHORT_CODE_LEN: usize = 8;

/// Catalog tiers with a fixed name and cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardTier {
    Bronze,
    Silver,
    Gold,
}

impl RewardTier {
    pub const ALL: [RewardTier; 3] = [RewardTier::Bronze, RewardTier::Silver, RewardTier::Gold];

    pub fn name(self) -> &'static str {
        match self {
            RewardTier::Bronze => "Free medium drink",
            RewardTier::Silver => "Free medium fries",
            RewardTier::Gold => "Free Whopper",
        }
    }

    pub fn points_cost(self) -> u64 {
        match self {
            RewardTier::Bronze => 40,
            RewardTier::Silver => 80,
            RewardTier::Gold => 150,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RewardTier::Bronze => "bronze",
            RewardTier::Silver => "silver",
            RewardTier::Gold => "gold",
        }
    }
}

impl fmt::Display for RewardTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag that does not name a catalog tier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reward tier '{0}'")]
pub struct UnknownTier(pub String);

impl FromStr for RewardTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bronze" => Ok(RewardTier::Bronze),
            "silver" => Ok(RewardTier::Silver),
            "gold" => Ok(RewardTier::Gold),
            _ => Err(UnknownTier(s.to_string())),
        }
    }
}

/// What the member asked to redeem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardRequest {
    /// Catalog tier; preferred path.
    Tier(RewardTier),
    /// Legacy free-form reward. A missing cost falls back to the configured default.
    Custom { name: String, points_cost: Option<u64> },
}

impl RewardRequest {
    /// Resolves the request to a concrete `(name, cost, tier)` triple.
    pub fn resolve(&self, default_custom_cost: u64) -> RewardSpec {
        match self {
            RewardRequest::Tier(tier) => RewardSpec {
                name: tier.name().to_string(),
                points_cost: tier.points_cost(),
                tier: Some(*tier),
            },
            RewardRequest::Custom { name, points_cost } => RewardSpec {
                name: name.clone(),
                points_cost: points_cost.unwrap_or(default_custom_cost),
                tier: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardSpec {
    pub name: String,
    pub points_cost: u64,
    pub tier: Option<RewardTier>,
}

/// An issued reward token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: RewardId,
    pub user_id: UserId,
    pub name: String,
    pub points_cost: u64,
    pub tier: Option<RewardTier>,
    pub redeemed: bool,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl Reward {
    pub fn issue(user_id: UserId, spec: RewardSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: RewardId::generate(),
            user_id,
            name: spec.name,
            points_cost: spec.points_cost,
            tier: spec.tier,
            redeemed: false,
            created_at: now,
            redeemed_at: None,
        }
    }

    /// Moves an issued reward to its terminal state.
    ///
    /// Returns `false` and leaves the reward untouched if it was already redeemed.
    pub fn mark_redeemed(&mut self, now: DateTime<Utc>) -> bool {
        if self.redeemed {
            return false;
        }
        self.redeemed = true;
        self.redeemed_at = Some(now);
        true
    }

    pub fn qr_payload(&self) -> String {
        qr_payload(&self.id)
    }

    pub fn short_code(&self) -> String {
        short_code(&self.id)
    }
}

/// Scannable payload for a reward; any client holding the id can rebuild it.
pub fn qr_payload(id: &RewardId) -> String {
    format!("{QR_PREFIX}{id}")
}

pub fn short_code(id: &RewardId) -> String {
    let simple = id.0.simple().to_string();
    simple[..SHORT_CODE_LEN].to_ascii_uppercase()
}

/// Parses either a bare reward id or a full QR payload.
///
/// Returns `None` for blank or unparseable input.
pub fn parse_reward_reference(input: &str) -> Option<RewardId> {
    let trimmed = input.trim();
    let raw = trimmed.strip_prefix(QR_PREFIX).unwrap_or(trimmed);
    Uuid::parse_str(raw.trim()).ok().map(RewardId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 3, 12, 0, 0).unwrap()
    }

    #[test]
    fn tier_catalog_costs() {
        assert_eq!(RewardTier::Bronze.points_cost(), 40);
        assert_eq!(RewardTier::Silver.points_cost(), 80);
        assert_eq!(RewardTier::Gold.points_cost(), 150);
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("Silver".parse::<RewardTier>(), Ok(RewardTier::Silver));
        assert_eq!(" gold ".parse::<RewardTier>(), Ok(RewardTier::Gold));
        assert_eq!(
            "platinum".parse::<RewardTier>(),
            Err(UnknownTier("platinum".into()))
        );
    }

    #[test]
    fn custom_request_defaults_cost() {
        let request = RewardRequest::Custom {
            name: "Sundae".into(),
            points_cost: None,
        };
        let spec = request.resolve(100);
        assert_eq!(spec.points_cost, 100);
        assert_eq!(spec.tier, None);
        assert_eq!(spec.name, "Sundae");
    }

    #[test]
    fn tier_request_uses_catalog() {
        let spec = RewardRequest::Tier(RewardTier::Bronze).resolve(100);
        assert_eq!(spec.name, "Free medium drink");
        assert_eq!(spec.points_cost, 40);
        assert_eq!(spec.tier, Some(RewardTier::Bronze));
    }

    #[test]
    fn mark_redeemed_is_one_way() {
        let mut reward = Reward::issue(
            UserId::new("u1"),
            RewardRequest::Tier(RewardTier::Gold).resolve(0),
            now(),
        );
        let first = now() + chrono::Duration::minutes(5);
        assert!(reward.mark_redeemed(first));
        assert!(!reward.mark_redeemed(first + chrono::Duration::minutes(5)));
        assert_eq!(reward.redeemed_at, Some(first));
    }

    #[test]
    fn payload_round_trips_through_parser() {
        let id = RewardId::generate();
        assert_eq!(parse_reward_reference(&qr_payload(&id)), Some(id));
        assert_eq!(parse_reward_reference(&id.to_string()), Some(id));
        assert_eq!(parse_reward_reference("   "), None);
        assert_eq!(parse_reward_reference("CROWN-REWARD:nope"), None);
    }

    #[test]
    fn short_code_is_uppercase_prefix_of_id() {
        let id = RewardId(Uuid::parse_str("0a1b2c3d-4e5f-6789-abcd-ef0123456789").unwrap());
        assert_eq!(short_code(&id), "0A1B2C3D");
    }
}
