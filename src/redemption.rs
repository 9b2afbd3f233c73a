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

//! Reward issuance and one-time redemption.

use crate::base::{RewardId, UserId};
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::reward::{Reward, RewardRequest};
use crate::store::{RedeemTransition, RewardStore};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A freshly issued reward together with the balance left after paying for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedReward {
    pub reward: Reward,
    pub new_balance: u64,
}

/// Outcome of a staff redemption attempt. Only the first scan is `Valid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionResult {
    Valid(Reward),
    AlreadyRedeemed(Reward),
    NotFound,
}

/// Issues rewards against ledger debits and redeems them exactly once.
#[derive(Clone)]
pub struct RewardDesk {
    rewards: Arc<dyn RewardStore>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    default_custom_cost: u64,
}

impl RewardDesk {
    pub fn new(
        rewards: Arc<dyn RewardStore>,
        ledger: Ledger,
        clock: Arc<dyn Clock>,
        default_custom_cost: u64,
    ) -> Self {
        Self {
            rewards,
            ledger,
            clock,
            default_custom_cost,
        }
    }

    /// Pays for and issues a reward.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientFunds`] - Balance below the cost; nothing is created.
    /// - [`LedgerError::InvalidAmount`] - Resolved cost is zero.
    /// - [`LedgerError::Store`] - Persisting failed; the debit has been refunded.
    pub async fn issue_reward(
        &self,
        user_id: &UserId,
        request: &RewardRequest,
    ) -> Result<IssuedReward, LedgerError> {
        let spec = request.resolve(self.default_custom_cost);
        let cost = spec.points_cost;

        let account = self.ledger.guarded_debit(user_id, cost).await?;
        let reward = Reward::issue(user_id.clone(), spec, self.clock.now_utc());

        if let Err(e) = self.rewards.insert(reward.clone()).await {
            error!(user = %user_id, reward = %reward.id, error = %e, "reward not stored, refunding");
            if let Err(refund) = self.ledger.apply_delta(user_id, cost as i64).await {
                error!(user = %user_id, cost, error = %refund, "refund failed");
            }
            return Err(e.into());
        }

        info!(
            user = %user_id,
            reward = %reward.id,
            name = %reward.name,
            cost,
            balance = account.points(),
            "reward issued"
        );

        Ok(IssuedReward {
            reward,
            new_balance: account.points(),
        })
    }

    /// Redeems a reward. Only the first call for a given id is `Valid`.
    pub async fn redeem_reward(&self, id: &RewardId) -> Result<RedemptionResult, LedgerError> {
        let result = match self.rewards.redeem(id, self.clock.now_utc()).await? {
            RedeemTransition::Redeemed(reward) => {
                info!(reward = %id, user = %reward.user_id, "reward redeemed");
                RedemptionResult::Valid(reward)
            }
            RedeemTransition::AlreadyRedeemed(reward) => {
                warn!(reward = %id, redeemed_at = ?reward.redeemed_at, "reward already redeemed");
                RedemptionResult::AlreadyRedeemed(reward)
            }
            RedeemTransition::NotFound => {
                warn!(reward = %id, "reward not found");
                RedemptionResult::NotFound
            }
        };
        Ok(result)
    }

    /// Rewards of a member, newest first.
    pub async fn history(&self, user_id: &UserId) -> Result<Vec<Reward>, LedgerError> {
        Ok(self.rewards.list_for_user(user_id).await?)
    }
}
