//! Stake positions, lock-period reward accrual, the withdrawal lifecycle,
//! and slashing.

use std::collections::HashMap;

use crate::error::{StakingError, StakingResult};

/// Lifecycle state of a stake position. `Active -> Unlocking -> Withdrawn`
/// is the normal path; `Active -> Slashed` happens if a slash drops the
/// position's amount below the minimum stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeStatus {
    Active,
    Unlocking,
    Withdrawn,
    Slashed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StakePosition {
    pub address: String,
    pub amount: f64,
    pub start_time: f64,
    pub lock_period: u64,
    pub unlock_block: u64,
    pub rewards_earned: f64,
    pub status: StakeStatus,
}

impl StakePosition {
    /// The block height the position was created at, recovered from
    /// `unlock_block - lock_period` rather than stored separately.
    fn start_block(&self) -> u64 {
        self.unlock_block - self.lock_period
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlashRecord {
    pub address: String,
    pub block_index: u64,
    pub slash_amount: f64,
    pub reason: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StakingConfig {
    pub min_stake_amount: f64,
    pub min_lock_period: u64,
    pub annual_return_rate: f64,
    pub slash_percentage: f64,
    pub blocks_per_year: u64,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            min_stake_amount: 100.0,
            min_lock_period: 1000,
            annual_return_rate: 0.05,
            slash_percentage: 0.10,
            blocks_per_year: 365 * 24 * 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StakingStats {
    pub total_staked: f64,
    pub active_stakes: usize,
    pub total_stakers: usize,
    pub min_stake_amount: f64,
    pub annual_return_rate: f64,
    pub total_slashed: f64,
}

pub struct StakingLedger {
    config: StakingConfig,
    stakes: HashMap<String, Vec<StakePosition>>,
    total_staked: f64,
    slash_history: Vec<SlashRecord>,
}

impl StakingLedger {
    pub fn new(config: StakingConfig) -> Self {
        Self {
            config,
            stakes: HashMap::new(),
            total_staked: 0.0,
            slash_history: Vec::new(),
        }
    }

    /// Opens a new active position with `unlock_block = current_block +
    /// lock_period`. Returns the new position's index within `address`'s
    /// stake list.
    pub fn create_stake(
        &mut self,
        address: &str,
        amount: f64,
        lock_period: u64,
        current_block: u64,
        start_time: f64,
    ) -> StakingResult<usize> {
        if amount < self.config.min_stake_amount {
            return Err(StakingError::BelowMinimumAmount);
        }
        if lock_period < self.config.min_lock_period {
            return Err(StakingError::BelowMinimumLockPeriod);
        }

        let position = StakePosition {
            address: address.to_string(),
            amount,
            start_time,
            lock_period,
            unlock_block: current_block + lock_period,
            rewards_earned: 0.0,
            status: StakeStatus::Active,
        };

        let positions = self.stakes.entry(address.to_string()).or_default();
        positions.push(position);
        self.total_staked += amount;

        Ok(positions.len() - 1)
    }

    /// `amount * annual_rate * min(current_block - start_block, lock_period)
    /// / blocks_per_year`. Zero for any non-active position or before the
    /// position's start block.
    pub fn calculate_rewards(&self, position: &StakePosition, current_block: u64) -> f64 {
        if position.status != StakeStatus::Active {
            return 0.0;
        }

        let start_block = position.start_block();
        if current_block <= start_block {
            return 0.0;
        }
        let blocks_elapsed = (current_block - start_block).min(position.lock_period);

        let years_elapsed = blocks_elapsed as f64 / self.config.blocks_per_year as f64;
        position.amount * self.config.annual_return_rate * years_elapsed
    }

    fn position_mut(&mut self, address: &str, index: usize) -> StakingResult<&mut StakePosition> {
        let positions = self.stakes.get_mut(address).ok_or(StakingError::NoPositions)?;
        positions.get_mut(index).ok_or(StakingError::BadIndex)
    }

    /// Requires the position to be active and `current_block >=
    /// unlock_block`; recomputes `rewards_earned` and transitions to
    /// `Unlocking`. Returns the total that `complete_withdrawal` will pay
    /// out.
    pub fn initiate_withdrawal(
        &mut self,
        address: &str,
        index: usize,
        current_block: u64,
    ) -> StakingResult<f64> {
        {
            let position = self.position_mut(address, index)?;
            if position.status != StakeStatus::Active {
                return Err(StakingError::NotActive);
            }
            if current_block < position.unlock_block {
                return Err(StakingError::StillLocked(position.unlock_block));
            }
        }

        let snapshot = self.stakes.get(address).unwrap()[index].clone();
        let rewards = self.calculate_rewards(&snapshot, current_block);

        let position = self.position_mut(address, index)?;
        position.rewards_earned = rewards;
        position.status = StakeStatus::Unlocking;
        Ok(position.amount + position.rewards_earned)
    }

    /// Requires the position to be unlocking; pays out `amount +
    /// rewards_earned` and transitions to `Withdrawn`.
    pub fn complete_withdrawal(&mut self, address: &str, index: usize) -> StakingResult<f64> {
        let position = self.position_mut(address, index)?;
        if position.status != StakeStatus::Unlocking {
            return Err(StakingError::NotUnlocking);
        }
        let total = position.amount + position.rewards_earned;
        position.status = StakeStatus::Withdrawn;
        self.total_staked -= position.amount;
        Ok(total)
    }

    /// Subtracts `slash_percentage * amount` from every active position of
    /// `address`; any position whose post-slash amount drops below
    /// `min_stake_amount` becomes `Slashed`. Returns the total slashed.
    pub fn slash(
        &mut self,
        address: &str,
        block_index: u64,
        reason: String,
        timestamp: f64,
    ) -> StakingResult<f64> {
        let positions = self.stakes.get_mut(address).ok_or(StakingError::NoPositions)?;

        let mut total_slashed = 0.0;
        for position in positions.iter_mut() {
            if position.status != StakeStatus::Active {
                continue;
            }
            let slash_amount = position.amount * self.config.slash_percentage;
            position.amount -= slash_amount;
            total_slashed += slash_amount;

            if position.amount < self.config.min_stake_amount {
                position.status = StakeStatus::Slashed;
                self.total_staked -= position.amount;
            }
        }

        self.slash_history.push(SlashRecord {
            address: address.to_string(),
            block_index,
            slash_amount: total_slashed,
            reason,
            timestamp,
        });

        Ok(total_slashed)
    }

    pub fn get_stake_positions(&self, address: &str) -> &[StakePosition] {
        self.stakes.get(address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_total_staked_by_address(&self, address: &str) -> f64 {
        self.get_stake_positions(address)
            .iter()
            .filter(|p| p.status == StakeStatus::Active)
            .map(|p| p.amount)
            .sum()
    }

    /// Duration-weighted staking power: longer lock periods count for
    /// more than their raw amount.
    pub fn get_staking_power(&self, address: &str) -> f64 {
        self.get_stake_positions(address)
            .iter()
            .filter(|p| p.status == StakeStatus::Active)
            .map(|p| {
                let duration_multiplier = 1.0 + (p.lock_period as f64 / self.config.blocks_per_year as f64);
                p.amount * duration_multiplier
            })
            .sum()
    }

    pub fn get_top_stakers(&self, count: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .stakes
            .keys()
            .filter_map(|address| {
                let power = self.get_staking_power(address);
                (power > 0.0).then_some((address.clone(), power))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(count);
        ranked
    }

    pub fn statistics(&self) -> StakingStats {
        let active_stakes = self
            .stakes
            .values()
            .map(|positions| positions.iter().filter(|p| p.status == StakeStatus::Active).count())
            .sum();
        let total_stakers = self
            .stakes
            .values()
            .filter(|positions| positions.iter().any(|p| p.status == StakeStatus::Active))
            .count();
        let total_slashed = self.slash_history.iter().map(|s| s.slash_amount).sum();

        StakingStats {
            total_staked: self.total_staked,
            active_stakes,
            total_stakers,
            min_stake_amount: self.config.min_stake_amount,
            annual_return_rate: self.config.annual_return_rate,
            total_slashed,
        }
    }
}
