//! Token Revert Cooldown
//!
//! Purpose:
//!     A sandwich that reverts on-chain (min-profit floor hit) costs gas.
//!     Tokens that keep reverting are usually modeled wrong (hidden tax,
//!     rebasing, transfer hooks), so the coordinator backs off per token,
//!     independent of the safety screener.
//!
//! Design:
//!     - Key: token bought by the front-run
//!     - No suppression until `revert_threshold` consecutive reverts
//!     - Then initial -> 5x -> 25x ... blocks, capped at the max cooldown
//!     - After `max_strikes` cycles at the cap with no inclusion, the token is
//!       suspended for the session
//!     - An inclusion clears the token's history and lifts a suspension
//!
//! Created: 2026-10-19

use alloy::primitives::Address;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

const ESCALATION_FACTOR: u64 = 5;
const DEFAULT_MAX_COOLDOWN_BLOCKS: u64 = 1_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Clear,
    CoolingUntil(u64),
    Suspended,
}

#[derive(Debug, Clone, Copy)]
struct RevertHistory {
    consecutive_reverts: u32,
    last_revert_block: u64,
    cooldown_blocks: u64,
    /// Times the cooldown hit the cap
    capped_cycles: u32,
}

impl RevertHistory {
    fn expires_at(&self) -> u64 {
        self.last_revert_block.saturating_add(self.cooldown_blocks)
    }
}

#[derive(Debug)]
pub struct TokenCooldown {
    history: HashMap<Address, RevertHistory>,
    suspended: HashSet<Address>,
    initial_blocks: u64,
    max_blocks: u64,
    revert_threshold: u32,
    /// 0 disables suspension
    max_strikes: u32,
}

impl TokenCooldown {
    /// `initial_blocks` = 0 disables the breaker entirely
    pub fn new(initial_blocks: u64, revert_threshold: u32, max_strikes: u32) -> Self {
        Self {
            history: HashMap::new(),
            suspended: HashSet::new(),
            initial_blocks,
            max_blocks: DEFAULT_MAX_COOLDOWN_BLOCKS,
            revert_threshold: revert_threshold.max(1),
            max_strikes,
        }
    }

    pub fn state(&self, token: &Address, current_block: u64) -> CooldownState {
        if self.initial_blocks == 0 {
            return CooldownState::Clear;
        }
        if self.suspended.contains(token) {
            return CooldownState::Suspended;
        }
        match self.history.get(token) {
            Some(h) if current_block < h.expires_at() => CooldownState::CoolingUntil(h.expires_at()),
            _ => CooldownState::Clear,
        }
    }

    pub fn is_blocked(&self, token: &Address, current_block: u64) -> bool {
        self.state(token, current_block) != CooldownState::Clear
    }

    pub fn record_revert(&mut self, token: Address, block: u64) {
        if self.initial_blocks == 0 || self.suspended.contains(&token) {
            return;
        }

        let h = self.history.entry(token).or_insert(RevertHistory {
            consecutive_reverts: 0,
            last_revert_block: block,
            cooldown_blocks: 0,
            capped_cycles: 0,
        });
        h.consecutive_reverts += 1;
        h.last_revert_block = block;

        if h.consecutive_reverts < self.revert_threshold {
            debug!(
                "Token {} reverted ({}/{} before cooldown)",
                token, h.consecutive_reverts, self.revert_threshold
            );
            return;
        }

        let steps = h.consecutive_reverts - self.revert_threshold;
        let escalated = self
            .initial_blocks
            .saturating_mul(ESCALATION_FACTOR.saturating_pow(steps));
        h.cooldown_blocks = escalated.min(self.max_blocks);
        if h.cooldown_blocks == self.max_blocks {
            h.capped_cycles += 1;
        }

        if self.max_strikes > 0 && h.capped_cycles >= self.max_strikes {
            info!(
                "TOKEN SUSPENDED: {} | {} capped cooldowns with no inclusion | {} reverts",
                token, h.capped_cycles, h.consecutive_reverts
            );
            self.suspended.insert(token);
            self.history.remove(&token);
            return;
        }

        debug!(
            "Token cooldown: {} | revert #{} | {} blocks (until {}) | capped {}/{}",
            token,
            h.consecutive_reverts,
            h.cooldown_blocks,
            h.expires_at(),
            h.capped_cycles,
            self.max_strikes
        );
    }

    pub fn record_inclusion(&mut self, token: &Address) {
        if self.suspended.remove(token) {
            info!("Token {} reinstated after inclusion", token);
        }
        self.history.remove(token);
    }

    /// Drop expired cooldowns. Histories still below the threshold are kept.
    pub fn cleanup(&mut self, current_block: u64) -> usize {
        let before = self.history.len();
        self.history
            .retain(|_, h| h.cooldown_blocks == 0 || current_block < h.expires_at());
        before - self.history.len()
    }

    /// (tokens with history, suspended tokens)
    pub fn counts(&self) -> (usize, usize) {
        (self.history.len(), self.suspended.len())
    }
}
