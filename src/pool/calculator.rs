//! Swap Math
//!
//! Constant product (x * y = k) arithmetic on U256 with a per-pool fee in
//! basis points. All amount functions are checked: `None` means the swap
//! is not representable (zero liquidity, overflow, output >= reserve).
//!
//! Sandwich sizing lives here too:
//!   - victim min-out cap on the front-run size
//!   - exact three-leg simulation against a snapshot
//!   - profit-maximizing front-run search under a size ceiling
//!
//! Created: 2026-10-19

use alloy::primitives::{Address, U256};

use crate::types::{u256_to_f64, PoolReserves};

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Width at which the front-run search stops narrowing and scans
const SEARCH_WINDOW: u64 = 64;

/// Result of bounding the front-run by the victim's declared minimum output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlippageCap {
    /// Victim declared no bound, or the bound does not fit in 256 bits
    Unbounded,
    /// Largest front-run (token_in units) the victim tolerates
    Limit(U256),
    /// Any front-run at all would push the victim below its minimum
    Infeasible,
}

/// Per-leg amounts of a simulated front-run -> victim -> back-run sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandwichLegs {
    pub front_run_in: U256,
    pub front_run_out: U256,
    pub victim_out: U256,
    pub back_run_out: U256,
}

impl SandwichLegs {
    /// back-run proceeds minus front-run cost; None when the round trip loses
    pub fn gross_profit(&self) -> Option<U256> {
        self.back_run_out
            .checked_sub(self.front_run_in)
            .filter(|p| !p.is_zero())
    }
}

/// Stateless AMM helpers
pub struct SwapMath;

impl SwapMath {
    /// amount_out = in * (10000 - fee) * reserve_out / (reserve_in * 10000 + in * (10000 - fee))
    pub fn get_amount_out(
        amount_in: U256,
        reserve_in: U256,
        reserve_out: U256,
        fee_bps: u32,
    ) -> Option<U256> {
        if reserve_in.is_zero() || reserve_out.is_zero() || fee_bps as u64 >= BPS_DENOMINATOR {
            return None;
        }
        if amount_in.is_zero() {
            return Some(U256::ZERO);
        }

        let amount_in_with_fee = amount_in.checked_mul(Self::fee_factor(fee_bps))?;
        let numerator = amount_in_with_fee.checked_mul(reserve_out)?;
        let denominator = reserve_in
            .checked_mul(U256::from(BPS_DENOMINATOR))?
            .checked_add(amount_in_with_fee)?;

        Some(numerator / denominator)
    }

    /// Inverse of get_amount_out, rounded up
    pub fn get_amount_in(
        amount_out: U256,
        reserve_in: U256,
        reserve_out: U256,
        fee_bps: u32,
    ) -> Option<U256> {
        if reserve_in.is_zero() || amount_out >= reserve_out || fee_bps as u64 >= BPS_DENOMINATOR {
            return None;
        }
        if amount_out.is_zero() {
            return Some(U256::ZERO);
        }

        let numerator = reserve_in
            .checked_mul(amount_out)?
            .checked_mul(U256::from(BPS_DENOMINATOR))?;
        let denominator = (reserve_out - amount_out).checked_mul(Self::fee_factor(fee_bps))?;

        Some(numerator / denominator + U256::from(1))
    }

    /// Spot-price movement caused by a swap, in bps, fee excluded.
    ///
    /// Price is token_in per token_out; a buy of token_out moves it up.
    pub fn price_movement_bps(
        amount_in: U256,
        reserve_in: U256,
        reserve_out: U256,
        fee_bps: u32,
    ) -> f64 {
        let amount_out = match Self::get_amount_out(amount_in, reserve_in, reserve_out, fee_bps) {
            Some(out) if out < reserve_out => out,
            _ => return f64::MAX,
        };

        let before = u256_to_f64(reserve_in) / u256_to_f64(reserve_out);
        let after = u256_to_f64(reserve_in + amount_in) / u256_to_f64(reserve_out - amount_out);

        (after / before - 1.0) * BPS_DENOMINATOR as f64
    }

    /// Integer square root (floor), Newton iteration
    pub fn isqrt(n: U256) -> U256 {
        if n < U256::from(2) {
            return n;
        }
        let mut x = n;
        let mut y = (n >> 1) + U256::from(1);
        while y < x {
            x = y;
            y = (x + n / x) >> 1;
        }
        x
    }

    /// Largest front-run for which the victim still clears `victim_min_out`.
    ///
    /// After the front-run the pool sits at (X1, k / X1). The victim receives
    /// v' * k / (X1 * (X1 + v')) with v' = v * (1 - fee); requiring that to be
    /// at least m gives X1 <= (-v' + sqrt(v'^2 + 4 v' k / m)) / 2.
    /// The front-run's own fee is ignored, which keeps the bound conservative.
    pub fn max_front_run_for_min_out(
        reserve_in: U256,
        reserve_out: U256,
        victim_in: U256,
        victim_min_out: U256,
        fee_bps: u32,
    ) -> SlippageCap {
        if victim_min_out.is_zero() {
            return SlippageCap::Unbounded;
        }
        let bound = (|| {
            let v_eff = victim_in.checked_mul(Self::fee_factor(fee_bps))? / U256::from(BPS_DENOMINATOR);
            let k = reserve_in.checked_mul(reserve_out)?;
            let k_over_m = k / victim_min_out;
            let disc = v_eff
                .checked_mul(v_eff)?
                .checked_add(U256::from(4).checked_mul(v_eff)?.checked_mul(k_over_m)?)?;
            Some((Self::isqrt(disc).saturating_sub(v_eff)) >> 1)
        })();

        match bound {
            None => SlippageCap::Unbounded,
            Some(x1) if x1 <= reserve_in => SlippageCap::Infeasible,
            Some(x1) => SlippageCap::Limit(x1 - reserve_in),
        }
    }

    /// Exact integer simulation of front-run -> victim -> back-run on a snapshot.
    /// The back-run sells everything the front-run bought.
    pub fn simulate_sandwich(
        pool: &PoolReserves,
        token_in: Address,
        front_run_in: U256,
        victim_in: U256,
    ) -> Option<SandwichLegs> {
        let token_out = pool.counter_token(token_in)?;

        let (front_run_out, after_front) = pool.after_swap(token_in, front_run_in)?;
        let (victim_out, after_victim) = after_front.after_swap(token_in, victim_in)?;
        let back_run_out = after_victim.quote(token_out, front_run_out)?;

        Some(SandwichLegs {
            front_run_in,
            front_run_out,
            victim_out,
            back_run_out,
        })
    }

    /// Front-run in [1, max_front_run] with the largest back-run proceeds
    /// minus cost, fees included.
    ///
    /// Round-trip profit is concave in the amount bought, so a ternary search
    /// runs over the front-run's output q, paying the cheapest input
    /// get_amount_in(q) for each. Searching outputs instead of inputs avoids
    /// the step pattern integer outputs put on profit. A final scan around
    /// the winner settles rounding. Returns the best legs even when they
    /// lose; callers check `gross_profit`.
    pub fn optimal_front_run(
        pool: &PoolReserves,
        token_in: Address,
        victim_in: U256,
        max_front_run: U256,
    ) -> Option<SandwichLegs> {
        let (reserve_in, reserve_out) = pool.reserves_for(token_in)?;
        let fee_bps = pool.fee_bps;
        let max_out = Self::get_amount_out(max_front_run, reserve_in, reserve_out, fee_bps)?;

        let at_output = |q: U256| -> Option<SandwichLegs> {
            let front_run = Self::get_amount_in(q, reserve_in, reserve_out, fee_bps)?;
            if front_run.is_zero() || front_run > max_front_run {
                return None;
            }
            Self::simulate_sandwich(pool, token_in, front_run, victim_in)
        };

        let one = U256::from(1);
        let window = U256::from(SEARCH_WINDOW);
        let (mut lo, mut hi) = (U256::ZERO, max_out);
        while hi - lo > window {
            let third = (hi - lo) / U256::from(3);
            let (m1, m2) = (lo + third, hi - third);
            if Self::more_profitable(at_output(m2), at_output(m1)) {
                lo = m1;
            } else {
                hi = m2;
            }
        }

        let mut best = None;
        let mut q = lo;
        while q <= hi {
            let candidate = at_output(q);
            if Self::more_profitable(candidate, best) {
                best = candidate;
            }
            q += one;
        }

        let centre = best?.front_run_in;
        let mut front_run = centre.saturating_sub(window).max(one);
        let end = centre.saturating_add(window).min(max_front_run);
        while front_run <= end {
            let candidate = Self::simulate_sandwich(pool, token_in, front_run, victim_in);
            if Self::more_profitable(candidate, best) {
                best = candidate;
            }
            front_run += one;
        }
        best
    }

    /// `a` nets more than `b`; a missing simulation is worst
    fn more_profitable(a: Option<SandwichLegs>, b: Option<SandwichLegs>) -> bool {
        match (a, b) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(a), Some(b)) => {
                a.back_run_out.saturating_add(b.front_run_in) > b.back_run_out.saturating_add(a.front_run_in)
            }
        }
    }

    fn fee_factor(fee_bps: u32) -> U256 {
        U256::from(BPS_DENOMINATOR - fee_bps as u64)
    }
}
