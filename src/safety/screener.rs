//! Safety Screener
//!
//! Purpose:
//! Decide whether a token is safe to buy and immediately resell.
//! Stages run cheapest first and short-circuit on the first rejection:
//!   1. allow/deny lists
//!   2. static bytecode scan (admin blacklist / pause capabilities)
//!   3. round-trip dry run through the probe contract
//!   4. liquidity depth for the planned exit size
//!
//! Allowlisted tokens skip 2 and 3. Stage 4 always runs.
//!
//! Fail-closed:
//! Every stage error, timeout or missing input is a rejection. Verdicts
//! from stages 1-3 are cached per token for a TTL; rejections caused by
//! an unavailable stage are not cached, nor is stage 4.
//!
//! Created: 2026-10-19

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::lists::{ListMembership, TokenLists};
use super::scan::{scan_bytecode, Capability};
use crate::node::{NodeQuery, ProbeOutcome, ProbeRequest};
use crate::pool::calculator::BPS_DENOMINATOR;
use crate::pool::state::PoolStateCache;
use crate::types::{PoolId, RejectReason, SafetyVerdict, VerdictEvidence};

#[derive(Debug, Clone)]
pub struct ScreenerConfig {
    /// Max round-trip loss accepted, bps
    pub fee_tolerance_bps: u32,
    pub verdict_ttl: Duration,
    /// Counter-token amount the probe buys with
    pub probe_amount: U256,
    /// Planned exit may use at most this share of the token-side reserve, bps
    pub max_exit_fraction_bps: u32,
    /// Per external call
    pub stage_timeout: Duration,
}

pub struct SafetyScreener {
    lists: TokenLists,
    node: Arc<dyn NodeQuery>,
    cache: PoolStateCache,
    verdicts: DashMap<Address, SafetyVerdict>,
    config: ScreenerConfig,
}

impl SafetyScreener {
    pub fn new(
        lists: TokenLists,
        node: Arc<dyn NodeQuery>,
        cache: PoolStateCache,
        config: ScreenerConfig,
    ) -> Self {
        Self {
            lists,
            node,
            cache,
            verdicts: DashMap::new(),
            config,
        }
    }

    /// Screen `token` for a planned exit of `planned_amount` through `pool`.
    pub async fn screen(&self, token: Address, pool: PoolId, planned_amount: U256) -> SafetyVerdict {
        let intrinsic = match self.cached_verdict(&token) {
            Some(verdict) => verdict,
            None => {
                let verdict = self.screen_intrinsic(token, pool).await;
                let cacheable = verdict.reject_reason().map_or(true, RejectReason::is_cacheable);
                if cacheable {
                    self.verdicts.insert(token, verdict.clone());
                }
                match verdict.reject_reason() {
                    Some(reason) => info!("SCREEN REJECT {} | {}", token, reason),
                    None => debug!("SCREEN PASS {} | flagged={:?}", token, verdict.evidence.flagged_functions),
                }
                verdict
            }
        };

        if !intrinsic.is_approved() {
            return intrinsic;
        }
        self.check_depth(token, pool, planned_amount, intrinsic.evidence)
    }

    /// Drop expired cache entries. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.verdicts.len();
        let ttl = self.config.verdict_ttl;
        self.verdicts.retain(|_, v| v.evaluated_at.elapsed() < ttl);
        before - self.verdicts.len()
    }

    pub fn cached_count(&self) -> usize {
        self.verdicts.len()
    }

    fn cached_verdict(&self, token: &Address) -> Option<SafetyVerdict> {
        let entry = self.verdicts.get(token)?;
        if entry.evaluated_at.elapsed() < self.config.verdict_ttl {
            Some(entry.clone())
        } else {
            None
        }
    }

    // ── Stages 1-3 ──────────────────────────────────────────────────

    async fn screen_intrinsic(&self, token: Address, pool: PoolId) -> SafetyVerdict {
        let mut evidence = VerdictEvidence::default();

        match self.lists.classify(&token) {
            ListMembership::Denied(why) => {
                return SafetyVerdict::rejected(token, RejectReason::Denylisted(why), evidence)
            }
            ListMembership::Allowed => {
                evidence.allowlisted = true;
                return SafetyVerdict::approved(token, evidence);
            }
            ListMembership::Unlisted => {}
        }

        let code = match tokio::time::timeout(self.config.stage_timeout, self.node.get_code(token)).await {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                debug!("get_code {} failed: {}", token, e);
                return unavailable(token, "static-scan", evidence);
            }
            Err(_) => return unavailable(token, "static-scan timeout", evidence),
        };
        if code.is_empty() {
            return SafetyVerdict::rejected(token, RejectReason::NoCode, evidence);
        }

        let report = scan_bytecode(&code);
        evidence.flagged_functions = report.signatures();
        if let Some(finding) = report.blocking() {
            let reason = match finding.capability {
                Capability::Pausable => RejectReason::AdminPausable(finding.signature.to_string()),
                _ => RejectReason::AdminBlacklist(finding.signature.to_string()),
            };
            return SafetyVerdict::rejected(token, reason, evidence);
        }

        self.dry_run(token, pool, evidence).await
    }

    async fn dry_run(&self, token: Address, pool: PoolId, mut evidence: VerdictEvidence) -> SafetyVerdict {
        let snapshot = match self.cache.get(pool) {
            Ok(snapshot) => snapshot,
            Err(_) => return unavailable(token, "dry-run pool state", evidence),
        };
        let Some(base) = snapshot.counter_token(token) else {
            return unavailable(token, "dry-run token not in pool", evidence);
        };

        let amount = self.config.probe_amount;
        evidence.probe_amount = Some(amount);
        let theoretical = snapshot
            .after_swap(base, amount)
            .and_then(|(bought, after)| after.quote(token, bought));
        evidence.theoretical_proceeds = theoretical;

        let request = ProbeRequest {
            pool,
            token_in: base,
            token,
            amount_in: amount,
        };
        let outcome = match tokio::time::timeout(
            self.config.stage_timeout,
            self.node.probe_round_trip(&request),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                debug!("probe {} failed: {}", token, e);
                return unavailable(token, "dry-run", evidence);
            }
            Err(_) => return unavailable(token, "dry-run timeout", evidence),
        };

        let (bought, proceeds) = match outcome {
            ProbeOutcome::Completed { bought, proceeds } => (bought, proceeds),
            ProbeOutcome::Reverted(msg) => {
                return SafetyVerdict::rejected(token, RejectReason::SimulationRevert(msg), evidence)
            }
        };
        evidence.probe_bought = Some(bought);
        evidence.probe_proceeds = Some(proceeds);

        let tolerance = self.config.fee_tolerance_bps as u64;
        let keep_bps = U256::from(BPS_DENOMINATOR.saturating_sub(tolerance));
        let denom = U256::from(BPS_DENOMINATOR);

        // absolute floor on what comes back for what went in
        if proceeds.saturating_mul(denom) < keep_bps.saturating_mul(amount) {
            let shortfall_bps = shortfall_bps(amount, proceeds);
            return SafetyVerdict::rejected(token, RejectReason::ExcessiveTransferFee { shortfall_bps }, evidence);
        }
        // and relative to what the pool math says it should be
        if let Some(expected) = theoretical {
            if proceeds.saturating_mul(denom) < keep_bps.saturating_mul(expected) {
                let shortfall_bps = shortfall_bps(expected, proceeds);
                return SafetyVerdict::rejected(token, RejectReason::ExcessiveTransferFee { shortfall_bps }, evidence);
            }
        }

        SafetyVerdict::approved(token, evidence)
    }

    // ── Stage 4 ─────────────────────────────────────────────────────

    fn check_depth(
        &self,
        token: Address,
        pool: PoolId,
        planned_amount: U256,
        evidence: VerdictEvidence,
    ) -> SafetyVerdict {
        let snapshot = match self.cache.get(pool) {
            Ok(snapshot) => snapshot,
            Err(_) => return unavailable(token, "liquidity-depth", evidence),
        };
        let Some((token_reserve, _)) = snapshot.reserves_for(token) else {
            return unavailable(token, "liquidity-depth token not in pool", evidence);
        };

        let limit = token_reserve.saturating_mul(U256::from(self.config.max_exit_fraction_bps))
            / U256::from(BPS_DENOMINATOR);
        let exit_value = snapshot.quote(token, planned_amount).unwrap_or(U256::ZERO);

        if planned_amount > limit || exit_value.is_zero() {
            debug!(
                "DEPTH REJECT {} | planned={} limit={} exit_value={}",
                token, planned_amount, limit, exit_value
            );
            return SafetyVerdict::rejected(token, RejectReason::InsufficientLiquidity, evidence);
        }
        SafetyVerdict::approved(token, evidence)
    }
}

fn unavailable(token: Address, stage: &str, evidence: VerdictEvidence) -> SafetyVerdict {
    SafetyVerdict::rejected(token, RejectReason::StageUnavailable(stage.to_string()), evidence)
}

fn shortfall_bps(expected: U256, actual: U256) -> u64 {
    if expected.is_zero() || actual >= expected {
        return 0;
    }
    let gap = (expected - actual).saturating_mul(U256::from(BPS_DENOMINATOR)) / expected;
    gap.saturating_to::<u64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ReceiptStatus;
    use crate::pool::registry::TrackedPool;
    use crate::safety::lists::{ListedToken, TokenListFile};
    use crate::safety::scan::selector;
    use crate::types::PoolKind;
    use alloy::primitives::{Bytes, TxHash};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const E18: u128 = 1_000_000_000_000_000_000;

    fn base() -> Address {
        Address::repeat_byte(0x01)
    }

    fn token() -> Address {
        Address::repeat_byte(0x02)
    }

    fn pool_id() -> PoolId {
        Address::repeat_byte(0xaa)
    }

    struct FakeNode {
        code: Bytes,
        probe: Mutex<anyhow::Result<ProbeOutcome>>,
        code_calls: AtomicU32,
        probe_calls: AtomicU32,
    }

    impl FakeNode {
        fn new(code: Vec<u8>, probe: anyhow::Result<ProbeOutcome>) -> Self {
            Self {
                code: Bytes::from(code),
                probe: Mutex::new(probe),
                code_calls: AtomicU32::new(0),
                probe_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl NodeQuery for FakeNode {
        async fn block_number(&self) -> anyhow::Result<u64> {
            Ok(1)
        }
        async fn get_reserves(&self, _pool: PoolId) -> anyhow::Result<(U256, U256)> {
            anyhow::bail!("unused")
        }
        async fn get_code(&self, _address: Address) -> anyhow::Result<Bytes> {
            self.code_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.code.clone())
        }
        async fn receipt_status(&self, _tx: TxHash) -> anyhow::Result<Option<ReceiptStatus>> {
            Ok(None)
        }
        async fn probe_round_trip(&self, _request: &ProbeRequest) -> anyhow::Result<ProbeOutcome> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            match &*self.probe.lock().unwrap() {
                Ok(outcome) => Ok(outcome.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    fn plain_token_code() -> Vec<u8> {
        let sel = selector("transfer(address,uint256)");
        vec![0x63, sel[0], sel[1], sel[2], sel[3], 0x14]
    }

    fn cache() -> PoolStateCache {
        let cache = PoolStateCache::new(500);
        cache.track(&TrackedPool {
            address: pool_id(),
            token0: base(),
            token1: token(),
            dex: "uniswapv2".into(),
            kind: PoolKind::ConstantProduct,
            fee_bps: 30,
        });
        cache
            .reset(pool_id(), U256::from(1_000 * E18), U256::from(1_000 * E18))
            .unwrap();
        cache
    }

    fn config() -> ScreenerConfig {
        ScreenerConfig {
            fee_tolerance_bps: 200,
            verdict_ttl: Duration::from_secs(300),
            probe_amount: U256::from(E18),
            max_exit_fraction_bps: 3_000,
            stage_timeout: Duration::from_secs(1),
        }
    }

    fn screener(node: Arc<FakeNode>, lists: TokenLists) -> SafetyScreener {
        SafetyScreener::new(lists, node, cache(), config())
    }

    fn completed(proceeds: u128) -> anyhow::Result<ProbeOutcome> {
        Ok(ProbeOutcome::Completed {
            bought: U256::from(E18 * 99 / 100),
            proceeds: U256::from(proceeds),
        })
    }

    #[tokio::test]
    async fn test_clean_token_approved_and_cached() {
        let node = Arc::new(FakeNode::new(plain_token_code(), completed(E18 * 99 / 100)));
        let s = screener(node.clone(), TokenLists::default());

        let v = s.screen(token(), pool_id(), U256::from(E18)).await;
        assert!(v.is_approved(), "{:?}", v.outcome);
        assert!(v.evidence.theoretical_proceeds.is_some());

        let again = s.screen(token(), pool_id(), U256::from(E18)).await;
        assert!(again.is_approved());
        assert_eq!(node.probe_calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.cached_count(), 1);
    }

    #[tokio::test]
    async fn test_reverting_sell_is_rejected() {
        let node = Arc::new(FakeNode::new(
            plain_token_code(),
            Ok(ProbeOutcome::Reverted("TRANSFER_FAILED".into())),
        ));
        let s = screener(node, TokenLists::default());
        let v = s.screen(token(), pool_id(), U256::from(E18)).await;
        assert_eq!(v.reject_reason().unwrap().as_str(), "simulation-revert");
    }

    #[tokio::test]
    async fn test_fee_floor_is_fail_closed() {
        // floor = 98% of the probe amount
        let floor = E18 * 98 / 100;

        let at_floor = Arc::new(FakeNode::new(plain_token_code(), completed(floor)));
        let v = screener(at_floor, TokenLists::default())
            .screen(token(), pool_id(), U256::from(E18))
            .await;
        assert!(v.is_approved(), "{:?}", v.outcome);

        let below = Arc::new(FakeNode::new(plain_token_code(), completed(floor - 1)));
        let v = screener(below, TokenLists::default())
            .screen(token(), pool_id(), U256::from(E18))
            .await;
        assert!(matches!(
            v.reject_reason(),
            Some(RejectReason::ExcessiveTransferFee { .. })
        ));
    }

    #[tokio::test]
    async fn test_blacklist_capability_rejects_before_probe() {
        let sel = selector("blacklist(address)");
        let node = Arc::new(FakeNode::new(
            vec![0x63, sel[0], sel[1], sel[2], sel[3]],
            completed(E18),
        ));
        let s = screener(node.clone(), TokenLists::default());
        let v = s.screen(token(), pool_id(), U256::from(E18)).await;
        assert_eq!(v.reject_reason().unwrap().as_str(), "admin-blacklist");
        assert_eq!(node.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_code_rejects() {
        let node = Arc::new(FakeNode::new(vec![], completed(E18)));
        let v = screener(node, TokenLists::default())
            .screen(token(), pool_id(), U256::from(E18))
            .await;
        assert_eq!(v.reject_reason(), Some(&RejectReason::NoCode));
    }

    #[tokio::test]
    async fn test_probe_failure_rejects_but_is_not_cached() {
        let node = Arc::new(FakeNode::new(plain_token_code(), Err(anyhow::anyhow!("rpc down"))));
        let s = screener(node.clone(), TokenLists::default());
        let v = s.screen(token(), pool_id(), U256::from(E18)).await;
        assert_eq!(v.reject_reason().unwrap().as_str(), "stage-unavailable");
        assert_eq!(s.cached_count(), 0);

        *node.probe.lock().unwrap() = completed(E18 * 99 / 100);
        assert!(s.screen(token(), pool_id(), U256::from(E18)).await.is_approved());
    }

    #[tokio::test]
    async fn test_lists_short_circuit() {
        let lists = TokenLists::from_file(TokenListFile {
            version: None,
            denylist: vec![ListedToken {
                address: token(),
                symbol: None,
                reason: Some("rug".into()),
            }],
            allowlist: vec![ListedToken {
                address: base(),
                symbol: Some("WETH".into()),
                reason: None,
            }],
        });
        let node = Arc::new(FakeNode::new(vec![], completed(0)));
        let s = screener(node.clone(), lists);

        let denied = s.screen(token(), pool_id(), U256::from(E18)).await;
        assert_eq!(denied.reject_reason().unwrap().as_str(), "denylisted");

        // allowlisted: no code lookup, no probe
        let allowed = s.screen(base(), pool_id(), U256::from(E18)).await;
        assert!(allowed.is_approved());
        assert!(allowed.evidence.allowlisted);
        assert_eq!(node.code_calls.load(Ordering::SeqCst), 0);
        assert_eq!(node.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_depth_check_runs_even_when_cached() {
        let node = Arc::new(FakeNode::new(plain_token_code(), completed(E18 * 99 / 100)));
        let s = screener(node, TokenLists::default());

        assert!(s.screen(token(), pool_id(), U256::from(E18)).await.is_approved());
        // 40% of the token reserve exceeds the 30% exit limit
        let v = s.screen(token(), pool_id(), U256::from(400 * E18)).await;
        assert_eq!(v.reject_reason(), Some(&RejectReason::InsufficientLiquidity));
        // intrinsic verdict still cached as approved
        assert!(s.cached_verdict(&token()).unwrap().is_approved());
    }

    #[tokio::test]
    async fn test_expired_verdict_is_rescreened() {
        let node = Arc::new(FakeNode::new(plain_token_code(), completed(E18 * 99 / 100)));
        let mut cfg = config();
        cfg.verdict_ttl = Duration::ZERO;
        let s = SafetyScreener::new(TokenLists::default(), node.clone(), cache(), cfg);

        s.screen(token(), pool_id(), U256::from(E18)).await;
        s.screen(token(), pool_id(), U256::from(E18)).await;
        assert_eq!(node.probe_calls.load(Ordering::SeqCst), 2);
        assert_eq!(s.prune(), 1);
    }
}
