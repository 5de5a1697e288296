//! Engine Configuration
//!
//! Purpose:
//! Read the engine's TOML config, overlay secrets and endpoints from the
//! environment (.env via dotenv), validate, and hand each component its
//! own config struct.
//!
//! Sections:
//! [node] [evaluator] [screening] [execution] [ingest] [[pools]] [[routers]]
//!
//! `evaluator.safety_margin_bps`, `evaluator.min_impact_bps` and
//! `evaluator.min_profit` have no defaults; the file must set them.
//! Token amounts are decimal (or 0x hex) strings.
//!
//! Environment overrides:
//! NODE_WS_URL, NODE_HTTP_URL, SEARCHER_PRIVATE_KEY, RELAY_AUTH_KEY
//!
//! Created: 2026-10-19

use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::mempool::IngestConfig;
use crate::pool::registry::{PoolRegistry, RouterInfo, RouterKind, TrackedPool};
use crate::pool::WriterConfig;
use crate::relay::{RelayConfig, RelayEndpoint};
use crate::safety::ScreenerConfig;
use crate::sandwich::{CoordinatorConfig, EvaluatorConfig, SignerConfig, TokenCooldown};
use crate::types::PoolKind;

const BPS: u32 = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub node: NodeSection,
    pub evaluator: EvaluatorSection,
    #[serde(default)]
    pub screening: ScreeningSection,
    pub execution: ExecutionSection,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub pools: Vec<PoolEntry>,
    #[serde(default)]
    pub routers: Vec<RouterEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    #[serde(default)]
    pub ws_url: String,
    /// Optional HTTP endpoint for nonce lookups; the WS connection otherwise
    #[serde(default)]
    pub http_url: Option<String>,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Round-trip probe contract used by the screener's dry run
    pub probe_contract: Address,
    /// eth_call sender for probes
    pub probe_caller: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorSection {
    pub safety_margin_bps: u32,
    pub min_impact_bps: u32,
    pub min_profit: String,
    #[serde(default = "default_max_reserve_fraction_bps")]
    pub max_reserve_fraction_bps: u32,
    #[serde(default)]
    pub flash_fee_bps: u32,
    #[serde(default = "default_gas_units")]
    pub gas_units: u64,
    pub wrapped_native: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreeningSection {
    #[serde(default)]
    pub token_lists: Option<String>,
    #[serde(default = "default_fee_tolerance_bps")]
    pub fee_tolerance_bps: u32,
    #[serde(default = "default_verdict_ttl_secs")]
    pub verdict_ttl_secs: u64,
    #[serde(default = "default_probe_amount")]
    pub probe_amount: String,
    #[serde(default = "default_max_exit_fraction_bps")]
    pub max_exit_fraction_bps: u32,
    #[serde(default = "default_rpc_timeout_ms")]
    pub stage_timeout_ms: u64,
}

impl Default for ScreeningSection {
    fn default() -> Self {
        Self {
            token_lists: None,
            fee_tolerance_bps: default_fee_tolerance_bps(),
            verdict_ttl_secs: default_verdict_ttl_secs(),
            probe_amount: default_probe_amount(),
            max_exit_fraction_bps: default_max_exit_fraction_bps(),
            stage_timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuilderEntry {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSection {
    pub settlement_contract: Address,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_target_blocks")]
    pub target_blocks: u64,
    #[serde(default = "default_gas_limit_per_leg")]
    pub gas_limit_per_leg: u64,
    #[serde(default = "default_priority_fee_wei")]
    pub priority_fee_wei: u128,
    #[serde(default)]
    pub builders: Vec<BuilderEntry>,
    #[serde(default = "default_relay_attempts")]
    pub relay_attempts: u32,
    #[serde(default = "default_rpc_timeout_ms")]
    pub relay_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_cooldown_blocks")]
    pub cooldown_blocks: u64,
    #[serde(default = "default_revert_threshold")]
    pub revert_threshold: u32,
    #[serde(default = "default_max_strikes")]
    pub max_strikes: u32,
    /// Normally from SEARCHER_PRIVATE_KEY
    #[serde(default)]
    pub searcher_private_key: Option<String>,
    /// Normally from RELAY_AUTH_KEY
    #[serde(default)]
    pub relay_auth_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestSection {
    #[serde(default = "default_horizon_secs")]
    pub horizon_secs: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    /// Largest k change accepted from one Sync event before resync
    #[serde(default = "default_max_k_drift_bps")]
    pub max_k_drift_bps: u32,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            horizon_secs: default_horizon_secs(),
            workers: default_workers(),
            channel_capacity: default_channel_capacity(),
            max_hops: default_max_hops(),
            heartbeat_secs: default_heartbeat_secs(),
            max_reconnects: default_max_reconnects(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            stats_interval_secs: default_stats_interval_secs(),
            max_k_drift_bps: default_max_k_drift_bps(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKindEntry {
    ConstantProduct,
    ConcentratedLiquidity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolEntry {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub dex: String,
    #[serde(default = "default_pool_kind")]
    pub kind: PoolKindEntry,
    #[serde(default = "default_pool_fee_bps")]
    pub fee_bps: u32,
    /// Required for concentrated-liquidity pools (e.g. 500, 3000)
    #[serde(default)]
    pub fee_tier: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterEntry {
    pub address: Address,
    pub name: String,
    pub dex: String,
    #[serde(default = "default_router_kind")]
    pub kind: RouterKindEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterKindEntry {
    V2,
    V3,
}

fn default_chain_id() -> u64 {
    1
}

fn default_rpc_timeout_ms() -> u64 {
    2_000
}

fn default_max_reserve_fraction_bps() -> u32 {
    3_000
}

fn default_gas_units() -> u64 {
    300_000
}

fn default_fee_tolerance_bps() -> u32 {
    200
}

fn default_verdict_ttl_secs() -> u64 {
    300
}

fn default_probe_amount() -> String {
    "1000000000000000".to_string()
}

fn default_max_exit_fraction_bps() -> u32 {
    3_000
}

fn default_target_blocks() -> u64 {
    2
}

fn default_gas_limit_per_leg() -> u64 {
    250_000
}

fn default_priority_fee_wei() -> u128 {
    1_000_000_000
}

fn default_relay_attempts() -> u32 {
    2
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_cooldown_blocks() -> u64 {
    10
}

fn default_revert_threshold() -> u32 {
    2
}

fn default_max_strikes() -> u32 {
    3
}

fn default_horizon_secs() -> u64 {
    12
}

fn default_workers() -> usize {
    32
}

fn default_channel_capacity() -> usize {
    256
}

fn default_max_hops() -> usize {
    1
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_max_reconnects() -> u32 {
    10
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_stats_interval_secs() -> u64 {
    60
}

fn default_max_k_drift_bps() -> u32 {
    100
}

fn default_pool_kind() -> PoolKindEntry {
    PoolKindEntry::ConstantProduct
}

fn default_pool_fee_bps() -> u32 {
    30
}

fn default_router_kind() -> RouterKindEntry {
    RouterKindEntry::V2
}

fn parse_amount(field: &str, value: &str) -> Result<U256> {
    U256::from_str(value.trim()).with_context(|| format!("{} is not a token amount: {:?}", field, value))
}

impl EngineConfig {
    /// Read, overlay the environment, validate. `force_dry_run` is the CLI flag.
    pub fn load<P: AsRef<Path>>(path: P, force_dry_run: bool) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config = Self::from_toml(&content)?;

        dotenv::dotenv().ok();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.execution.dry_run |= force_dry_run;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Overlay endpoints and secrets from `lookup` (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("NODE_WS_URL") {
            self.node.ws_url = url;
        }
        if let Some(url) = lookup("NODE_HTTP_URL") {
            self.node.http_url = Some(url);
        }
        if let Some(key) = lookup("SEARCHER_PRIVATE_KEY") {
            self.execution.searcher_private_key = Some(key);
        }
        if let Some(key) = lookup("RELAY_AUTH_KEY") {
            self.execution.relay_auth_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.ws_url.is_empty() {
            bail!("node.ws_url is empty (set it or NODE_WS_URL)");
        }

        let ev = &self.evaluator;
        if ev.safety_margin_bps == 0 || ev.safety_margin_bps > BPS {
            bail!("evaluator.safety_margin_bps must be in (0, 10000], got {}", ev.safety_margin_bps);
        }
        if ev.min_impact_bps > BPS {
            bail!("evaluator.min_impact_bps must be <= 10000");
        }
        if ev.max_reserve_fraction_bps == 0 || ev.max_reserve_fraction_bps > BPS {
            bail!("evaluator.max_reserve_fraction_bps must be in (0, 10000]");
        }
        if ev.flash_fee_bps >= BPS {
            bail!("evaluator.flash_fee_bps must be < 10000");
        }
        parse_amount("evaluator.min_profit", &ev.min_profit)?;

        let sc = &self.screening;
        if sc.fee_tolerance_bps >= BPS {
            bail!("screening.fee_tolerance_bps must be < 10000");
        }
        if sc.max_exit_fraction_bps == 0 || sc.max_exit_fraction_bps > BPS {
            bail!("screening.max_exit_fraction_bps must be in (0, 10000]");
        }
        if parse_amount("screening.probe_amount", &sc.probe_amount)?.is_zero() {
            bail!("screening.probe_amount must be non-zero");
        }

        let ex = &self.execution;
        if ex.target_blocks == 0 {
            bail!("execution.target_blocks must be at least 1");
        }
        // dry runs still simulate through a builder
        if ex.builders.is_empty() {
            bail!("execution.builders is empty");
        }
        if !ex.dry_run && ex.searcher_private_key.is_none() {
            bail!("SEARCHER_PRIVATE_KEY is required unless dry_run is set");
        }

        let ing = &self.ingest;
        if ing.workers == 0 || ing.channel_capacity == 0 {
            bail!("ingest.workers and ingest.channel_capacity must be non-zero");
        }
        if ing.max_hops == 0 {
            bail!("ingest.max_hops must be at least 1");
        }
        if ing.horizon_secs == 0 {
            bail!("ingest.horizon_secs must be non-zero");
        }

        if self.pools.is_empty() {
            bail!("no [[pools]] configured");
        }
        if self.routers.is_empty() {
            bail!("no [[routers]] configured");
        }
        for pool in &self.pools {
            if pool.kind == PoolKindEntry::ConcentratedLiquidity && pool.fee_tier.is_none() {
                bail!("pool {} is concentrated_liquidity but has no fee_tier", pool.address);
            }
            if pool.fee_bps >= BPS {
                bail!("pool {} fee_bps must be < 10000", pool.address);
            }
        }
        Ok(())
    }

    pub fn horizon(&self) -> Duration {
        Duration::from_secs(self.ingest.horizon_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.node.rpc_timeout_ms)
    }

    pub fn registry(&self) -> PoolRegistry {
        let pools = self
            .pools
            .iter()
            .map(|p| TrackedPool {
                address: p.address,
                token0: p.token0,
                token1: p.token1,
                dex: p.dex.clone(),
                kind: match p.kind {
                    PoolKindEntry::ConstantProduct => PoolKind::ConstantProduct,
                    PoolKindEntry::ConcentratedLiquidity => PoolKind::ConcentratedLiquidity {
                        fee_tier: p.fee_tier.unwrap_or_default(),
                    },
                },
                fee_bps: p.fee_bps,
            })
            .collect();
        let routers = self
            .routers
            .iter()
            .map(|r| RouterInfo {
                address: r.address,
                name: r.name.clone(),
                dex: r.dex.clone(),
                kind: match r.kind {
                    RouterKindEntry::V2 => RouterKind::V2,
                    RouterKindEntry::V3 => RouterKind::V3,
                },
            })
            .collect();
        PoolRegistry::new(pools, routers)
    }

    pub fn evaluator_config(&self) -> Result<EvaluatorConfig> {
        let ev = &self.evaluator;
        Ok(EvaluatorConfig {
            safety_margin_bps: ev.safety_margin_bps,
            min_impact_bps: ev.min_impact_bps,
            min_profit: parse_amount("evaluator.min_profit", &ev.min_profit)?,
            max_reserve_fraction_bps: ev.max_reserve_fraction_bps,
            flash_fee_bps: ev.flash_fee_bps,
            gas_units: ev.gas_units,
            wrapped_native: ev.wrapped_native,
        })
    }

    pub fn screener_config(&self) -> Result<ScreenerConfig> {
        let sc = &self.screening;
        Ok(ScreenerConfig {
            fee_tolerance_bps: sc.fee_tolerance_bps,
            verdict_ttl: Duration::from_secs(sc.verdict_ttl_secs),
            probe_amount: parse_amount("screening.probe_amount", &sc.probe_amount)?,
            max_exit_fraction_bps: sc.max_exit_fraction_bps,
            stage_timeout: Duration::from_millis(sc.stage_timeout_ms),
        })
    }

    pub fn signer_config(&self) -> SignerConfig {
        SignerConfig {
            settlement: self.execution.settlement_contract,
            chain_id: self.node.chain_id,
            gas_limit: self.execution.gas_limit_per_leg,
            max_priority_fee_per_gas: self.execution.priority_fee_wei,
            // a bundle can land until its last target block passes
            nonce_hold: self.horizon() * (self.execution.target_blocks as u32 + 1),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            endpoints: self
                .execution
                .builders
                .iter()
                .map(|b| RelayEndpoint {
                    name: b.name.clone(),
                    url: b.url.clone(),
                })
                .collect(),
            request_timeout: Duration::from_millis(self.execution.relay_timeout_ms),
            attempts_per_endpoint: self.execution.relay_attempts,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let ex = &self.execution;
        let relay_timeout = Duration::from_millis(ex.relay_timeout_ms);
        let posts = (ex.builders.len().max(1) as u32)
            * ex.relay_attempts.max(1)
            * ex.target_blocks as u32;
        CoordinatorConfig {
            dry_run: ex.dry_run,
            horizon: self.horizon(),
            rpc_timeout: self.rpc_timeout().max(relay_timeout),
            submit_timeout: relay_timeout * posts,
            poll_interval: Duration::from_millis(ex.poll_interval_ms),
            // a generous bound on the window closing; blocks are ~12s
            inclusion_timeout: Duration::from_secs(12 * (ex.target_blocks + 2)),
        }
    }

    pub fn cooldown(&self) -> TokenCooldown {
        let ex = &self.execution;
        TokenCooldown::new(ex.cooldown_blocks, ex.revert_threshold, ex.max_strikes)
    }

    pub fn ingest_config(&self) -> IngestConfig {
        let ing = &self.ingest;
        IngestConfig {
            heartbeat: Duration::from_secs(ing.heartbeat_secs),
            max_reconnects: ing.max_reconnects,
            reconnect_delay: Duration::from_millis(ing.reconnect_delay_ms),
            horizon: self.horizon(),
        }
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            rpc_timeout: self.rpc_timeout(),
            ..WriterConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    const CONFIG: &str = r#"
[node]
ws_url = "ws://127.0.0.1:8546"
probe_contract = "0x1111111111111111111111111111111111111111"
probe_caller = "0x2222222222222222222222222222222222222222"

[evaluator]
safety_margin_bps = 9000
min_impact_bps = 50
min_profit = "1000000000000000"
wrapped_native = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"

[execution]
settlement_contract = "0x3333333333333333333333333333333333333333"
dry_run = true

[[execution.builders]]
name = "flashbots"
url = "https://relay.flashbots.net"

[[pools]]
address = "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc"
token0 = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
token1 = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
dex = "uniswapv2"

[[pools]]
address = "0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640"
token0 = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
token1 = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
dex = "uniswapv3"
kind = "concentrated_liquidity"
fee_tier = 500

[[routers]]
address = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"
name = "UniswapV2Router02"
dex = "uniswapv2"
"#;

    fn config() -> EngineConfig {
        EngineConfig::from_toml(CONFIG).unwrap()
    }

    #[test]
    fn test_parse_with_defaults() {
        let c = config();
        assert_ok!(c.validate());
        assert_eq!(c.screening.fee_tolerance_bps, 200);
        assert_eq!(c.screening.verdict_ttl_secs, 300);
        assert_eq!(c.ingest.horizon_secs, 12);
        assert_eq!(c.execution.target_blocks, 2);
        assert_eq!(c.ingest.workers, 32);
        assert_eq!(c.ingest.channel_capacity, 256);
        assert_eq!(c.ingest.max_hops, 1);
        assert_eq!(c.pools[0].kind, PoolKindEntry::ConstantProduct);
        assert_eq!(c.routers[0].kind, RouterKindEntry::V2);
    }

    #[test]
    fn test_every_default_applies() {
        let c = config();
        assert_eq!(c.node.chain_id, 1);
        assert_eq!(c.node.rpc_timeout_ms, 2_000);
        assert_eq!(c.evaluator.max_reserve_fraction_bps, 3_000);
        assert_eq!(c.evaluator.gas_units, 300_000);
        assert_eq!(c.screening.probe_amount, "1000000000000000");
        assert_eq!(c.screening.max_exit_fraction_bps, 3_000);
        assert_eq!(c.screening.stage_timeout_ms, 2_000);
        assert_eq!(c.execution.gas_limit_per_leg, 250_000);
        assert_eq!(c.execution.priority_fee_wei, 1_000_000_000);
        assert_eq!(c.execution.relay_attempts, 2);
        assert_eq!(c.execution.relay_timeout_ms, 2_000);
        assert_eq!(c.execution.poll_interval_ms, 1_000);
        assert_eq!(c.execution.cooldown_blocks, 10);
        assert_eq!(c.execution.revert_threshold, 2);
        assert_eq!(c.execution.max_strikes, 3);
        assert_eq!(c.ingest.heartbeat_secs, 30);
        assert_eq!(c.ingest.max_reconnects, 10);
        assert_eq!(c.ingest.reconnect_delay_ms, 1_000);
        assert_eq!(c.ingest.stats_interval_secs, 60);
        assert_eq!(c.ingest.max_k_drift_bps, 100);
        assert_eq!(c.pools[0].fee_bps, 30);

        // horizon 12 s, two target blocks
        assert_eq!(c.signer_config().nonce_hold, Duration::from_secs(36));
        assert_eq!(c.writer_config().max_feed_reconnects, 50);
    }

    #[test]
    fn test_thresholds_are_required() {
        let without_margin = CONFIG.replace("safety_margin_bps = 9000\n", "");
        assert!(EngineConfig::from_toml(&without_margin).is_err());
        let without_profit = CONFIG.replace("min_profit = \"1000000000000000\"\n", "");
        assert!(EngineConfig::from_toml(&without_profit).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_margin() {
        let mut c = config();
        c.evaluator.safety_margin_bps = 0;
        assert_err!(c.validate());
        c.evaluator.safety_margin_bps = 10_001;
        assert_err!(c.validate());
    }

    #[test]
    fn test_live_mode_needs_key() {
        let mut c = config();
        c.execution.dry_run = false;
        assert_err!(c.validate());
        c.execution.searcher_private_key = Some("0x01".into());
        assert_ok!(c.validate());
    }

    #[test]
    fn test_builders_required_even_in_dry_run() {
        let mut c = config();
        assert_eq!(c.execution.builders[0].name, "flashbots");
        c.execution.builders.clear();
        assert_err!(c.validate());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("NODE_WS_URL", "ws://node:8546"),
            ("SEARCHER_PRIVATE_KEY", "0xabc"),
        ]
        .into_iter()
        .collect();
        let mut c = config();
        c.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.node.ws_url, "ws://node:8546");
        assert_eq!(c.execution.searcher_private_key.as_deref(), Some("0xabc"));
        assert!(c.execution.relay_auth_key.is_none());
    }

    #[test]
    fn test_component_configs() {
        let c = config();
        let ev = c.evaluator_config().unwrap();
        assert_eq!(ev.min_profit, U256::from(1_000_000_000_000_000u64));
        assert_eq!(c.screener_config().unwrap().fee_tolerance_bps, 200);

        let registry = c.registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.router(&c.routers[0].address).is_some());
    }

    #[test]
    fn test_concentrated_pool_needs_fee_tier() {
        let mut c = config();
        c.pools[1].fee_tier = None;
        assert_err!(c.validate());
    }

    #[test]
    fn test_bad_amount_is_error() {
        let mut c = config();
        c.evaluator.min_profit = "lots".into();
        assert_err!(c.validate());
        assert!(c.evaluator_config().is_err());
    }
}
