//! Pool & Router Registry
//!
//! Static set of pools and routers the engine watches, built once from
//! config. Decoder lookups go (dex, token pair, fee tier) -> pool.

use alloy::primitives::Address;
use std::collections::HashMap;

use crate::types::{PoolId, PoolKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedPool {
    pub address: PoolId,
    pub token0: Address,
    pub token1: Address,
    pub dex: String,
    pub kind: PoolKind,
    pub fee_bps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterKind {
    /// Uniswap V2 router ABI (path-based)
    V2,
    /// Uniswap V3 SwapRouter ABI (exactInputSingle)
    V3,
}

#[derive(Debug, Clone)]
pub struct RouterInfo {
    pub address: Address,
    pub name: String,
    pub dex: String,
    pub kind: RouterKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PairKey {
    dex: String,
    token_a: Address,
    token_b: Address,
    fee_tier: Option<u32>,
}

impl PairKey {
    fn new(dex: &str, a: Address, b: Address, fee_tier: Option<u32>) -> Self {
        let (token_a, token_b) = if a < b { (a, b) } else { (b, a) };
        Self {
            dex: dex.to_lowercase(),
            token_a,
            token_b,
            fee_tier,
        }
    }

    fn for_pool(pool: &TrackedPool) -> Self {
        let tier = match pool.kind {
            PoolKind::ConstantProduct => None,
            PoolKind::ConcentratedLiquidity { fee_tier } => Some(fee_tier),
        };
        Self::new(&pool.dex, pool.token0, pool.token1, tier)
    }
}

#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: HashMap<PoolId, TrackedPool>,
    by_pair: HashMap<PairKey, PoolId>,
    routers: HashMap<Address, RouterInfo>,
}

impl PoolRegistry {
    pub fn new(pools: Vec<TrackedPool>, routers: Vec<RouterInfo>) -> Self {
        let mut registry = Self::default();
        for pool in pools {
            registry.by_pair.insert(PairKey::for_pool(&pool), pool.address);
            registry.pools.insert(pool.address, pool);
        }
        for router in routers {
            registry.routers.insert(router.address, router);
        }
        registry
    }

    pub fn router(&self, address: &Address) -> Option<&RouterInfo> {
        self.routers.get(address)
    }

    pub fn pool(&self, id: &PoolId) -> Option<&TrackedPool> {
        self.pools.get(id)
    }

    /// `fee_tier` is None for constant-product pools
    pub fn find_pool(
        &self,
        dex: &str,
        a: Address,
        b: Address,
        fee_tier: Option<u32>,
    ) -> Option<&TrackedPool> {
        self.by_pair
            .get(&PairKey::new(dex, a, b, fee_tier))
            .and_then(|id| self.pools.get(id))
    }

    pub fn pools(&self) -> impl Iterator<Item = &TrackedPool> {
        self.pools.values()
    }

    pub fn constant_product_ids(&self) -> Vec<PoolId> {
        self.pools
            .values()
            .filter(|p| p.kind == PoolKind::ConstantProduct)
            .map(|p| p.address)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}
