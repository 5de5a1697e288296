//! Pool State Cache
//!
//! Thread-safe reserve storage using DashMap, one entry per tracked pool.
//!
//! Reads return value copies. Each entry is replaced under its shard lock,
//! so a reader sees the full old snapshot or the full new one. Writes go
//! through `PoolWriterSet` (one writer task per pool) and every write
//! bumps the pool's version.
//!
//! Created: 2026-10-19

use alloy::primitives::U256;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::pool::registry::TrackedPool;
use crate::types::{PoolId, PoolReserves};

#[derive(Debug, Clone)]
struct CachedPool {
    reserves: PoolReserves,
    /// Set on a corrupt update or before the first sync; cleared by `reset`
    stale: bool,
}

/// Shared reserve cache. Cloning shares the underlying map.
#[derive(Debug)]
pub struct PoolStateCache {
    pools: Arc<DashMap<PoolId, CachedPool>>,
    /// Max |k_new - k_old| / k_old accepted from the live feed, in bps
    max_k_drift_bps: u32,
}

impl PoolStateCache {
    pub fn new(max_k_drift_bps: u32) -> Self {
        Self {
            pools: Arc::new(DashMap::new()),
            max_k_drift_bps,
        }
    }

    /// Register a pool. It stays stale until the first `reset`.
    pub fn track(&self, pool: &TrackedPool) {
        let reserves = PoolReserves {
            pool: pool.address,
            kind: pool.kind,
            token0: pool.token0,
            token1: pool.token1,
            reserve0: U256::ZERO,
            reserve1: U256::ZERO,
            fee_bps: pool.fee_bps,
            version: 0,
            last_updated: Instant::now(),
        };
        self.pools.insert(
            pool.address,
            CachedPool {
                reserves,
                stale: true,
            },
        );
    }

    /// Snapshot copy of a pool's reserves
    pub fn get(&self, pool: PoolId) -> Result<PoolReserves, CacheError> {
        let entry = self.pools.get(&pool).ok_or(CacheError::NotTracked(pool))?;
        if entry.stale {
            return Err(CacheError::Stale(pool));
        }
        Ok(entry.reserves.clone())
    }

    /// Current version, readable even while stale
    pub fn version(&self, pool: PoolId) -> Result<u64, CacheError> {
        self.pools
            .get(&pool)
            .map(|entry| entry.reserves.version)
            .ok_or(CacheError::NotTracked(pool))
    }

    /// Apply a live-feed reserve update.
    ///
    /// Rejects zero reserves and k jumps beyond the drift tolerance; a
    /// rejected update marks the pool stale (and still bumps the version)
    /// so no consumer keeps trusting the old snapshot.
    pub fn apply(&self, pool: PoolId, reserve0: U256, reserve1: U256) -> Result<u64, CacheError> {
        let mut entry = self.pools.get_mut(&pool).ok_or(CacheError::NotTracked(pool))?;
        if entry.stale {
            return Err(CacheError::Stale(pool));
        }

        if let Err(reason) = self.check_consistency(&entry.reserves, reserve0, reserve1) {
            entry.stale = true;
            entry.reserves.version += 1;
            warn!(
                "POOL CORRUPT: {} {} (reserves {} / {})",
                pool, reason, reserve0, reserve1
            );
            return Err(CacheError::CorruptFeed { pool, reason });
        }

        entry.reserves.reserve0 = reserve0;
        entry.reserves.reserve1 = reserve1;
        entry.reserves.version += 1;
        entry.reserves.last_updated = Instant::now();
        debug!(
            "Pool {} v{} reserves: ({}, {})",
            pool, entry.reserves.version, reserve0, reserve1
        );
        Ok(entry.reserves.version)
    }

    /// Overwrite with authoritative reserves (initial load or resync), clearing staleness
    pub fn reset(&self, pool: PoolId, reserve0: U256, reserve1: U256) -> Result<u64, CacheError> {
        let mut entry = self.pools.get_mut(&pool).ok_or(CacheError::NotTracked(pool))?;
        entry.reserves.reserve0 = reserve0;
        entry.reserves.reserve1 = reserve1;
        entry.reserves.version += 1;
        entry.reserves.last_updated = Instant::now();
        entry.stale = reserve0.is_zero() || reserve1.is_zero();
        Ok(entry.reserves.version)
    }

    pub fn tracked_pools(&self) -> Vec<PoolId> {
        self.pools.iter().map(|entry| *entry.key()).collect()
    }

    /// (tracked, stale)
    pub fn stats(&self) -> (usize, usize) {
        let stale = self.pools.iter().filter(|entry| entry.stale).count();
        (self.pools.len(), stale)
    }

    fn check_consistency(
        &self,
        current: &PoolReserves,
        reserve0: U256,
        reserve1: U256,
    ) -> Result<(), String> {
        if reserve0.is_zero() || reserve1.is_zero() {
            return Err("zero reserve".to_string());
        }

        let old_k = current.reserve0.saturating_mul(current.reserve1);
        if old_k.is_zero() {
            return Ok(());
        }
        let new_k = reserve0.saturating_mul(reserve1);
        let drift = if new_k > old_k { new_k - old_k } else { old_k - new_k };

        let lhs = drift.saturating_mul(U256::from(10_000));
        let rhs = old_k.saturating_mul(U256::from(self.max_k_drift_bps));
        if lhs > rhs {
            return Err(format!("k drift exceeds {}bps", self.max_k_drift_bps));
        }
        Ok(())
    }
}

impl Clone for PoolStateCache {
    fn clone(&self) -> Self {
        Self {
            pools: Arc::clone(&self.pools),
            max_k_drift_bps: self.max_k_drift_bps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PoolKind;
    use alloy::primitives::Address;

    fn tracked() -> TrackedPool {
        TrackedPool {
            address: Address::repeat_byte(0xaa),
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
            dex: "uniswapv2".into(),
            kind: PoolKind::ConstantProduct,
            fee_bps: 30,
        }
    }

    fn u(n: u64) -> U256 {
        U256::from(n)
    }

    #[test]
    fn test_untracked_and_stale_until_first_sync() {
        let cache = PoolStateCache::new(500);
        let pool = tracked();
        assert_eq!(cache.get(pool.address), Err(CacheError::NotTracked(pool.address)));

        cache.track(&pool);
        assert_eq!(cache.get(pool.address), Err(CacheError::Stale(pool.address)));

        cache.reset(pool.address, u(1_000), u(2_000)).unwrap();
        let snap = cache.get(pool.address).unwrap();
        assert_eq!(snap.reserve0, u(1_000));
        assert_eq!(snap.version, 1);
    }

    #[test]
    fn test_apply_bumps_version() {
        let cache = PoolStateCache::new(500);
        let pool = tracked();
        cache.track(&pool);
        cache.reset(pool.address, u(1_000_000), u(1_000_000)).unwrap();

        let v = cache.apply(pool.address, u(1_010_000), u(990_200)).unwrap();
        assert_eq!(v, 2);
        assert_eq!(cache.version(pool.address).unwrap(), 2);
        assert_eq!(cache.get(pool.address).unwrap().reserve1, u(990_200));
    }

    #[test]
    fn test_corrupt_update_marks_stale_until_reset() {
        let cache = PoolStateCache::new(500);
        let pool = tracked();
        cache.track(&pool);
        cache.reset(pool.address, u(1_000_000), u(1_000_000)).unwrap();

        // k doubles: outside 5% tolerance
        let err = cache.apply(pool.address, u(2_000_000), u(1_000_000)).unwrap_err();
        assert!(matches!(err, CacheError::CorruptFeed { .. }));
        assert_eq!(cache.get(pool.address), Err(CacheError::Stale(pool.address)));
        assert_eq!(cache.version(pool.address).unwrap(), 2);

        // further feed updates are refused until resync
        assert!(cache.apply(pool.address, u(1_000_000), u(1_000_000)).is_err());

        cache.reset(pool.address, u(2_000_000), u(1_000_000)).unwrap();
        assert!(cache.get(pool.address).is_ok());
        assert_eq!(cache.stats(), (1, 0));
    }

    #[test]
    fn test_zero_reserve_is_corrupt() {
        let cache = PoolStateCache::new(500);
        let pool = tracked();
        cache.track(&pool);
        cache.reset(pool.address, u(1_000), u(1_000)).unwrap();
        assert!(cache.apply(pool.address, U256::ZERO, u(1_000)).is_err());
    }

    #[test]
    fn test_clone_shares_state() {
        let cache = PoolStateCache::new(500);
        let other = cache.clone();
        let pool = tracked();
        cache.track(&pool);
        other.reset(pool.address, u(5), u(7)).unwrap();
        assert_eq!(cache.get(pool.address).unwrap().reserve1, u(7));
    }

    #[test]
    fn test_readers_never_see_torn_snapshot() {
        let cache = PoolStateCache::new(500);
        let pool = tracked();
        cache.track(&pool);
        cache.reset(pool.address, u(1), u(2)).unwrap();

        let writer = {
            let cache = cache.clone();
            let id = pool.address;
            std::thread::spawn(move || {
                for n in 2..5_000u64 {
                    cache.reset(id, u(n), u(2 * n)).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let id = pool.address;
                std::thread::spawn(move || {
                    let mut last_version = 0;
                    for _ in 0..5_000 {
                        let snap = cache.get(id).unwrap();
                        assert_eq!(snap.reserve1, snap.reserve0 * u(2));
                        assert!(snap.version >= last_version);
                        last_version = snap.version;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
