//! Bundle Assembly
//!
//! Purpose:
//! Turn an Opportunity into the ordered three-transaction bundle:
//!   1. executeFrontrun  (searcher, nonce n)
//!   2. victim           (forwarded raw, unchanged)
//!   3. executeBackrun   (searcher, nonce n+1, minProfit floor)
//!
//! The back-run carries `min_acceptable_profit` as an argument; the
//! settlement contract reverts the whole leg if its token_in gain falls
//! short, so drift between evaluation and inclusion costs gas only.
//!
//! Created: 2026-10-19
//!
//! Dependencies:
//! - alloy (TxEip1559 signing, sol! calldata)
//! - async-trait (signer seam for tests)

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::eips::eip2930::AccessList;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::contracts::ISandwichSettlement;
use crate::types::{Bundle, Opportunity, SignedTx};

/// Signs the searcher's two legs with consecutive nonces
#[async_trait]
pub trait BundleSigner: Send + Sync {
    fn searcher(&self) -> Address;

    async fn sign_legs(
        &self,
        front_run_calldata: Bytes,
        back_run_calldata: Bytes,
        max_fee_per_gas: u128,
    ) -> Result<(SignedTx, SignedTx)>;
}

#[derive(Debug, Clone)]
pub struct SignerConfig {
    pub settlement: Address,
    pub chain_id: u64,
    /// Gas limit per leg
    pub gas_limit: u64,
    pub max_priority_fee_per_gas: u128,
    /// How long a signed bundle may still land and keeps its nonces reserved
    pub nonce_hold: Duration,
}

/// Searcher nonces held by bundles that may still land.
///
/// A reservation is dropped once the node's pending count passes it (it
/// landed) or its hold expires (the bundle's blocks are gone).
pub struct NonceAllocator {
    hold: Duration,
    /// (first nonce after the reservation, expiry)
    reserved: Mutex<Vec<(u64, Instant)>>,
}

impl NonceAllocator {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            reserved: Mutex::new(Vec::new()),
        }
    }

    /// First of `count` consecutive nonces, never below `pending` and never
    /// overlapping a live reservation
    pub async fn reserve(&self, pending: u64, count: u64) -> u64 {
        let now = Instant::now();
        let mut reserved = self.reserved.lock().await;
        reserved.retain(|(end, expires)| *end > pending && *expires > now);
        let start = reserved
            .iter()
            .map(|(end, _)| *end)
            .max()
            .unwrap_or(pending)
            .max(pending);
        reserved.push((start + count, now + self.hold));
        start
    }
}

/// Local private-key signer
pub struct LocalBundleSigner {
    provider: DynProvider,
    signer: PrivateKeySigner,
    nonces: NonceAllocator,
    config: SignerConfig,
}

impl LocalBundleSigner {
    pub fn new(provider: DynProvider, signer: PrivateKeySigner, config: SignerConfig) -> Self {
        Self {
            provider,
            signer,
            nonces: NonceAllocator::new(config.nonce_hold),
            config,
        }
    }

    fn sign_one(&self, nonce: u64, input: Bytes, max_fee_per_gas: u128) -> Result<SignedTx> {
        let mut tx = TxEip1559 {
            chain_id: self.config.chain_id,
            nonce,
            max_priority_fee_per_gas: self.config.max_priority_fee_per_gas.min(max_fee_per_gas),
            max_fee_per_gas,
            gas_limit: self.config.gas_limit,
            to: TxKind::Call(self.config.settlement),
            value: U256::ZERO,
            access_list: AccessList::default(),
            input,
        };
        let sig = self
            .signer
            .sign_transaction_sync(&mut tx)
            .context("sign settlement leg")?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        Ok(SignedTx {
            hash: *signed.tx_hash(),
            raw: signed.encoded_2718().into(),
        })
    }
}

#[async_trait]
impl BundleSigner for LocalBundleSigner {
    fn searcher(&self) -> Address {
        self.signer.address()
    }

    async fn sign_legs(
        &self,
        front_run_calldata: Bytes,
        back_run_calldata: Bytes,
        max_fee_per_gas: u128,
    ) -> Result<(SignedTx, SignedTx)> {
        let pending = self
            .provider
            .get_transaction_count(self.signer.address())
            .pending()
            .await
            .context("searcher nonce lookup failed")?;
        let nonce = self.nonces.reserve(pending, 2).await;
        if nonce != pending {
            debug!("Nonce {} reserved ahead of pending {}", nonce, pending);
        }
        let front = self.sign_one(nonce, front_run_calldata, max_fee_per_gas)?;
        let back = self.sign_one(nonce + 1, back_run_calldata, max_fee_per_gas)?;
        Ok((front, back))
    }
}

/// Settlement calldata for the front-run leg
pub fn front_run_calldata(opp: &Opportunity) -> Bytes {
    let intent = &opp.intent;
    ISandwichSettlement::executeFrontrunCall {
        pool: intent.pool,
        tokenIn: intent.token_in,
        tokenOut: intent.token_out,
        amountIn: opp.front_run_amount,
        minProfit: opp.min_acceptable_profit,
    }
    .abi_encode()
    .into()
}

/// Settlement calldata for the back-run leg: sells the front-run proceeds
/// back into token_in and enforces the profit floor.
pub fn back_run_calldata(opp: &Opportunity) -> Bytes {
    let intent = &opp.intent;
    ISandwichSettlement::executeBackrunCall {
        pool: intent.pool,
        tokenIn: intent.token_out,
        tokenOut: intent.token_in,
        amountIn: opp.expected_front_run_output,
        minProfit: opp.min_acceptable_profit,
    }
    .abi_encode()
    .into()
}

pub struct BundleBuilder {
    signer: Arc<dyn BundleSigner>,
    /// Consecutive blocks each bundle is offered for
    target_blocks: u64,
}

impl BundleBuilder {
    pub fn new(signer: Arc<dyn BundleSigner>, target_blocks: u64) -> Self {
        Self {
            signer,
            target_blocks: target_blocks.max(1),
        }
    }

    /// Build for blocks `current_block + 1 ..= current_block + target_blocks`.
    /// Legs are priced at the victim's fee so they land in the same block.
    pub async fn build(&self, opp: &Opportunity, current_block: u64, attempt: u32) -> Result<Bundle> {
        let (front_run, back_run) = self
            .signer
            .sign_legs(
                front_run_calldata(opp),
                back_run_calldata(opp),
                opp.intent.gas_price,
            )
            .await?;

        let bundle = Bundle {
            front_run,
            victim: opp.intent.tx_hash,
            victim_raw: opp.intent.raw_tx.clone(),
            back_run,
            target_block: current_block + 1,
            block_window: self.target_blocks,
            attempt,
        };
        debug!(
            "BUNDLE BUILT: victim {} | front {} back {} | blocks {}..={} | attempt {}",
            bundle.victim,
            bundle.front_run.hash,
            bundle.back_run.hash,
            bundle.target_block,
            bundle.last_target_block(),
            attempt
        );
        Ok(bundle)
    }
}
