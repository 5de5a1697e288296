//! Node Access
//!
//! Purpose:
//!     Everything the engine asks of an Ethereum node, behind two traits:
//!       - `NodeQuery`  : request/response reads (block number, reserves,
//!                        bytecode, receipts, probe eth_call)
//!       - `ChainFeeds` : long-lived subscriptions (pending txs, Sync logs,
//!                        mined blocks)
//!     `AlloyNode` implements both over a single WebSocket provider. Tests
//!     substitute in-memory fakes.
//!
//! Created: 2026-10-19
//!
//! Dependencies:
//!     - alloy (provider, pubsub, sol! bindings)
//!     - async-trait, futures (BoxStream)

use alloy::consensus::Transaction as _;
use alloy::eips::{BlockNumberOrTag, Encodable2718};
use alloy::network::ReceiptResponse as _;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Transaction};
use alloy::sol_types::SolEvent;
use alloy::transports::RpcError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::time::Instant;
use tracing::{debug, info};

use crate::contracts::{IRoundTripProbe, IUniswapV2Pair};
use crate::mempool::types::RawPendingTx;
use crate::types::PoolId;

/// Reserve update from a pool's Sync event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveUpdate {
    pub pool: PoolId,
    pub reserve0: U256,
    pub reserve1: U256,
    pub block: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub number: u64,
    pub tx_hashes: Vec<TxHash>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success { block: u64 },
    Failed { block: u64 },
}

/// Buy `token` with `amount_in` of `token_in` through `pool`, then sell it all back.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub pool: PoolId,
    pub token_in: Address,
    pub token: Address,
    pub amount_in: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Completed { bought: U256, proceeds: U256 },
    Reverted(String),
}

#[async_trait]
pub trait NodeQuery: Send + Sync {
    async fn block_number(&self) -> Result<u64>;
    async fn get_reserves(&self, pool: PoolId) -> Result<(U256, U256)>;
    async fn get_code(&self, address: Address) -> Result<Bytes>;
    /// None while the transaction is not mined
    async fn receipt_status(&self, tx: TxHash) -> Result<Option<ReceiptStatus>>;
    /// Round trip through the probe contract at the latest state
    async fn probe_round_trip(&self, request: &ProbeRequest) -> Result<ProbeOutcome>;
}

#[async_trait]
pub trait ChainFeeds: Send + Sync {
    async fn pending_transactions(&self) -> Result<BoxStream<'static, RawPendingTx>>;
    async fn reserve_syncs(&self, pools: Vec<PoolId>) -> Result<BoxStream<'static, ReserveUpdate>>;
    async fn mined_blocks(&self) -> Result<BoxStream<'static, MinedBlock>>;
}

/// Alloy-backed node client
#[derive(Clone)]
pub struct AlloyNode {
    provider: DynProvider,
    probe_contract: Address,
    /// eth_call `from` for probes; must hold the probe's input token allowance
    probe_caller: Address,
}

impl AlloyNode {
    pub async fn connect(ws_url: &str, probe_contract: Address, probe_caller: Address) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(ws_url))
            .await
            .context("node WS connect failed")?
            .erased();
        info!("Connected to node at {}", ws_url);
        Ok(Self {
            provider,
            probe_contract,
            probe_caller,
        })
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

#[async_trait]
impl NodeQuery for AlloyNode {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn get_reserves(&self, pool: PoolId) -> Result<(U256, U256)> {
        let pair = IUniswapV2Pair::new(pool, &self.provider);
        let reserves = pair
            .getReserves()
            .call()
            .await
            .with_context(|| format!("getReserves failed for {}", pool))?;
        Ok((U256::from(reserves.reserve0), U256::from(reserves.reserve1)))
    }

    async fn get_code(&self, address: Address) -> Result<Bytes> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn receipt_status(&self, tx: TxHash) -> Result<Option<ReceiptStatus>> {
        let Some(receipt) = self.provider.get_transaction_receipt(tx).await? else {
            return Ok(None);
        };
        let block = receipt.block_number.unwrap_or_default();
        Ok(Some(if receipt.status() {
            ReceiptStatus::Success { block }
        } else {
            ReceiptStatus::Failed { block }
        }))
    }

    async fn probe_round_trip(&self, request: &ProbeRequest) -> Result<ProbeOutcome> {
        let probe = IRoundTripProbe::new(self.probe_contract, &self.provider);
        let result = probe
            .probe(request.pool, request.token_in, request.token, request.amount_in)
            .from(self.probe_caller)
            .call()
            .await;

        match result {
            Ok(ret) => Ok(ProbeOutcome::Completed {
                bought: ret.bought,
                proceeds: ret.proceeds,
            }),
            // node answered with an execution error: the round trip reverted
            Err(alloy::contract::Error::TransportError(RpcError::ErrorResp(payload))) => {
                Ok(ProbeOutcome::Reverted(payload.message.to_string()))
            }
            Err(e) => Err(e).context("probe eth_call failed"),
        }
    }
}

#[async_trait]
impl ChainFeeds for AlloyNode {
    async fn pending_transactions(&self) -> Result<BoxStream<'static, RawPendingTx>> {
        let sub = self
            .provider
            .subscribe_full_pending_transactions()
            .await
            .context("pending tx subscription failed")?;
        Ok(sub.into_stream().map(raw_pending_tx).boxed())
    }

    async fn reserve_syncs(&self, pools: Vec<PoolId>) -> Result<BoxStream<'static, ReserveUpdate>> {
        let filter = Filter::new()
            .address(pools)
            .event_signature(IUniswapV2Pair::Sync::SIGNATURE_HASH);
        let sub = self
            .provider
            .subscribe_logs(&filter)
            .await
            .context("Sync log subscription failed")?;

        let stream = sub.into_stream().filter_map(|log| async move {
            match log.log_decode::<IUniswapV2Pair::Sync>() {
                Ok(decoded) => Some(ReserveUpdate {
                    pool: decoded.inner.address,
                    reserve0: U256::from(decoded.inner.data.reserve0),
                    reserve1: U256::from(decoded.inner.data.reserve1),
                    block: log.block_number,
                }),
                Err(e) => {
                    debug!("Undecodable Sync log: {}", e);
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn mined_blocks(&self) -> Result<BoxStream<'static, MinedBlock>> {
        let sub = self
            .provider
            .subscribe_blocks()
            .await
            .context("block subscription failed")?;
        let provider = self.provider.clone();

        let stream = sub.into_stream().filter_map(move |header| {
            let provider = provider.clone();
            async move {
                let number = header.number;
                match provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .await
                {
                    Ok(Some(block)) => Some(MinedBlock {
                        number,
                        tx_hashes: block.transactions.hashes().collect(),
                    }),
                    Ok(None) => None,
                    Err(e) => {
                        debug!("get_block {} failed: {}", number, e);
                        None
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}

fn raw_pending_tx(tx: Transaction) -> RawPendingTx {
    let envelope = tx.inner.inner();
    RawPendingTx {
        hash: *envelope.tx_hash(),
        from: tx.inner.signer(),
        to: envelope.to(),
        input: envelope.input().clone(),
        value: envelope.value(),
        gas_price: envelope
            .gas_price()
            .unwrap_or_else(|| envelope.max_fee_per_gas()),
        raw: envelope.encoded_2718().into(),
        first_seen: Instant::now(),
    }
}
