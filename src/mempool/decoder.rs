//! Swap Decoder
//!
//! Purpose:
//! Turn a raw pending transaction into a `PendingSwapIntent`, or say
//! exactly why not. Decoding is pure: no node calls, only the static
//! pool/router registry.
//!
//! Created: 2026-10-19
//!
//! Supported calls:
//! V2 Router:
//!   swapExactTokensForTokens
//!   swapExactETHForTokens
//!   swapExactTokensForETH
//!   swapExactTokensForTokensSupportingFeeOnTransferTokens
//!   swapExactETHForTokensSupportingFeeOnTransferTokens
//!   swapExactTokensForETHSupportingFeeOnTransferTokens
//! V3 SwapRouter:
//!   exactInputSingle (decoded, sized later as ConcentratedLiquidity)
//!
//! Selectors are only honored on a router of the matching kind.
//! Exact-output variants are recognized and refused: the victim's input
//! is a ceiling, not an amount, so the counter-trade cannot be sized.

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use std::sync::Arc;
use tracing::trace;

use super::types::RawPendingTx;
use crate::contracts::{IUniswapV2Router02, ISwapRouter};
use crate::error::DecodeError;
use crate::pool::registry::{PoolRegistry, RouterKind};
use crate::types::PendingSwapIntent;

// ── V2 Router selectors ────────────────────────────────────────────
const SWAP_EXACT_TOKENS_FOR_TOKENS: [u8; 4] = IUniswapV2Router02::swapExactTokensForTokensCall::SELECTOR;
const SWAP_EXACT_TOKENS_FOR_ETH: [u8; 4] = IUniswapV2Router02::swapExactTokensForETHCall::SELECTOR;
const SWAP_EXACT_ETH_FOR_TOKENS: [u8; 4] = IUniswapV2Router02::swapExactETHForTokensCall::SELECTOR;
const SWAP_EXACT_TOKENS_FOR_TOKENS_FOT: [u8; 4] =
    IUniswapV2Router02::swapExactTokensForTokensSupportingFeeOnTransferTokensCall::SELECTOR;
const SWAP_EXACT_ETH_FOR_TOKENS_FOT: [u8; 4] =
    IUniswapV2Router02::swapExactETHForTokensSupportingFeeOnTransferTokensCall::SELECTOR;
const SWAP_EXACT_TOKENS_FOR_ETH_FOT: [u8; 4] =
    IUniswapV2Router02::swapExactTokensForETHSupportingFeeOnTransferTokensCall::SELECTOR;
const SWAP_TOKENS_FOR_EXACT_TOKENS: [u8; 4] = IUniswapV2Router02::swapTokensForExactTokensCall::SELECTOR;
const SWAP_ETH_FOR_EXACT_TOKENS: [u8; 4] = IUniswapV2Router02::swapETHForExactTokensCall::SELECTOR;

// ── V3 SwapRouter selectors ─────────────────────────────────────────
const EXACT_INPUT_SINGLE: [u8; 4] = ISwapRouter::exactInputSingleCall::SELECTOR;

/// Fields extracted from router calldata, before registry resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSwap {
    pub function_name: &'static str,
    /// Token path, first element is the input token
    pub path: Vec<Address>,
    pub amount_in: U256,
    pub amount_out_min: U256,
    /// V3 fee tier (hundredths of a bip), None for V2
    pub fee_tier: Option<u32>,
}

/// Decode calldata sent to a router of `kind`. `value` is the transaction's
/// ETH value, used as the input amount for ETH-in calls.
pub fn decode_calldata(input: &[u8], value: U256, kind: RouterKind) -> Result<DecodedSwap, DecodeError> {
    if input.len() < 4 {
        return Err(DecodeError::ShortCalldata);
    }
    let selector: [u8; 4] = [input[0], input[1], input[2], input[3]];
    let data = &input[4..];

    let decoded = match kind {
        RouterKind::V2 => decode_v2(selector, data, value),
        RouterKind::V3 => decode_v3(selector, data),
    };
    decoded?.ok_or_else(|| DecodeError::UnknownSelector(selector_hex(input)))
}

/// Ok(None) when the selector is not a V2 router call
fn decode_v2(selector: [u8; 4], data: &[u8], value: U256) -> Result<Option<DecodedSwap>, DecodeError> {
    let decoded = match selector {
        SWAP_EXACT_TOKENS_FOR_TOKENS => {
            let call = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode_raw(data)
                .map_err(|_| DecodeError::Malformed("swapExactTokensForTokens"))?;
            Some(v2_swap("swapExactTokensForTokens", call.path, call.amountIn, call.amountOutMin))
        }
        SWAP_EXACT_TOKENS_FOR_ETH => {
            let call = IUniswapV2Router02::swapExactTokensForETHCall::abi_decode_raw(data)
                .map_err(|_| DecodeError::Malformed("swapExactTokensForETH"))?;
            Some(v2_swap("swapExactTokensForETH", call.path, call.amountIn, call.amountOutMin))
        }
        SWAP_EXACT_ETH_FOR_TOKENS => {
            let call = IUniswapV2Router02::swapExactETHForTokensCall::abi_decode_raw(data)
                .map_err(|_| DecodeError::Malformed("swapExactETHForTokens"))?;
            Some(v2_swap("swapExactETHForTokens", call.path, value, call.amountOutMin))
        }
        SWAP_EXACT_TOKENS_FOR_TOKENS_FOT => {
            let call = IUniswapV2Router02::swapExactTokensForTokensSupportingFeeOnTransferTokensCall::abi_decode_raw(data)
                .map_err(|_| DecodeError::Malformed("swapExactTokensForTokensSupportingFeeOnTransferTokens"))?;
            Some(v2_swap(
                "swapExactTokensForTokensSupportingFeeOnTransferTokens",
                call.path,
                call.amountIn,
                call.amountOutMin,
            ))
        }
        SWAP_EXACT_ETH_FOR_TOKENS_FOT => {
            let call = IUniswapV2Router02::swapExactETHForTokensSupportingFeeOnTransferTokensCall::abi_decode_raw(data)
                .map_err(|_| DecodeError::Malformed("swapExactETHForTokensSupportingFeeOnTransferTokens"))?;
            Some(v2_swap(
                "swapExactETHForTokensSupportingFeeOnTransferTokens",
                call.path,
                value,
                call.amountOutMin,
            ))
        }
        SWAP_EXACT_TOKENS_FOR_ETH_FOT => {
            let call = IUniswapV2Router02::swapExactTokensForETHSupportingFeeOnTransferTokensCall::abi_decode_raw(data)
                .map_err(|_| DecodeError::Malformed("swapExactTokensForETHSupportingFeeOnTransferTokens"))?;
            Some(v2_swap(
                "swapExactTokensForETHSupportingFeeOnTransferTokens",
                call.path,
                call.amountIn,
                call.amountOutMin,
            ))
        }
        SWAP_TOKENS_FOR_EXACT_TOKENS => return Err(DecodeError::UnsupportedCall("swapTokensForExactTokens")),
        SWAP_ETH_FOR_EXACT_TOKENS => return Err(DecodeError::UnsupportedCall("swapETHForExactTokens")),
        _ => None,
    };
    Ok(decoded)
}

/// Ok(None) when the selector is not a V3 SwapRouter call
fn decode_v3(selector: [u8; 4], data: &[u8]) -> Result<Option<DecodedSwap>, DecodeError> {
    let decoded = match selector {
        EXACT_INPUT_SINGLE => {
            let call = ISwapRouter::exactInputSingleCall::abi_decode_raw(data)
                .map_err(|_| DecodeError::Malformed("exactInputSingle"))?;
            let params = call.params;
            Some(DecodedSwap {
                function_name: "exactInputSingle",
                path: vec![params.tokenIn, params.tokenOut],
                amount_in: params.amountIn,
                amount_out_min: params.amountOutMinimum,
                fee_tier: Some(params.fee.to::<u32>()),
            })
        }
        _ => None,
    };
    Ok(decoded)
}

fn v2_swap(function_name: &'static str, path: Vec<Address>, amount_in: U256, amount_out_min: U256) -> DecodedSwap {
    DecodedSwap {
        function_name,
        path,
        amount_in,
        amount_out_min,
        fee_tier: None,
    }
}

/// "0x38ed1739" style selector for logs
pub fn selector_hex(input: &[u8]) -> String {
    if input.len() < 4 {
        return "0x".to_string();
    }
    format!(
        "0x{:02x}{:02x}{:02x}{:02x}",
        input[0], input[1], input[2], input[3]
    )
}

/// Resolves decoded calldata against the tracked pool set
#[derive(Debug, Clone)]
pub struct SwapDecoder {
    registry: Arc<PoolRegistry>,
    max_hops: usize,
}

impl SwapDecoder {
    pub fn new(registry: Arc<PoolRegistry>, max_hops: usize) -> Self {
        Self {
            registry,
            max_hops: max_hops.max(1),
        }
    }

    pub fn decode(&self, tx: &RawPendingTx) -> Result<PendingSwapIntent, DecodeError> {
        let to = tx.to.ok_or(DecodeError::ContractCreation)?;
        let router = self
            .registry
            .router(&to)
            .ok_or(DecodeError::UntrackedContract(to))?;

        let swap = decode_calldata(&tx.input, tx.value, router.kind)?;
        if swap.amount_in.is_zero() {
            return Err(DecodeError::ZeroAmount);
        }
        if swap.path.len() < 2 {
            return Err(DecodeError::Malformed(swap.function_name));
        }
        let hops = swap.path.len() - 1;
        if hops > self.max_hops {
            return Err(DecodeError::HopLimit {
                hops,
                limit: self.max_hops,
            });
        }

        // every hop must be a tracked pool; the first one is the target
        let mut target = None;
        for pair in swap.path.windows(2) {
            let pool = self
                .registry
                .find_pool(&router.dex, pair[0], pair[1], swap.fee_tier)
                .ok_or(DecodeError::UntrackedPool(pair[0], pair[1]))?;
            target.get_or_insert(pool);
        }
        let pool = target.ok_or(DecodeError::Malformed(swap.function_name))?;

        // the declared bound applies to the final output; only single-hop keeps it
        let min_amount_out = if hops == 1 { swap.amount_out_min } else { U256::ZERO };

        trace!(
            "DECODED {} via {} {} -> {} amount {}",
            tx.hash, router.name, swap.path[0], swap.path[1], swap.amount_in
        );

        Ok(PendingSwapIntent {
            tx_hash: tx.hash,
            pool: pool.address,
            pool_kind: pool.kind,
            token_in: swap.path[0],
            token_out: swap.path[1],
            amount_in: swap.amount_in,
            min_amount_out,
            gas_price: tx.gas_price,
            observed_at: tx.first_seen,
            function_name: swap.function_name,
            raw_tx: tx.raw.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::registry::{RouterInfo, TrackedPool};
    use crate::types::PoolKind;
    use alloy::primitives::aliases::{U160, U24};
    use alloy::primitives::{Bytes, TxHash};
    use std::time::{Duration, Instant};

    fn token(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn router_addr() -> Address {
        Address::repeat_byte(0xee)
    }

    fn registry() -> Arc<PoolRegistry> {
        let pools = vec![
            TrackedPool {
                address: Address::repeat_byte(0xa1),
                token0: token(1),
                token1: token(2),
                dex: "uniswapv2".into(),
                kind: PoolKind::ConstantProduct,
                fee_bps: 30,
            },
            TrackedPool {
                address: Address::repeat_byte(0xa2),
                token0: token(2),
                token1: token(3),
                dex: "uniswapv2".into(),
                kind: PoolKind::ConstantProduct,
                fee_bps: 30,
            },
        ];
        let routers = vec![RouterInfo {
            address: router_addr(),
            name: "UniswapV2Router02".into(),
            dex: "uniswapv2".into(),
            kind: RouterKind::V2,
        }];
        Arc::new(PoolRegistry::new(pools, routers))
    }

    fn tx(input: Vec<u8>, value: U256) -> RawPendingTx {
        RawPendingTx {
            hash: TxHash::repeat_byte(0x77),
            from: Address::repeat_byte(0x55),
            to: Some(router_addr()),
            input: Bytes::from(input),
            value,
            gas_price: 30_000_000_000,
            raw: Bytes::from(vec![0x02, 0x01]),
            first_seen: Instant::now(),
        }
    }

    fn exact_tokens(path: Vec<Address>, amount_in: u64, min_out: u64) -> Vec<u8> {
        IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: U256::from(amount_in),
            amountOutMin: U256::from(min_out),
            path,
            to: Address::repeat_byte(0x55),
            deadline: U256::from(9_999_999_999u64),
        }
        .abi_encode()
    }

    #[test]
    fn test_selector_hex() {
        assert_eq!(selector_hex(&[0x38, 0xed, 0x17, 0x39, 0x00]), "0x38ed1739");
        assert_eq!(selector_hex(&[0x38]), "0x");
    }

    #[test]
    fn test_known_selector_values() {
        assert_eq!(SWAP_EXACT_TOKENS_FOR_TOKENS, [0x38, 0xed, 0x17, 0x39]);
        assert_eq!(SWAP_EXACT_ETH_FOR_TOKENS, [0x7f, 0xf3, 0x6a, 0xb5]);
        assert_eq!(SWAP_EXACT_TOKENS_FOR_ETH, [0x18, 0xcb, 0xaf, 0xe5]);
        assert_eq!(SWAP_TOKENS_FOR_EXACT_TOKENS, [0x88, 0x03, 0xdb, 0xee]);
        assert_eq!(EXACT_INPUT_SINGLE, [0x41, 0x4b, 0xf3, 0x89]);
        assert_eq!(SWAP_EXACT_TOKENS_FOR_ETH_FOT, [0x79, 0x1a, 0xc9, 0x47]);
    }

    #[test]
    fn test_decode_exact_tokens_for_tokens() {
        let decoder = SwapDecoder::new(registry(), 1);
        let intent = decoder
            .decode(&tx(exact_tokens(vec![token(1), token(2)], 50_000, 20), U256::ZERO))
            .unwrap();
        assert_eq!(intent.pool, Address::repeat_byte(0xa1));
        assert_eq!(intent.token_in, token(1));
        assert_eq!(intent.token_out, token(2));
        assert_eq!(intent.amount_in, U256::from(50_000));
        assert_eq!(intent.min_amount_out, U256::from(20));
        assert_eq!(intent.function_name, "swapExactTokensForTokens");
        assert_eq!(intent.gas_price, 30_000_000_000);
    }

    #[test]
    fn test_eth_in_uses_tx_value() {
        let input = IUniswapV2Router02::swapExactETHForTokensCall {
            amountOutMin: U256::from(1),
            path: vec![token(2), token(1)],
            to: Address::repeat_byte(0x55),
            deadline: U256::from(1u64),
        }
        .abi_encode();
        let decoder = SwapDecoder::new(registry(), 1);
        let intent = decoder.decode(&tx(input, U256::from(7_000))).unwrap();
        assert_eq!(intent.amount_in, U256::from(7_000));
        assert_eq!(intent.token_in, token(2));
    }

    #[test]
    fn test_rejects_untracked_contract_and_creation() {
        let decoder = SwapDecoder::new(registry(), 1);
        let mut t = tx(exact_tokens(vec![token(1), token(2)], 1, 0), U256::ZERO);
        t.to = Some(Address::repeat_byte(0x01));
        assert_eq!(
            decoder.decode(&t).unwrap_err(),
            DecodeError::UntrackedContract(Address::repeat_byte(0x01))
        );
        t.to = None;
        assert_eq!(decoder.decode(&t).unwrap_err(), DecodeError::ContractCreation);
    }

    #[test]
    fn test_rejects_untracked_pool() {
        let decoder = SwapDecoder::new(registry(), 1);
        let err = decoder
            .decode(&tx(exact_tokens(vec![token(1), token(9)], 1_000, 0), U256::ZERO))
            .unwrap_err();
        assert_eq!(err, DecodeError::UntrackedPool(token(1), token(9)));
    }

    #[test]
    fn test_hop_limit() {
        let path = vec![token(1), token(2), token(3)];
        let strict = SwapDecoder::new(registry(), 1);
        assert_eq!(
            strict
                .decode(&tx(exact_tokens(path.clone(), 1_000, 5), U256::ZERO))
                .unwrap_err(),
            DecodeError::HopLimit { hops: 2, limit: 1 }
        );

        let relaxed = SwapDecoder::new(registry(), 2);
        let intent = relaxed
            .decode(&tx(exact_tokens(path, 1_000, 5), U256::ZERO))
            .unwrap();
        assert_eq!(intent.pool, Address::repeat_byte(0xa1));
        assert_eq!(intent.min_amount_out, U256::ZERO);
    }

    #[test]
    fn test_exact_output_is_unsupported() {
        let input = IUniswapV2Router02::swapTokensForExactTokensCall {
            amountOut: U256::from(10),
            amountInMax: U256::from(1_000),
            path: vec![token(1), token(2)],
            to: Address::repeat_byte(0x55),
            deadline: U256::from(1u64),
        }
        .abi_encode();
        assert_eq!(
            decode_calldata(&input, U256::ZERO, RouterKind::V2).unwrap_err(),
            DecodeError::UnsupportedCall("swapTokensForExactTokens")
        );
    }

    #[test]
    fn test_malformed_and_unknown() {
        assert_eq!(decode_calldata(&[0x38], U256::ZERO, RouterKind::V2).unwrap_err(), DecodeError::ShortCalldata);
        assert_eq!(
            decode_calldata(&[0x38, 0xed, 0x17, 0x39, 0x00], U256::ZERO, RouterKind::V2).unwrap_err(),
            DecodeError::Malformed("swapExactTokensForTokens")
        );
        assert!(matches!(
            decode_calldata(&[0xde, 0xad, 0xbe, 0xef], U256::ZERO, RouterKind::V2).unwrap_err(),
            DecodeError::UnknownSelector(_)
        ));
    }

    #[test]
    fn test_zero_amount() {
        let decoder = SwapDecoder::new(registry(), 1);
        assert_eq!(
            decoder
                .decode(&tx(exact_tokens(vec![token(1), token(2)], 0, 0), U256::ZERO))
                .unwrap_err(),
            DecodeError::ZeroAmount
        );
    }

    fn exact_input_single(token_in: Address, token_out: Address, amount_in: u64) -> Vec<u8> {
        ISwapRouter::exactInputSingleCall {
            params: ISwapRouter::ExactInputSingleParams {
                tokenIn: token_in,
                tokenOut: token_out,
                fee: U24::from(3_000u32),
                recipient: Address::repeat_byte(0x55),
                deadline: U256::from(1u64),
                amountIn: U256::from(amount_in),
                amountOutMinimum: U256::from(1u64),
                sqrtPriceLimitX96: U160::ZERO,
            },
        }
        .abi_encode()
    }

    #[test]
    fn test_observed_at_is_first_seen() {
        let decoder = SwapDecoder::new(registry(), 1);
        let mut t = tx(exact_tokens(vec![token(1), token(2)], 50_000, 0), U256::ZERO);
        t.first_seen = Instant::now() - Duration::from_secs(3);

        let intent = decoder.decode(&t).unwrap();
        assert_eq!(intent.observed_at, t.first_seen);
        assert!(intent.observed_at.elapsed() >= Duration::from_secs(3));
    }

    #[test]
    fn test_selectors_follow_router_kind() {
        // V3 call sent to a V2 router is not a swap it can perform
        let v3_call = exact_input_single(token(1), token(2), 1_000);
        assert!(matches!(
            decode_calldata(&v3_call, U256::ZERO, RouterKind::V2).unwrap_err(),
            DecodeError::UnknownSelector(s) if s == "0x414bf389"
        ));
        let decoded = decode_calldata(&v3_call, U256::ZERO, RouterKind::V3).unwrap();
        assert_eq!(decoded.fee_tier, Some(3_000));

        let v2_call = exact_tokens(vec![token(1), token(2)], 1_000, 0);
        assert!(matches!(
            decode_calldata(&v2_call, U256::ZERO, RouterKind::V3).unwrap_err(),
            DecodeError::UnknownSelector(s) if s == "0x38ed1739"
        ));

        let decoder = SwapDecoder::new(registry(), 1);
        assert!(matches!(
            decoder.decode(&tx(v3_call, U256::ZERO)).unwrap_err(),
            DecodeError::UnknownSelector(_)
        ));
    }

    #[test]
    fn test_decode_fee_on_transfer_eth_out() {
        let input = IUniswapV2Router02::swapExactTokensForETHSupportingFeeOnTransferTokensCall {
            amountIn: U256::from(40_000),
            amountOutMin: U256::from(9),
            path: vec![token(2), token(1)],
            to: Address::repeat_byte(0x55),
            deadline: U256::from(1u64),
        }
        .abi_encode();
        let decoder = SwapDecoder::new(registry(), 1);
        let intent = decoder.decode(&tx(input, U256::ZERO)).unwrap();
        assert_eq!(intent.function_name, "swapExactTokensForETHSupportingFeeOnTransferTokens");
        assert_eq!(intent.pool, Address::repeat_byte(0xa1));
        assert_eq!(intent.token_in, token(2));
        assert_eq!(intent.token_out, token(1));
        assert_eq!(intent.amount_in, U256::from(40_000));
        assert_eq!(intent.min_amount_out, U256::from(9));
    }
}
