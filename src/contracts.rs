//! Contract Definitions
//!
//! Solidity interfaces the engine decodes or calls, defined with alloy's `sol!`.
//! `#[sol(rpc)]` generates instance types usable with any alloy Provider.
//!
//! Created: 2026-10-19

use alloy::sol;

// ── Uniswap V2 pair ──────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IUniswapV2Pair {
        event Sync(uint112 reserve0, uint112 reserve1);

        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

// ── Routers (victim calldata) ────────────────────────────────────────

sol! {
    interface IUniswapV2Router02 {
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapExactETHForTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
        function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapExactTokensForTokensSupportingFeeOnTransferTokens(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external;
        function swapExactETHForTokensSupportingFeeOnTransferTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external payable;
        function swapExactTokensForETHSupportingFeeOnTransferTokens(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external;
        function swapTokensForExactTokens(uint256 amountOut, uint256 amountInMax, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapETHForExactTokens(uint256 amountOut, address[] calldata path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
    }
}

sol! {
    interface ISwapRouter {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }
}

// ── Settlement contract (flash-settled sandwich legs) ────────────────
//
// executeFrontrun borrows via the pool callback and buys;
// executeBackrun sells, repays, and reverts unless the token_in gain
// is at least minProfit.

sol! {
    #[sol(rpc)]
    interface ISandwichSettlement {
        function executeFrontrun(address pool, address tokenIn, address tokenOut, uint256 amountIn, uint256 minProfit) external;
        function executeBackrun(address pool, address tokenIn, address tokenOut, uint256 amountIn, uint256 minProfit) external;
        function uniswapV2Call(address sender, uint256 amount0, uint256 amount1, bytes calldata data) external;
    }
}

// ── Round-trip probe (safety dry run, eth_call only) ─────────────────

sol! {
    #[sol(rpc)]
    interface IRoundTripProbe {
        function probe(address pool, address tokenIn, address token, uint256 amountIn) external returns (uint256 bought, uint256 proceeds);
    }
}
