//! Builder Relay Client
//!
//! Purpose:
//! Hand bundles to block builders over JSON-RPC:
//!   - eth_callBundle : simulate the ordered bundle on top of a state block
//!   - eth_sendBundle : offer the bundle for one target block
//!
//! Endpoints are tried in order. Each POST gets a timeout and a bounded
//! number of attempts; a bundle counts as submitted once any endpoint
//! accepts it for every block in its window.
//!
//! Auth:
//! Optional `X-Flashbots-Signature: <address>:<sig>` where sig is an
//! EIP-191 signature over the hex string of keccak256(body).
//!
//! Created: 2026-10-19
//!
//! Dependencies:
//! - reqwest (rustls), serde_json
//! - alloy (keccak, local signer)

use alloy::hex;
use alloy::primitives::{keccak256, TxHash};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::types::Bundle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSimulation {
    pub success: bool,
    /// First transaction in the bundle that failed
    pub reverted_tx: Option<TxHash>,
    pub reason: Option<String>,
    pub gas_used: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionReceipt {
    /// Endpoint names that accepted at least one target block
    pub accepted_by: Vec<String>,
    pub bundle_hash: Option<String>,
}

#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Simulate on top of `state_block`. An error means the simulation
    /// could not run, not that the bundle reverted.
    async fn simulate(&self, bundle: &Bundle, state_block: u64) -> Result<BundleSimulation>;

    /// Offer the bundle for every block in its window
    async fn submit(&self, bundle: &Bundle) -> Result<SubmissionReceipt>;
}

#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub endpoints: Vec<RelayEndpoint>,
    pub request_timeout: Duration,
    pub attempts_per_endpoint: u32,
}

pub struct HttpRelay {
    client: reqwest::Client,
    auth: Option<PrivateKeySigner>,
    config: RelayConfig,
}

impl HttpRelay {
    pub fn new(config: RelayConfig, auth: Option<PrivateKeySigner>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("relay HTTP client")?;
        Ok(Self {
            client,
            auth,
            config,
        })
    }

    fn sign_request(&self, body: &[u8]) -> Result<Option<String>> {
        let Some(signer) = &self.auth else {
            return Ok(None);
        };
        let message = keccak256(body).to_string();
        let signature = signer
            .sign_message_sync(message.as_bytes())
            .context("relay request signing failed")?;

        let mut sig_bytes = [0u8; 65];
        sig_bytes[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
        sig_bytes[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
        sig_bytes[64] = signature.v() as u8;
        Ok(Some(format!(
            "{}:0x{}",
            signer.address(),
            hex::encode(sig_bytes)
        )))
    }

    /// POST with bounded attempts; returns the parsed JSON-RPC envelope
    async fn post(&self, endpoint: &RelayEndpoint, body: &Value) -> Result<Value> {
        let body_bytes = serde_json::to_vec(body)?;
        let signature = self.sign_request(&body_bytes)?;
        let attempts = self.config.attempts_per_endpoint.max(1);

        let mut last_error = anyhow!("no attempt made");
        for attempt in 1..=attempts {
            let mut request = self
                .client
                .post(&endpoint.url)
                .header("Content-Type", "application/json")
                .body(body_bytes.clone());
            if let Some(sig) = &signature {
                request = request.header("X-Flashbots-Signature", sig.as_str());
            }

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Value>()
                        .await
                        .with_context(|| format!("{}: unparseable response", endpoint.name));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    last_error = anyhow!("{}: HTTP {} {}", endpoint.name, status, text);
                }
                Err(e) => {
                    last_error = anyhow!(
                        "{}: {}{}",
                        endpoint.name,
                        e,
                        if e.is_timeout() { " (timeout)" } else { "" }
                    );
                }
            }
            if attempt < attempts {
                debug!("Relay attempt {}/{} failed: {}", attempt, attempts, last_error);
            }
        }
        Err(last_error)
    }
}

#[async_trait]
impl BundleRelay for HttpRelay {
    async fn simulate(&self, bundle: &Bundle, state_block: u64) -> Result<BundleSimulation> {
        let body = call_bundle_request(bundle, state_block);
        let mut failures = Vec::new();
        for endpoint in &self.config.endpoints {
            match self.post(endpoint, &body).await.and_then(|v| parse_call_bundle(&v)) {
                Ok(sim) => return Ok(sim),
                Err(e) => {
                    warn!("eth_callBundle via {} failed: {}", endpoint.name, e);
                    failures.push(e.to_string());
                }
            }
        }
        bail!("bundle simulation unavailable: {}", failures.join(" | "))
    }

    async fn submit(&self, bundle: &Bundle) -> Result<SubmissionReceipt> {
        let mut receipt = SubmissionReceipt::default();
        let mut failures = Vec::new();

        for block in bundle.target_block..=bundle.last_target_block() {
            let body = send_bundle_request(bundle, block);
            let mut accepted_for_block = false;
            for endpoint in &self.config.endpoints {
                match self.post(endpoint, &body).await.and_then(|v| parse_send_bundle(&v)) {
                    Ok(hash) => {
                        accepted_for_block = true;
                        if receipt.bundle_hash.is_none() {
                            receipt.bundle_hash = hash;
                        }
                        if !receipt.accepted_by.contains(&endpoint.name) {
                            receipt.accepted_by.push(endpoint.name.clone());
                        }
                    }
                    Err(e) => failures.push(format!("block {}: {}", block, e)),
                }
            }
            if !accepted_for_block {
                warn!("No builder accepted bundle for block {}", block);
            }
        }

        if receipt.accepted_by.is_empty() {
            if failures.is_empty() {
                bail!("no builder endpoints configured");
            }
            bail!("{}", failures.join(" | "));
        }
        if !failures.is_empty() {
            debug!("Bundle accepted by subset of builders: {}", failures.join(" | "));
        }
        info!(
            "BUNDLE SUBMITTED: victim {} | blocks {}..={} | builders [{}]",
            bundle.victim,
            bundle.target_block,
            bundle.last_target_block(),
            receipt.accepted_by.join(", ")
        );
        Ok(receipt)
    }
}

fn raw_txs(bundle: &Bundle) -> Vec<String> {
    bundle
        .raw_transactions()
        .iter()
        .map(|raw| raw.to_string())
        .collect()
}

pub fn call_bundle_request(bundle: &Bundle, state_block: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_callBundle",
        "params": [{
            "txs": raw_txs(bundle),
            "blockNumber": format!("0x{:x}", bundle.target_block),
            "stateBlockNumber": format!("0x{:x}", state_block),
        }]
    })
}

pub fn send_bundle_request(bundle: &Bundle, block: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_sendBundle",
        "params": [{
            "txs": raw_txs(bundle),
            "blockNumber": format!("0x{:x}", block),
        }]
    })
}

fn rpc_error(response: &Value) -> Option<String> {
    let err = response.get("error")?;
    Some(
        err.get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string()),
    )
}

/// eth_callBundle result. A top-level JSON-RPC error is an endpoint failure;
/// a per-transaction `error`/`revert` is a simulated revert.
pub fn parse_call_bundle(response: &Value) -> Result<BundleSimulation> {
    if let Some(message) = rpc_error(response) {
        bail!("eth_callBundle error: {}", message);
    }
    let result = response
        .get("result")
        .ok_or_else(|| anyhow!("eth_callBundle: missing result"))?;
    let results = result
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("eth_callBundle: missing results"))?;

    let mut gas_used = 0u64;
    for tx in results {
        gas_used += tx.get("gasUsed").and_then(Value::as_u64).unwrap_or(0);
        let failure = tx
            .get("revert")
            .or_else(|| tx.get("error"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        if let Some(reason) = failure {
            let reverted_tx = tx
                .get("txHash")
                .and_then(Value::as_str)
                .and_then(|h| h.parse::<TxHash>().ok());
            return Ok(BundleSimulation {
                success: false,
                reverted_tx,
                reason: Some(reason.to_string()),
                gas_used,
            });
        }
    }
    Ok(BundleSimulation {
        success: true,
        reverted_tx: None,
        reason: None,
        gas_used,
    })
}

/// eth_sendBundle result: the builder's bundle hash, if it returned one
pub fn parse_send_bundle(response: &Value) -> Result<Option<String>> {
    if let Some(message) = rpc_error(response) {
        bail!("eth_sendBundle rejected: {}", message);
    }
    let result = response
        .get("result")
        .ok_or_else(|| anyhow!("eth_sendBundle: missing result"))?;
    Ok(result
        .get("bundleHash")
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignedTx;
    use alloy::primitives::Bytes;

    fn bundle() -> Bundle {
        Bundle {
            front_run: SignedTx {
                hash: TxHash::repeat_byte(0x01),
                raw: Bytes::from(vec![0x02, 0xaa]),
            },
            victim: TxHash::repeat_byte(0x02),
            victim_raw: Bytes::from(vec![0x02, 0xbb]),
            back_run: SignedTx {
                hash: TxHash::repeat_byte(0x03),
                raw: Bytes::from(vec![0x02, 0xcc]),
            },
            target_block: 0x10,
            block_window: 2,
            attempt: 1,
        }
    }

    #[test]
    fn test_send_bundle_request_shape() {
        let req = send_bundle_request(&bundle(), 0x11);
        assert_eq!(req["method"], "eth_sendBundle");
        assert_eq!(req["params"][0]["blockNumber"], "0x11");
        assert_eq!(
            req["params"][0]["txs"],
            json!(["0x02aa", "0x02bb", "0x02cc"])
        );
    }

    #[test]
    fn test_call_bundle_request_pins_state_block() {
        let req = call_bundle_request(&bundle(), 0x0f);
        assert_eq!(req["params"][0]["blockNumber"], "0x10");
        assert_eq!(req["params"][0]["stateBlockNumber"], "0xf");
    }

    #[test]
    fn test_parse_call_bundle_success() {
        let resp = json!({
            "jsonrpc": "2.0", "id": 1,
            "result": { "results": [
                { "txHash": format!("{}", TxHash::repeat_byte(0x01)), "gasUsed": 120000 },
                { "txHash": format!("{}", TxHash::repeat_byte(0x02)), "gasUsed": 90000 },
                { "txHash": format!("{}", TxHash::repeat_byte(0x03)), "gasUsed": 110000 }
            ]}
        });
        let sim = parse_call_bundle(&resp).unwrap();
        assert!(sim.success);
        assert_eq!(sim.gas_used, 320_000);
    }

    #[test]
    fn test_parse_call_bundle_revert() {
        let resp = json!({
            "jsonrpc": "2.0", "id": 1,
            "result": { "results": [
                { "txHash": format!("{}", TxHash::repeat_byte(0x01)), "gasUsed": 120000 },
                { "txHash": format!("{}", TxHash::repeat_byte(0x03)), "gasUsed": 40000,
                  "error": "execution reverted", "revert": "MinProfit" }
            ]}
        });
        let sim = parse_call_bundle(&resp).unwrap();
        assert!(!sim.success);
        assert_eq!(sim.reverted_tx, Some(TxHash::repeat_byte(0x03)));
        assert_eq!(sim.reason.as_deref(), Some("MinProfit"));
    }

    #[test]
    fn test_parse_rpc_errors_are_failures() {
        let resp = json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "rate limited" } });
        assert!(parse_call_bundle(&resp).is_err());
        assert!(parse_send_bundle(&resp).is_err());
    }

    #[test]
    fn test_parse_send_bundle_hash() {
        let resp = json!({ "jsonrpc": "2.0", "id": 1, "result": { "bundleHash": "0xabc" } });
        assert_eq!(parse_send_bundle(&resp).unwrap(), Some("0xabc".to_string()));
        let bare = json!({ "jsonrpc": "2.0", "id": 1, "result": null });
        assert_eq!(parse_send_bundle(&bare).unwrap(), None);
    }

    #[test]
    fn test_signature_header_format() {
        let signer = PrivateKeySigner::random();
        let address = signer.address();
        let relay = HttpRelay::new(
            RelayConfig {
                endpoints: vec![],
                request_timeout: Duration::from_secs(1),
                attempts_per_endpoint: 1,
            },
            Some(signer),
        )
        .unwrap();
        let header = relay.sign_request(b"{}").unwrap().unwrap();
        let (addr, sig) = header.split_once(':').unwrap();
        assert_eq!(addr, address.to_string());
        assert_eq!(sig.len(), 2 + 130);
    }

    #[tokio::test]
    async fn test_simulate_without_endpoints_is_unavailable() {
        let relay = HttpRelay::new(
            RelayConfig {
                endpoints: vec![],
                request_timeout: Duration::from_secs(1),
                attempts_per_endpoint: 1,
            },
            None,
        )
        .unwrap();
        assert!(relay.simulate(&bundle(), 15).await.is_err());
        assert!(relay.submit(&bundle()).await.is_err());
    }
}
