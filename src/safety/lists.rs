//! Token Allow/Deny Lists
//!
//! Operator-maintained token lists, checked before any node call.
//! Denylisted tokens are always rejected. Allowlisted tokens skip the
//! bytecode scan and the round-trip dry run, but never the liquidity check.
//!
//! Config file: config/token_lists.json
//!
//! Created: 2026-10-19

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct TokenListFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub denylist: Vec<ListedToken>,
    #[serde(default)]
    pub allowlist: Vec<ListedToken>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ListedToken {
    pub address: Address,
    #[serde(default)]
    pub symbol: Option<String>,
    /// Why it was listed (shown in rejection verdicts)
    #[serde(default)]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Runtime lookup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListMembership {
    Denied(String),
    Allowed,
    Unlisted,
}

#[derive(Debug, Clone, Default)]
pub struct TokenLists {
    denied: HashMap<Address, String>,
    allowed: HashMap<Address, Option<String>>,
}

impl TokenLists {
    /// Load from a JSON file. Missing or unparseable files are an error;
    /// the caller decides whether running without lists is acceptable.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token lists: {}", path))?;
        let raw: TokenListFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse token lists JSON: {}", path))?;

        let lists = Self::from_file(raw);
        info!(
            "Token lists loaded from {}: {} denied, {} allowed",
            path,
            lists.denied.len(),
            lists.allowed.len()
        );
        Ok(lists)
    }

    pub fn from_file(raw: TokenListFile) -> Self {
        let denied = raw
            .denylist
            .into_iter()
            .map(|t| {
                let why = t
                    .reason
                    .or(t.symbol)
                    .unwrap_or_else(|| "operator denylist".to_string());
                (t.address, why)
            })
            .collect();
        let allowed = raw
            .allowlist
            .into_iter()
            .map(|t| (t.address, t.symbol))
            .collect();
        Self { denied, allowed }
    }

    /// Deny wins when a token is on both lists
    pub fn classify(&self, token: &Address) -> ListMembership {
        if let Some(why) = self.denied.get(token) {
            return ListMembership::Denied(why.clone());
        }
        if self.allowed.contains_key(token) {
            return ListMembership::Allowed;
        }
        ListMembership::Unlisted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTS_JSON: &str = r#"{
        "version": "1",
        "denylist": [
            { "address": "0x1111111111111111111111111111111111111111", "reason": "honeypot" },
            { "address": "0x3333333333333333333333333333333333333333" }
        ],
        "allowlist": [
            { "address": "0x2222222222222222222222222222222222222222", "symbol": "WETH" },
            { "address": "0x3333333333333333333333333333333333333333" }
        ]
    }"#;

    fn lists() -> TokenLists {
        TokenLists::from_file(serde_json::from_str(LISTS_JSON).unwrap())
    }

    #[test]
    fn test_classify() {
        let l = lists();
        assert_eq!(
            l.classify(&Address::repeat_byte(0x11)),
            ListMembership::Denied("honeypot".into())
        );
        assert_eq!(l.classify(&Address::repeat_byte(0x22)), ListMembership::Allowed);
        assert_eq!(l.classify(&Address::repeat_byte(0x44)), ListMembership::Unlisted);
    }

    #[test]
    fn test_deny_wins_over_allow() {
        assert!(matches!(
            lists().classify(&Address::repeat_byte(0x33)),
            ListMembership::Denied(_)
        ));
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(TokenLists::load("/nonexistent/token_lists.json").is_err());
    }
}
