//! Bytecode admin-capability scan
//!
//! Walks EVM bytecode opcode by opcode and collects every PUSH4 immediate,
//! which is how Solidity dispatchers embed function selectors. Immediates
//! of other PUSH widths are skipped so data never reads as a selector.
//! Selectors are matched against known owner-only signatures that let a
//! token trap holders.

use alloy::primitives::keccak256;
use once_cell::sync::Lazy;
use std::collections::HashSet;

const PUSH1: u8 = 0x60;
const PUSH4: u8 = 0x63;
const PUSH32: u8 = 0x7f;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Owner can block individual holders from transferring
    Blacklist,
    /// Owner can halt all transfers
    Pausable,
    /// Owner can change the transfer tax; flagged, decided by the dry run
    FeeSetter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub capability: Capability,
    pub signature: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
}

impl ScanReport {
    /// First finding that rejects on its own. Fee setters do not.
    pub fn blocking(&self) -> Option<&Finding> {
        self.findings
            .iter()
            .find(|f| f.capability != Capability::FeeSetter)
    }

    pub fn signatures(&self) -> Vec<&'static str> {
        self.findings.iter().map(|f| f.signature).collect()
    }
}

const ADMIN_SIGNATURES: &[(&str, Capability)] = &[
    ("blacklist(address)", Capability::Blacklist),
    ("addToBlacklist(address)", Capability::Blacklist),
    ("setBlacklist(address,bool)", Capability::Blacklist),
    ("addBots(address[])", Capability::Blacklist),
    ("setBots(address[])", Capability::Blacklist),
    ("blockBots(address[])", Capability::Blacklist),
    ("pause()", Capability::Pausable),
    ("setTradingEnabled(bool)", Capability::Pausable),
    ("setTradingOpen(bool)", Capability::Pausable),
    ("setFee(uint256)", Capability::FeeSetter),
    ("setFees(uint256,uint256)", Capability::FeeSetter),
    ("setTaxFeePercent(uint256)", Capability::FeeSetter),
    ("setSellFee(uint256)", Capability::FeeSetter),
    ("setBuyFee(uint256)", Capability::FeeSetter),
];

static ADMIN_SELECTORS: Lazy<Vec<([u8; 4], Capability, &'static str)>> = Lazy::new(|| {
    ADMIN_SIGNATURES
        .iter()
        .map(|(sig, cap)| (selector(sig), *cap, *sig))
        .collect()
});

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Every PUSH4 immediate in the code, skipping other push data
pub fn push4_immediates(code: &[u8]) -> HashSet<[u8; 4]> {
    let mut found = HashSet::new();
    let mut pc = 0;
    while pc < code.len() {
        let op = code[pc];
        if (PUSH1..=PUSH32).contains(&op) {
            let width = (op - PUSH1 + 1) as usize;
            if op == PUSH4 && pc + 4 < code.len() {
                found.insert([code[pc + 1], code[pc + 2], code[pc + 3], code[pc + 4]]);
            }
            pc += width;
        }
        pc += 1;
    }
    found
}

pub fn scan_bytecode(code: &[u8]) -> ScanReport {
    let immediates = push4_immediates(code);
    let findings = ADMIN_SELECTORS
        .iter()
        .filter(|(sel, _, _)| immediates.contains(sel))
        .map(|(_, capability, signature)| Finding {
            capability: *capability,
            signature: *signature,
        })
        .collect();
    ScanReport { findings }
}
