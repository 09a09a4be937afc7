//! Pair-Created Log Decoder
//!
//! Turns a raw factory log into a [`PairRecord`]. The two factories emit incompatible
//! layouts, so the decoding rule is picked from the source tag the log arrived with,
//! never from the shape of the payload.
//!
//! - v2 `PairCreated(address indexed token0, address indexed token1, address pair, uint256)`
//! - v3 `PoolCreated(address indexed token0, address indexed token1, uint24 indexed fee, int24 tickSpacing, address pool)`

use alloy::primitives::{address, b256, Address, Bytes, TxHash, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolValue;
use serde::Serialize;
use thiserror::Error;

use crate::enrichment::EnrichmentInfo;
use crate::router::FactoryVersion;

/// Wrapped ether, the base currency most new tokens are paired against
pub const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

/// USDC, the stable reference token
pub const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// Addresses that are never reported as "the new token"
pub const REFERENCE_TOKENS: [Address; 2] = [WETH, USDC];

/// keccak256("PairCreated(address,address,address,uint256)")
pub const PAIR_CREATED_TOPIC: B256 =
    b256!("0d3648bd0f6ba80134a33ba9275ac585d9d315f0ad8355cddefde31afa28d0e9");

/// keccak256("PoolCreated(address,address,uint24,int24,address)")
pub const POOL_CREATED_TOPIC: B256 =
    b256!("783cca1c0412dd0d695e784568c96da2e9c22ff989357a2e8b1d9b2b4e6b7118");

/// Display fallback for tokens the risk service knows nothing about
pub const UNKNOWN_NAME: &str = "unknown name";

/// Errors that can occur while decoding a factory log
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no non-reference token among {0} topics")]
    NoCandidateToken(usize),

    #[error("topic {0} is not an ABI-encoded address")]
    InvalidAddressTopic(B256),

    #[error("malformed {layout} payload ({len} bytes): {reason}")]
    MalformedPayload {
        layout: &'static str,
        len: usize,
        reason: String,
    },
}

/// A log as delivered by the provider, before any interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Hash of the transaction that emitted the log
    pub tx_hash: Option<TxHash>,
    /// Emitting contract
    pub address: Address,
    /// Indexed values, event signature first
    pub topics: Vec<B256>,
    /// Non-indexed ABI payload
    pub data: Bytes,
}

impl RawEvent {
    pub fn new(tx_hash: Option<TxHash>, address: Address, topics: Vec<B256>, data: Bytes) -> Self {
        Self {
            tx_hash,
            address,
            topics,
            data,
        }
    }
}

impl From<&Log> for RawEvent {
    fn from(log: &Log) -> Self {
        Self {
            tx_hash: log.transaction_hash,
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
        }
    }
}

/// A decoded pair creation, optionally enriched with display data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRecord {
    pub tx_hash: Option<TxHash>,
    pub token_address: Address,
    pub pair_address: Address,
    pub source_version: FactoryVersion,
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
}

impl PairRecord {
    /// Attach risk-service identity data. `None` leaves the record unchanged.
    pub fn enrich(&mut self, info: Option<EnrichmentInfo>) {
        if let Some(info) = info {
            self.token_name = info.token_name;
            self.token_symbol = info.token_symbol;
        }
    }

    pub fn display_name(&self) -> &str {
        self.token_name.as_deref().unwrap_or(UNKNOWN_NAME)
    }

    pub fn display_symbol(&self) -> &str {
        self.token_symbol.as_deref().unwrap_or(UNKNOWN_NAME)
    }
}

/// Decode a factory log using the rule of the factory it came from
pub fn decode_pair_created(
    event: &RawEvent,
    version: FactoryVersion,
) -> Result<PairRecord, DecodeError> {
    let (token_address, pair_address) = match version {
        FactoryVersion::V2 => decode_v2(event)?,
        FactoryVersion::V3 => decode_v3(event)?,
    };

    Ok(PairRecord {
        tx_hash: event.tx_hash,
        token_address,
        pair_address,
        source_version: version,
        token_name: None,
        token_symbol: None,
    })
}

/// v2: token among every topic after the signature; pair is the first word of `(address, uint256)`
fn decode_v2(event: &RawEvent) -> Result<(Address, Address), DecodeError> {
    let candidates = event
        .topics
        .iter()
        .skip(1)
        .filter(|topic| **topic != PAIR_CREATED_TOPIC);
    let token = select_new_token(candidates, event.topics.len())?;

    let (pair, _index) = <(Address, U256)>::abi_decode_params(&event.data, true).map_err(|e| {
        DecodeError::MalformedPayload {
            layout: "(address,uint256)",
            len: event.data.len(),
            reason: e.to_string(),
        }
    })?;

    Ok((token, pair))
}

/// v3: token among the two token topics (the fee topic is skipped); pool is the
/// second word of `(uint256, address)`
fn decode_v3(event: &RawEvent) -> Result<(Address, Address), DecodeError> {
    let token_topics = event.topics.iter().skip(1).take(2);
    let token = select_new_token(token_topics, event.topics.len())?;

    let (_tick_spacing, pool) =
        <(U256, Address)>::abi_decode_params(&event.data, true).map_err(|e| {
            DecodeError::MalformedPayload {
                layout: "(uint256,address)",
                len: event.data.len(),
                reason: e.to_string(),
            }
        })?;

    Ok((token, pool))
}

/// Pick the first candidate topic that is not a reference token and decode it
fn select_new_token<'a>(
    candidates: impl Iterator<Item = &'a B256>,
    topic_count: usize,
) -> Result<Address, DecodeError> {
    let topic = candidates
        .copied()
        .find(|topic| !is_reference_topic(topic))
        .ok_or(DecodeError::NoCandidateToken(topic_count))?;

    topic_to_address(&topic)
}

fn is_reference_topic(topic: &B256) -> bool {
    REFERENCE_TOKENS
        .iter()
        .any(|reference| reference.into_word() == *topic)
}

/// Decode an indexed `address` topic, rejecting words with dirty upper bytes
pub fn topic_to_address(topic: &B256) -> Result<Address, DecodeError> {
    Address::abi_decode(topic.as_slice(), true).map_err(|_| DecodeError::InvalidAddressTopic(*topic))
}
