//! Factory Sources and Event Routing
//!
//! Each watched factory gets its own log filter. Logs come back tagged with the
//! factory version they matched, and the router hands every one of them to its own
//! pipeline task.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::{address, Address, B256};
use alloy::rpc::types::Filter;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::decoder::{RawEvent, PAIR_CREATED_TOPIC, POOL_CREATED_TOPIC};
use crate::enrichment::TokenEnricher;
use crate::notifier::AlertSink;
use crate::pipeline::{Outcome, Pipeline};

/// Uniswap V2 factory on Ethereum mainnet
pub const UNISWAP_V2_FACTORY: Address = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");

/// Uniswap V3 factory on Ethereum mainnet
pub const UNISWAP_V3_FACTORY: Address = address!("1F98431c8aD98523631AE4a59f267346ea31F984");

/// The two factory protocols we watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FactoryVersion {
    /// `PairCreated`, pair in the first payload word
    V2,
    /// `PoolCreated`, pool in the second payload word
    V3,
}

impl FactoryVersion {
    /// Every watched factory, in subscription order
    pub const ALL: [FactoryVersion; 2] = [FactoryVersion::V2, FactoryVersion::V3];

    /// Source tag used in logs and records
    pub fn as_str(&self) -> &'static str {
        match self {
            FactoryVersion::V2 => "v2",
            FactoryVersion::V3 => "v3",
        }
    }

    pub fn factory_address(&self) -> Address {
        match self {
            FactoryVersion::V2 => UNISWAP_V2_FACTORY,
            FactoryVersion::V3 => UNISWAP_V3_FACTORY,
        }
    }

    /// topic0 of the creation event this factory emits
    pub fn event_signature(&self) -> B256 {
        match self {
            FactoryVersion::V2 => PAIR_CREATED_TOPIC,
            FactoryVersion::V3 => POOL_CREATED_TOPIC,
        }
    }

    /// Subscription filter: address match only, the provider does the rest
    pub fn log_filter(&self) -> Filter {
        Filter::new().address(self.factory_address())
    }

    /// Find the version whose factory emitted a log
    pub fn from_factory(address: Address) -> Option<FactoryVersion> {
        Self::ALL
            .into_iter()
            .find(|version| version.factory_address() == address)
    }
}

impl fmt::Display for FactoryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw log together with the factory subscription that delivered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub version: FactoryVersion,
    pub event: RawEvent,
}

impl TaggedEvent {
    pub fn new(version: FactoryVersion, event: RawEvent) -> Self {
        Self { version, event }
    }

    /// Whether the emitting address is the factory of the subscription that delivered it
    pub fn matches_subscription(&self) -> bool {
        FactoryVersion::from_factory(self.event.address) == Some(self.version)
    }

    /// Whether topic0 is the creation event of the tagged factory
    pub fn is_creation_event(&self) -> bool {
        self.event.topics.first() == Some(&self.version.event_signature())
    }
}

/// Fire-and-forget dispatcher: one spawned pipeline task per event
pub struct EventRouter<E, N> {
    pipeline: Arc<Pipeline<E, N>>,
}

impl<E, N> Clone for EventRouter<E, N> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

impl<E, N> EventRouter<E, N>
where
    E: TokenEnricher + 'static,
    N: AlertSink + 'static,
{
    pub fn new(pipeline: Pipeline<E, N>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Spawn the pipeline for one event and return immediately
    ///
    /// The handle is only useful to tests; the connector drops it.
    pub fn dispatch(&self, tagged: TaggedEvent) -> JoinHandle<Outcome> {
        if !tagged.matches_subscription() {
            warn!(
                source = %tagged.version,
                address = %tagged.event.address,
                "log address does not belong to its subscription's factory"
            );
        }

        debug!(
            source = %tagged.version,
            tx = ?tagged.event.tx_hash,
            topics = tagged.event.topics.len(),
            "dispatching factory log"
        );

        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move { pipeline.process(tagged).await })
    }
}
