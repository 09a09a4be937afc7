//! Mock Pipeline Integration Tests
//!
//! Drives router → pipeline → sink with in-memory fakes (no network).
//! Verifies decode → enrich → notify works per event and that events do not block
//! or poison each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{address, Address, Bytes, TxHash, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;

use pairscout_watcher::decoder::{RawEvent, PAIR_CREATED_TOPIC, POOL_CREATED_TOPIC, UNKNOWN_NAME, USDC, WETH};
use pairscout_watcher::notifier::NotifyError;
use pairscout_watcher::{
    AlertSink, DecodeError, EnrichmentInfo, EventRouter, FactoryVersion, Outcome, Pipeline,
    TaggedEvent, TokenEnricher,
};

const PEPE: Address = address!("6982508145454Ce325dDbE47a25d4ec3d2311933");
const PEPE_PAIR: Address = address!("A43fe16908251ee70EF74718545e4FE6C5cCEc9f");
const SHIB: Address = address!("95aD61b0a150d79219dCF64E1E6Cc01f0B64C4cE");
const SHIB_PAIR: Address = address!("811beEd0119b4AfCE20D2583EB608C6F7AF1954f");

/// Enricher answering from a fixed table, optionally after a per-token delay
#[derive(Default)]
struct FakeEnricher {
    known: HashMap<Address, EnrichmentInfo>,
    delays: HashMap<Address, Duration>,
    lookups: Arc<Mutex<Vec<Address>>>,
}

impl FakeEnricher {
    fn knowing(mut self, token: Address, name: &str, symbol: &str) -> Self {
        self.known.insert(
            token,
            EnrichmentInfo {
                token_name: Some(name.to_string()),
                token_symbol: Some(symbol.to_string()),
            },
        );
        self
    }

    fn slow(mut self, token: Address, delay: Duration) -> Self {
        self.delays.insert(token, delay);
        self
    }
}

#[async_trait]
impl TokenEnricher for FakeEnricher {
    async fn lookup(&self, token: Address) -> Option<EnrichmentInfo> {
        self.lookups.lock().unwrap().push(token);
        if let Some(delay) = self.delays.get(&token) {
            tokio::time::sleep(*delay).await;
        }
        self.known.get(&token).cloned()
    }
}

/// Sink that captures delivered text, optionally refusing everything
#[derive(Clone, Default)]
struct CapturingSink {
    messages: Arc<Mutex<Vec<String>>>,
    refuse: bool,
}

impl CapturingSink {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for CapturingSink {
    async fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        if self.refuse {
            return Err(NotifyError::Rejected("Forbidden: bot was kicked".to_string()));
        }
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn pool_created(token: Address, pool: Address) -> TaggedEvent {
    TaggedEvent::new(
        FactoryVersion::V3,
        RawEvent::new(
            Some(TxHash::repeat_byte(0x33)),
            FactoryVersion::V3.factory_address(),
            vec![POOL_CREATED_TOPIC, WETH.into_word(), token.into_word()],
            Bytes::from((U256::from(1000u64), pool).abi_encode_params()),
        ),
    )
}

fn pair_created(reference: Address, token: Address, pair: Address) -> TaggedEvent {
    TaggedEvent::new(
        FactoryVersion::V2,
        RawEvent::new(
            Some(TxHash::repeat_byte(0x22)),
            FactoryVersion::V2.factory_address(),
            vec![PAIR_CREATED_TOPIC, token.into_word(), reference.into_word()],
            Bytes::from((pair, U256::from(42u64)).abi_encode_params()),
        ),
    )
}

// ==================== Single event ====================

#[tokio::test]
async fn test_pool_created_event_end_to_end() {
    let sink = CapturingSink::default();
    let enricher = FakeEnricher::default().knowing(PEPE, "Pepe", "PEPE");
    let lookups = Arc::clone(&enricher.lookups);
    let router = EventRouter::new(Pipeline::new(enricher, sink.clone(), Duration::ZERO));

    let outcome = router.dispatch(pool_created(PEPE, PEPE_PAIR)).await.unwrap();

    match outcome {
        Outcome::Delivered(record) => {
            assert_eq!(record.token_address, PEPE);
            assert_eq!(record.pair_address, PEPE_PAIR);
            assert_eq!(record.source_version, FactoryVersion::V3);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(*lookups.lock().unwrap(), vec![PEPE]);

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("\\| Pepe \\| PEPE \\|"));
    assert!(messages[0].contains(&format!("CA: `{PEPE}`")));
    assert!(messages[0].contains(&format!("Pair: `{PEPE_PAIR}`")));
}

#[tokio::test]
async fn test_pair_created_with_usdc_reference() {
    let sink = CapturingSink::default();
    let enricher = FakeEnricher::default().knowing(SHIB, "Shiba Inu", "SHIB");
    let router = EventRouter::new(Pipeline::new(enricher, sink.clone(), Duration::ZERO));

    let outcome = router.dispatch(pair_created(USDC, SHIB, SHIB_PAIR)).await.unwrap();

    assert!(matches!(outcome, Outcome::Delivered(ref r) if r.token_address == SHIB && r.pair_address == SHIB_PAIR));
    assert!(sink.messages()[0].contains("\\| Shiba Inu \\| SHIB \\|"));
}

#[tokio::test]
async fn test_unknown_token_uses_placeholders() {
    let sink = CapturingSink::default();
    let router = EventRouter::new(Pipeline::new(FakeEnricher::default(), sink.clone(), Duration::ZERO));

    router.dispatch(pool_created(PEPE, PEPE_PAIR)).await.unwrap();

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].matches(UNKNOWN_NAME).count(), 2);
}

#[tokio::test]
async fn test_refused_delivery_is_reported_not_retried() {
    let sink = CapturingSink {
        refuse: true,
        ..Default::default()
    };
    let router = EventRouter::new(Pipeline::new(FakeEnricher::default(), sink.clone(), Duration::ZERO));

    let outcome = router.dispatch(pool_created(PEPE, PEPE_PAIR)).await.unwrap();

    assert!(matches!(outcome, Outcome::Undelivered(_)));
    assert!(sink.messages().is_empty());
}

// ==================== Concurrency ====================

#[tokio::test(start_paused = true)]
async fn test_slow_lookup_does_not_block_later_events() {
    let sink = CapturingSink::default();
    let enricher = FakeEnricher::default()
        .knowing(PEPE, "Pepe", "PEPE")
        .knowing(SHIB, "Shiba Inu", "SHIB")
        .slow(PEPE, Duration::from_secs(10))
        .slow(SHIB, Duration::from_secs(1));
    let router = EventRouter::new(Pipeline::new(enricher, sink.clone(), Duration::from_secs(3)));

    let first = router.dispatch(pool_created(PEPE, PEPE_PAIR));
    let second = router.dispatch(pair_created(WETH, SHIB, SHIB_PAIR));

    let (a, b) = tokio::join!(first, second);
    assert!(matches!(a.unwrap(), Outcome::Delivered(_)));
    assert!(matches!(b.unwrap(), Outcome::Delivered(_)));

    // Completion order follows lookup latency, not arrival order
    let messages = sink.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("SHIB"));
    assert!(messages[1].contains("PEPE"));
}

#[tokio::test]
async fn test_decode_failure_is_isolated() {
    let sink = CapturingSink::default();
    let router = EventRouter::new(Pipeline::new(
        FakeEnricher::default().knowing(PEPE, "Pepe", "PEPE"),
        sink.clone(),
        Duration::ZERO,
    ));

    let mut broken = pool_created(SHIB, SHIB_PAIR);
    broken.event.data = Bytes::from_static(&[0xde, 0xad]);

    let bad = router.dispatch(broken);
    let good = router.dispatch(pool_created(PEPE, PEPE_PAIR));

    assert!(matches!(
        bad.await.unwrap(),
        Outcome::Dropped(DecodeError::MalformedPayload { .. })
    ));
    assert!(matches!(good.await.unwrap(), Outcome::Delivered(_)));

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("PEPE"));
}

#[tokio::test]
async fn test_reference_only_pair_is_dropped() {
    let sink = CapturingSink::default();
    let router = EventRouter::new(Pipeline::new(FakeEnricher::default(), sink.clone(), Duration::ZERO));

    let outcome = router.dispatch(pair_created(WETH, USDC, SHIB_PAIR)).await.unwrap();

    assert!(matches!(outcome, Outcome::Dropped(DecodeError::NoCandidateToken(_))));
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn test_many_events_all_delivered() {
    let sink = CapturingSink::default();
    let router = EventRouter::new(Pipeline::new(FakeEnricher::default(), sink.clone(), Duration::ZERO));

    let handles: Vec<_> = (1u8..=20)
        .map(|i| router.dispatch(pool_created(Address::repeat_byte(i), Address::repeat_byte(0xf0))))
        .collect();

    for handle in handles {
        assert!(matches!(handle.await.unwrap(), Outcome::Delivered(_)));
    }
    assert_eq!(sink.messages().len(), 20);
}
