//! Per-event pipeline: decode, wait, enrich, notify.
//!
//! Every stage after decoding is best-effort. A failed lookup degrades to the
//! `unknown name` placeholders and a failed delivery is logged and dropped, so a
//! single call to [`Pipeline::process`] never returns an error.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::decoder::{decode_pair_created, DecodeError, PairRecord};
use crate::enrichment::TokenEnricher;
use crate::notifier::{format_alert, AlertSink};
use crate::router::TaggedEvent;

/// Default pause between decoding and the scanner lookup
pub const DEFAULT_ENRICHMENT_DELAY_MS: u64 = 3000;

/// How a single event's pipeline ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Payload did not decode; nothing was sent
    Dropped(DecodeError),
    /// Alert acknowledged by the messaging API
    Delivered(PairRecord),
    /// Alert rendered but the messaging API failed or refused it
    Undelivered(PairRecord),
}

pub struct Pipeline<E, N> {
    enricher: E,
    sink: N,
    enrichment_delay: Duration,
}

impl<E, N> Pipeline<E, N>
where
    E: TokenEnricher,
    N: AlertSink,
{
    pub fn new(enricher: E, sink: N, enrichment_delay: Duration) -> Self {
        Self {
            enricher,
            sink,
            enrichment_delay,
        }
    }

    pub fn enrichment_delay(&self) -> Duration {
        self.enrichment_delay
    }

    pub async fn process(&self, tagged: TaggedEvent) -> Outcome {
        let creation_event = tagged.is_creation_event();
        let TaggedEvent { version, event } = tagged;

        let mut record = match decode_pair_created(&event, version) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    source = %version,
                    tx = ?event.tx_hash,
                    topics = event.topics.len(),
                    creation_event,
                    data = %hex::encode(&event.data),
                    error = %e,
                    "dropping undecodable factory log"
                );
                return Outcome::Dropped(e);
            }
        };

        info!(
            source = %version,
            tx = ?record.tx_hash,
            token = %record.token_address,
            pair = %record.pair_address,
            "new pair created"
        );

        // Give the scanner time to index the new contract
        sleep(self.enrichment_delay).await;

        let info = self.enricher.lookup(record.token_address).await;
        record.enrich(info);

        let text = format_alert(&record);
        match self.sink.deliver(&text).await {
            Ok(()) => Outcome::Delivered(record),
            Err(e) => {
                warn!(
                    token = %record.token_address,
                    error = %e,
                    "alert not delivered"
                );
                Outcome::Undelivered(record)
            }
        }
    }
}
