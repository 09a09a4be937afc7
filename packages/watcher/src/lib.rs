//! pairscout watcher library
//!
//! Watches the Uniswap V2 and V3 factories for new pairs, decodes each creation log,
//! looks the new token up on a honeypot scanner and posts an alert to Telegram.

pub mod config;
pub mod decoder;
pub mod enrichment;
pub mod explorer;
pub mod notifier;
pub mod pipeline;
pub mod router;
pub mod stream;
pub mod telemetry;

// Re-export commonly used types
pub use config::WatcherConfig;
pub use decoder::{decode_pair_created, DecodeError, PairRecord, RawEvent};
pub use enrichment::{EnrichmentInfo, HoneypotClient, TokenEnricher};
pub use notifier::{escape_markdown, format_alert, AlertSink, TelegramNotifier};
pub use pipeline::{Outcome, Pipeline};
pub use router::{EventRouter, FactoryVersion, TaggedEvent};
pub use stream::{ConnectionState, StreamConnector, StreamError};
