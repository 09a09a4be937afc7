//! Stream Connector
//!
//! Owns the WebSocket subscription to the chain provider. A session subscribes to
//! every factory filter and yields tagged logs until the transport fails or closes.
//! The connector then terminates the session, waits a fixed delay and starts over
//! from scratch. Nothing is resumed or backfilled: logs emitted while disconnected
//! are lost.

use std::future::Future;
use std::time::Duration;

use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::pubsub::{ConnectionHandle, PubSubConnect, PubSubFrontend};
use alloy::rpc::client::ClientBuilder;
use alloy::transports::{TransportErrorKind, TransportResult};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, select_all, BoxStream, SelectAll};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::decoder::RawEvent;
use crate::router::{FactoryVersion, TaggedEvent};

/// Default delay before a full reconnect
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Errors that end a streaming session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("subscription to {factory} factory failed: {reason}")]
    SubscriptionFailed {
        factory: FactoryVersion,
        reason: String,
    },

    #[error("{0} factory subscription ended")]
    SubscriptionEnded(FactoryVersion),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed by provider")]
    Closed,
}

impl StreamError {
    /// Whether the session ended with an error rather than a plain close
    pub fn is_error(&self) -> bool {
        !matches!(self, StreamError::Closed)
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Errored,
    Closed,
    Reconnecting,
}

/// One live connection carrying both factory subscriptions
#[async_trait]
pub trait EventSession: Send {
    /// Next tagged log; an `Err` ends the session
    async fn next_event(&mut self) -> Result<TaggedEvent, StreamError>;

    /// Tear the connection down. Called exactly once, after the last `next_event`.
    async fn terminate(self: Box<Self>);
}

/// Factory for fresh sessions
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn EventSession>, StreamError>;
}

/// Configuration for the streaming connection
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Provider WebSocket URL
    pub ws_url: String,
    /// Factories to subscribe to
    pub sources: Vec<FactoryVersion>,
    /// Fixed delay between a session ending and the next connect
    pub reconnect_delay: Duration,
}

impl StreamConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            sources: FactoryVersion::ALL.to_vec(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// `WsConnect` with alloy's in-place reconnect turned off
///
/// The pubsub service normally reconnects a dropped socket itself and re-issues the
/// subscriptions on the same provider. Refusing that makes a dropped socket end every
/// subscription stream, so the session closes and [`StreamConnector::run`] decides
/// when to connect again.
#[derive(Debug, Clone)]
pub struct NoReconnectWs(pub WsConnect);

impl PubSubConnect for NoReconnectWs {
    fn is_local(&self) -> bool {
        self.0.is_local()
    }

    fn connect(&self) -> impl Future<Output = TransportResult<ConnectionHandle>> + Send {
        self.0.connect()
    }

    fn try_reconnect(&self) -> impl Future<Output = TransportResult<ConnectionHandle>> + Send {
        future::ready(Err(TransportErrorKind::custom_str(
            "in-place reconnect disabled; the stream connector reconnects",
        )))
    }
}

/// Alloy WebSocket provider as an [`EventSource`]
pub struct WsEventSource {
    ws_url: String,
    sources: Vec<FactoryVersion>,
}

impl WsEventSource {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            sources: config.sources.clone(),
        }
    }
}

#[async_trait]
impl EventSource for WsEventSource {
    async fn open(&self) -> Result<Box<dyn EventSession>, StreamError> {
        info!(url = %self.ws_url, "connecting to provider WebSocket");

        let client = ClientBuilder::default()
            .pubsub(NoReconnectWs(WsConnect::new(self.ws_url.clone())))
            .await
            .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;
        let provider = ProviderBuilder::new().on_client(client);

        let mut subscriptions = Vec::with_capacity(self.sources.len());
        for &source in &self.sources {
            let subscription = provider
                .subscribe_logs(&source.log_filter())
                .await
                .map_err(|e| StreamError::SubscriptionFailed {
                    factory: source,
                    reason: e.to_string(),
                })?;

            info!(source = %source, factory = %source.factory_address(), "subscribed to factory logs");

            let logs = subscription
                .into_stream()
                .map(|log| RawEvent::from(&log))
                .boxed();
            subscriptions.push((source, logs));
        }

        Ok(Box::new(WsSession {
            provider,
            events: merge_subscriptions(subscriptions),
        }))
    }
}

/// Every factory's logs in one stream
pub type MergedEvents = SelectAll<BoxStream<'static, Result<TaggedEvent, StreamError>>>;

/// Tag each subscription's logs and merge them. A subscription that ends yields
/// [`StreamError::SubscriptionEnded`] so the session stops while the others are
/// still live.
pub fn merge_subscriptions<I>(subscriptions: I) -> MergedEvents
where
    I: IntoIterator<Item = (FactoryVersion, BoxStream<'static, RawEvent>)>,
{
    select_all(subscriptions.into_iter().map(|(source, logs)| {
        logs.map(move |event| Ok(TaggedEvent::new(source, event)))
            .chain(stream::once(future::ready(Err(StreamError::SubscriptionEnded(source)))))
            .boxed()
    }))
}

/// Next item of a merged stream; an empty merge counts as closed
pub async fn next_merged(events: &mut MergedEvents) -> Result<TaggedEvent, StreamError> {
    events.next().await.unwrap_or(Err(StreamError::Closed))
}

struct WsSession {
    provider: RootProvider<PubSubFrontend>,
    events: MergedEvents,
}

#[async_trait]
impl EventSession for WsSession {
    async fn next_event(&mut self) -> Result<TaggedEvent, StreamError> {
        next_merged(&mut self.events).await
    }

    async fn terminate(self: Box<Self>) {
        let WsSession { provider, events } = *self;
        // Subscriptions first, then the last provider handle, which shuts the socket
        drop(events);
        drop(provider);
        info!("provider connection terminated");
    }
}

/// Reconnecting driver around an [`EventSource`]
pub struct StreamConnector<S> {
    source: S,
    reconnect_delay: Duration,
    state: watch::Sender<ConnectionState>,
    sessions_opened: u64,
}

impl StreamConnector<WsEventSource> {
    /// Connector over the alloy WebSocket provider
    pub fn websocket(config: &StreamConfig) -> Self {
        Self::new(WsEventSource::new(config), config.reconnect_delay)
    }
}

impl<S: EventSource> StreamConnector<S> {
    pub fn new(source: S, reconnect_delay: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            source,
            reconnect_delay,
            state,
            sessions_opened: 0,
        }
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Number of sessions that reached `Open`
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_replace(next);
    }

    /// Stream forever, handing every log to `on_event`. Never returns.
    pub async fn run<F>(&mut self, mut on_event: F)
    where
        F: FnMut(TaggedEvent) + Send,
    {
        loop {
            let reason = self.run_session(&mut on_event).await;
            if reason.is_error() {
                error!(error = %reason, "provider session failed");
            } else {
                warn!(sessions = self.sessions_opened(), "provider session closed");
            }

            self.set_state(ConnectionState::Reconnecting);
            let delay = self.reconnect_delay();
            info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
            sleep(delay).await;
        }
    }

    /// One session from connect to termination. Returns why it ended.
    pub async fn run_session<F>(&mut self, on_event: &mut F) -> StreamError
    where
        F: FnMut(TaggedEvent) + Send,
    {
        self.set_state(ConnectionState::Connecting);

        let mut session = match self.source.open().await {
            Ok(session) => session,
            Err(e) => {
                self.set_state(ConnectionState::Errored);
                return e;
            }
        };

        self.sessions_opened += 1;
        self.set_state(ConnectionState::Open);
        info!(session = self.sessions_opened, "provider session open");

        let reason = loop {
            match session.next_event().await {
                Ok(event) => on_event(event),
                Err(e) => break e,
            }
        };

        self.set_state(if reason.is_error() {
            ConnectionState::Errored
        } else {
            ConnectionState::Closed
        });

        session.terminate().await;
        reason
    }
}
