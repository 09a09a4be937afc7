//! Telegram Notifier
//!
//! Renders a [`PairRecord`] as a MarkdownV2 alert and posts it through the Telegram
//! Bot API. Delivery is attempted once; the pipeline logs failures and moves on.

use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::decoder::PairRecord;

/// Bot API base URL
pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

/// Alert channel used when none is configured
pub const DEFAULT_CHAT_ID: i64 = -1001942290221;

/// Markup dialect of every alert
pub const PARSE_MODE: &str = "MarkdownV2";

/// Characters the alert text escapes before sending
pub const ESCAPED_CHARS: [char; 2] = ['.', '-'];

/// Errors that can occur while delivering an alert
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("telegram rejected the message: {0}")]
    Rejected(String),
}

/// Destination for rendered alert text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct SendMessageQuery<'a> {
    chat_id: i64,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
    text: &'a str,
}

/// The part of a Bot API reply we act on
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SendMessageResponse {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Telegram Bot API client bound to one chat
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: i64,
}

impl TelegramNotifier {
    /// Create a notifier against a Bot API base URL
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: i64,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            bot_token: bot_token.into(),
            chat_id,
        })
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }

    /// Send already-escaped text
    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let query = SendMessageQuery {
            chat_id: self.chat_id,
            parse_mode: PARSE_MODE,
            disable_web_page_preview: true,
            text,
        };

        // Rejections come back as 4xx with a JSON body, so the status is not checked
        let reply: SendMessageResponse = self
            .client
            .get(self.send_message_url())
            .query(&query)
            .send()
            .await?
            .json()
            .await?;

        if reply.ok {
            info!(chat_id = self.chat_id, "telegram alert sent");
            Ok(())
        } else {
            Err(NotifyError::Rejected(
                reply.description.unwrap_or_else(|| "ok=false".to_string()),
            ))
        }
    }
}

#[async_trait]
impl AlertSink for TelegramNotifier {
    async fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        self.send(text).await
    }
}

/// Backslash-escape every `.` and `-`
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if ESCAPED_CHARS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn etherscan_token_url(token: Address) -> String {
    format!("https://etherscan.io/token/{token}")
}

pub fn dextools_pair_url(pair: Address) -> String {
    format!("https://www.dextools.io/app/en/ether/pair-explorer/{pair}")
}

pub fn quickintel_scanner_url(token: Address) -> String {
    format!("https://app.quickintel.io/scanner?type=token&chain=eth&contractAddress={token}")
}

/// Render the alert for a record, escaped and ready to send
pub fn format_alert(record: &PairRecord) -> String {
    let token = record.token_address;
    let pair = record.pair_address;

    // `\|` is already escaped for MarkdownV2 and is left alone by escape_markdown
    let text = format!(
        "🔹 \\| {name} \\| {symbol} \\|\n\
         🔹 CA: `{token}`\n\
         🔹 Pair: `{pair}`\n\
         [EtherScan]({etherscan})\n\
         [DexTools]({dextools})\n\
         [QuickIntel]({quickintel})\n",
        name = record.display_name(),
        symbol = record.display_symbol(),
        etherscan = etherscan_token_url(token),
        dextools = dextools_pair_url(pair),
        quickintel = quickintel_scanner_url(token),
    );

    escape_markdown(&text)
}
