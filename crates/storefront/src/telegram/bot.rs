//! Minimal Telegram Bot API client.
//!
//! Only outbound messages are needed: order notifications to customers and the
//! shop's admin chat. Incoming updates are not handled.

use std::time::Duration;

use kafsh_core::TelegramChatId;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Telegram Bot API base URL.
const BASE_URL: &str = "https://api.telegram.org";

/// Errors that can occur when calling the Bot API.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned `ok: false`.
    #[error("API error: {code} - {description}")]
    Api { code: u16, description: String },
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: TelegramChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: [[WebAppButton<'a>; 1]; 1],
}

#[derive(Debug, Serialize)]
struct WebAppButton<'a> {
    text: &'a str,
    web_app: WebAppInfo<'a>,
}

#[derive(Debug, Serialize)]
struct WebAppInfo<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

/// A button that opens a page of the Mini App.
#[derive(Debug, Clone, Copy)]
pub struct OpenAppButton<'a> {
    pub text: &'a str,
    pub url: &'a str,
}

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramBotClient {
    client: reqwest::Client,
    token: SecretString,
    base_url: String,
}

impl TelegramBotClient {
    /// Create a new client for the given bot token.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(token: SecretString) -> Result<Self, TelegramError> {
        Self::with_base_url(token, BASE_URL)
    }

    /// Create a client against a different API host (local Bot API server).
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn with_base_url(token: SecretString, base_url: &str) -> Result<Self, TelegramError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send an HTML-formatted message, optionally with a button opening the Mini App.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Telegram rejects the message
    /// (for example when the user never started the bot).
    pub async fn send_message(
        &self,
        chat_id: TelegramChatId,
        html: &str,
        button: Option<OpenAppButton<'_>>,
    ) -> Result<(), TelegramError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.base_url,
            self.token.expose_secret()
        );

        let body = SendMessage {
            chat_id,
            text: html,
            parse_mode: Some("HTML"),
            reply_markup: button.map(|b| InlineKeyboard {
                inline_keyboard: [[WebAppButton {
                    text: b.text,
                    web_app: WebAppInfo { url: b.url },
                }]],
            }),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let api: ApiResponse = response.json().await?;

        if !api.ok {
            return Err(TelegramError::Api {
                code: api.error_code.unwrap_or_else(|| status.as_u16()),
                description: api.description.unwrap_or_default(),
            });
        }

        Ok(())
    }
}

/// Escape text for Telegram's HTML parse mode.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>A & B</b>"), "&lt;b&gt;A &amp; B&lt;/b&gt;");
        assert_eq!(escape_html("کفش ورزشی"), "کفش ورزشی");
    }

    #[test]
    fn test_send_message_payload_shape() {
        let body = SendMessage {
            chat_id: TelegramChatId::new(42),
            text: "hi",
            parse_mode: Some("HTML"),
            reply_markup: Some(InlineKeyboard {
                inline_keyboard: [[WebAppButton {
                    text: "open",
                    web_app: WebAppInfo {
                        url: "https://kafsh.shop/orders/KF-7Q2M9XHD",
                    },
                }]],
            }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["chat_id"], 42);
        assert_eq!(
            json["reply_markup"]["inline_keyboard"][0][0]["web_app"]["url"],
            "https://kafsh.shop/orders/KF-7Q2M9XHD"
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client =
            TelegramBotClient::with_base_url(SecretString::from("1:x"), "http://localhost:8081/")
                .unwrap();
        assert_eq!(client.base_url, "http://localhost:8081");
    }
}
