//! Templated HTTP forwarding of comments.

use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::message::WrappedMessage;

/// Comment text used when a message has none.
pub const EMPTY_COMMENT_PLACEHOLDER: &str = "(no comment)";

static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(id|comment|isOwner|userId|name)\}").unwrap());

/// Where and how to forward each comment.
///
/// `{id}`, `{comment}`, `{isOwner}`, `{userId}` and `{name}` in `url` and
/// `body` are replaced per message. An empty `method` disables the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub body: String,
}

impl RelayConfig {
    pub fn is_enabled(&self) -> bool {
        !self.method.trim().is_empty()
    }
}

/// Values substituted into a [`RelayConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayParams {
    pub id: String,
    pub comment: String,
    pub is_owner: bool,
    pub user_id: String,
    pub name: String,
}

impl RelayParams {
    pub fn from_message(message: &WrappedMessage) -> Self {
        let comment = message
            .content()
            .map(str::to_string)
            .unwrap_or_else(|| message.display_text());
        Self {
            id: message
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            comment: if comment.is_empty() {
                EMPTY_COMMENT_PLACEHOLDER.to_string()
            } else {
                comment
            },
            is_owner: message.is_owner(),
            user_id: message.user_id().unwrap_or_default().to_string(),
            name: message.user_name().unwrap_or_default().to_string(),
        }
    }

    /// Replace tokens in `template` in one pass; substituted values are
    /// never scanned for further tokens.
    fn substitute(&self, template: &str, encode: bool) -> String {
        let is_owner = self.is_owner.to_string();
        TOKEN_REGEX
            .replace_all(template, |caps: &Captures| {
                let value = match &caps[1] {
                    "id" => self.id.as_str(),
                    "comment" => self.comment.as_str(),
                    "isOwner" => is_owner.as_str(),
                    "userId" => self.user_id.as_str(),
                    _ => self.name.as_str(),
                };
                if encode {
                    urlencoding::encode(value).into_owned()
                } else {
                    value.to_string()
                }
            })
            .into_owned()
    }
}

/// Forwards comments to a user-configured endpoint.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: Client,
}

impl HttpRelay {
    pub fn new(timeout: Duration) -> Self {
        ndgr_client::install_rustls_provider();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Forward `message`. Returns the response text, or a description of
    /// the failure; never fails.
    pub async fn send(&self, message: &WrappedMessage, config: &RelayConfig) -> String {
        self.send_params(&RelayParams::from_message(message), config)
            .await
    }

    pub async fn send_params(&self, params: &RelayParams, config: &RelayConfig) -> String {
        let url = params.substitute(&config.url, true);

        let request = match config.method.trim().to_uppercase().as_str() {
            "GET" => self.client.get(&url),
            method @ ("POST" | "PUT") => {
                let builder = if method == "POST" {
                    self.client.post(&url)
                } else {
                    self.client.put(&url)
                };
                builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(params.substitute(&config.body, false))
            }
            other => {
                warn!(method = %other, "Unsupported relay method");
                return format!("unsupported method: {other}");
            }
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Relay request failed");
                return format!("request failed: {e}");
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(url = %url, status = %status, error = %e, "Relay response unreadable");
                return format!("response unreadable ({status}): {e}");
            }
        };
        if !status.is_success() {
            warn!(url = %url, status = %status, body = %text, "Relay failed");
        } else {
            debug!(url = %url, status = %status, "Relay sent");
        }
        text
    }
}

impl Default for HttpRelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
