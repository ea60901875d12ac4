// src/notify/telegram.rs
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ContentType, Deliverer, DeliveryError};

const API_BASE: &str = "https://api.telegram.org";
/// Used when a 429 arrives without `parameters.retry_after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Bot API `sendMessage` deliverer. One HTTP call per `send`; retries are
/// the publisher's business.
#[derive(Clone)]
pub struct TelegramDeliverer {
    token: String,
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl TelegramDeliverer {
    pub fn new(token: String) -> Self {
        Self {
            token,
            base_url: API_BASE.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Point at a different Bot API server (self-hosted or test double).
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token)
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Default, Deserialize)]
struct BotReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ReplyParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Map a Bot API reply to the delivery outcome.
pub fn interpret_reply(status: u16, body: &str) -> Result<(), DeliveryError> {
    let reply: BotReply = serde_json::from_str(body).unwrap_or_default();
    if (200..300).contains(&status) && reply.ok {
        return Ok(());
    }
    let description = reply
        .description
        .clone()
        .unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        429 => {
            let secs = reply
                .parameters
                .and_then(|p| p.retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            Err(DeliveryError::RateLimited {
                retry_after: Duration::from_secs(secs),
            })
        }
        s if s >= 500 => Err(DeliveryError::Network(description)),
        _ => Err(DeliveryError::Rejected(description)),
    }
}

#[async_trait::async_trait]
impl Deliverer for TelegramDeliverer {
    async fn send(
        &self,
        channel_id: &str,
        message: &str,
        content_type: ContentType,
        preview: bool,
    ) -> Result<(), DeliveryError> {
        let payload = SendMessage {
            chat_id: channel_id,
            text: message,
            parse_mode: match content_type {
                ContentType::RichText => Some("HTML"),
                ContentType::Plain => None,
            },
            disable_web_page_preview: !preview,
        };

        let rsp = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    // the URL embeds the token; keep it out of the message
                    DeliveryError::Network(e.without_url().to_string())
                }
            })?;

        let status = rsp.status().as_u16();
        let body = rsp.text().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout
            } else {
                DeliveryError::Network(e.without_url().to_string())
            }
        })?;
        interpret_reply(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_reply() {
        assert_eq!(interpret_reply(200, r#"{"ok":true,"result":{}}"#), Ok(()));
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5","parameters":{"retry_after":5}}"#;
        assert_eq!(
            interpret_reply(429, body),
            Err(DeliveryError::RateLimited {
                retry_after: Duration::from_secs(5)
            })
        );
        assert_eq!(
            interpret_reply(429, "not json"),
            Err(DeliveryError::RateLimited {
                retry_after: Duration::from_secs(1)
            })
        );
    }

    #[test]
    fn client_errors_are_rejections_server_errors_are_transient() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities"}"#;
        assert_eq!(
            interpret_reply(400, body),
            Err(DeliveryError::Rejected("Bad Request: can't parse entities".into()))
        );
        assert!(matches!(interpret_reply(502, ""), Err(DeliveryError::Network(_))));
        assert_eq!(DeliveryError::Rejected("x".into()).penalty(), 2);
        assert_eq!(DeliveryError::Timeout.penalty(), 1);
    }

    #[test]
    fn payload_shape() {
        let p = SendMessage {
            chat_id: "-1001234567890",
            text: "<b>hi</b>",
            parse_mode: Some("HTML"),
            disable_web_page_preview: true,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["parse_mode"], "HTML");
        assert_eq!(v["disable_web_page_preview"], true);
    }
}
