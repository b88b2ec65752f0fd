use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::{Channel, ChannelSender};

/// Bot API `sendMessage`. The user's telegram contact is the chat id.
#[derive(Clone)]
pub struct TelegramSender {
    http: Client,
    api_base: String,
    token: String,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramSender {
    pub fn new(api_base: String, token: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .context("failed to build telegram http client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    #[instrument(skip(self, subject, body), target = "notification", level = "debug")]
    async fn send(&self, address: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let payload = json!({
            "chat_id": address,
            "text": format!("{subject}\n\n{body}"),
        });

        // the bot API reports failures in the body, sometimes with a 200
        let envelope: ApiEnvelope = self
            .http
            .post(self.send_message_url())
            .json(&payload)
            .send()
            .await
            .context("telegram api unreachable")?
            .json()
            .await
            .context("invalid telegram api response")?;

        if !envelope.ok {
            bail!(
                "telegram api error: {}",
                envelope.description.as_deref().unwrap_or("unknown")
            );
        }

        debug!("telegram message sent");
        Ok(())
    }
}
