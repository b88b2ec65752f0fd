use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{Channel, ChannelSender};

/// Sends mail through an HTTP relay that accepts one JSON message per POST.
#[derive(Clone)]
pub struct EmailSender {
    http: Client,
    relay_url: String,
    from: String,
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl EmailSender {
    pub fn new(relay_url: String, from: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .context("failed to build email http client")?;

        Ok(Self {
            http,
            relay_url,
            from,
        })
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    #[instrument(skip(self, body), target = "notification", level = "debug")]
    async fn send(&self, address: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let mail = OutgoingMail {
            from: &self.from,
            to: address,
            subject,
            text: body,
        };

        self.http
            .post(&self.relay_url)
            .json(&mail)
            .send()
            .await
            .context("email relay unreachable")?
            .error_for_status()
            .context("email relay rejected message")?;

        debug!("email handed to relay");
        Ok(())
    }
}
