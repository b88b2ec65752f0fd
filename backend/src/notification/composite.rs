use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use super::{ChannelSender, Notifier, cancellation_body, cancellation_subject};
use crate::booking::model::Booking;
use crate::user::model::User;

/// Fans one notice out to every configured channel.
///
/// Channels the user has no address for are skipped. Every reachable channel
/// is attempted even when another fails; any failure makes the whole call
/// fail, with per-channel detail only in the logs.
#[derive(Clone, Default)]
pub struct CompositeNotifier {
    senders: Vec<Arc<dyn ChannelSender>>,
}

impl CompositeNotifier {
    pub fn new(senders: Vec<Arc<dyn ChannelSender>>) -> Self {
        Self { senders }
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn notify_cancellation(&self, user: &User, booking: &Booking) -> anyhow::Result<()> {
        let subject = cancellation_subject();
        let body = cancellation_body(booking);

        let attempts = self.senders.iter().filter_map(|sender| {
            let channel = sender.channel();
            match channel.contact(user) {
                Some(address) => Some((sender, channel, address)),
                None => {
                    debug!(%channel, user_id = %user.id, "no contact for channel; skipping");
                    None
                }
            }
        });

        let results = join_all(attempts.map(|(sender, channel, address)| {
            let body = body.as_str();
            async move { (channel, sender.send(address, subject, body).await) }
        }))
        .await;

        let attempted = results.len();
        let mut failed = 0usize;
        for (channel, res) in results {
            if let Err(e) = res {
                failed += 1;
                warn!(
                    %channel,
                    user_id = %user.id,
                    booking_id = %booking.id,
                    error = ?e,
                    "notification channel failed"
                );
            }
        }

        if failed > 0 {
            bail!("{failed} of {attempted} notification channels failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Channel;
    use crate::user::model::UserRole;
    use chrono::{Duration, Utc};
    use parking_lot::Mutex;
    use uuid::Uuid;

    struct Recording {
        channel: Channel,
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(channel: Channel, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                channel,
                fail,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChannelSender for Recording {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, address: &str, _subject: &str, _body: &str) -> anyhow::Result<()> {
            self.sent.lock().push(address.to_string());
            if self.fail {
                bail!("{} relay down", self.channel);
            }
            Ok(())
        }
    }

    fn booking() -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: crate::booking::model::BookingStatus::Cancelled,
            created_at: now,
            expires_at: now + Duration::minutes(30),
            confirmed_at: None,
        }
    }

    #[tokio::test]
    async fn missing_contact_is_skipped_silently() {
        let email = Recording::new(Channel::Email, false);
        let tg = Recording::new(Channel::Telegram, true);
        let n = CompositeNotifier::new(vec![email.clone() as Arc<dyn ChannelSender>, tg.clone()]);

        let user = User::new(Some("a@b.c".into()), None, UserRole::User, Utc::now());
        n.notify_cancellation(&user, &booking()).await.unwrap();

        assert_eq!(email.sent.lock().len(), 1);
        assert!(tg.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn one_failure_fails_the_aggregate_but_others_still_run() {
        let email = Recording::new(Channel::Email, true);
        let tg = Recording::new(Channel::Telegram, false);
        let n = CompositeNotifier::new(vec![email.clone() as Arc<dyn ChannelSender>, tg.clone()]);

        let user = User::new(
            Some("a@b.c".into()),
            Some("12345".into()),
            UserRole::User,
            Utc::now(),
        );
        let err = n.notify_cancellation(&user, &booking()).await.unwrap_err();

        assert!(err.to_string().contains("1 of 2"));
        assert_eq!(tg.sent.lock().as_slice(), ["12345".to_string()]);
    }

    #[tokio::test]
    async fn no_channels_is_a_no_op() {
        let n = CompositeNotifier::default();
        assert!(n.is_empty());
        let user = User::new(None, None, UserRole::User, Utc::now());
        n.notify_cancellation(&user, &booking()).await.unwrap();
    }
}
