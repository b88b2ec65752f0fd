//! Post-commit cancellation notices.
//!
//! Nothing here runs inside a database transaction. Failures are reported as
//! `anyhow::Error` and stop at the dispatcher, which logs them.

pub mod composite;
pub mod dispatcher;
pub mod email;
pub mod telegram;

use std::fmt;

use async_trait::async_trait;

use crate::booking::model::Booking;
use crate::user::model::User;

/// Tells a user that one of their bookings was cancelled.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_cancellation(&self, user: &User, booking: &Booking) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Email,
    Telegram,
}

impl Channel {
    /// The user's address on this channel, if they have one.
    pub fn contact(self, user: &User) -> Option<&str> {
        match self {
            Channel::Email => user.email.as_deref(),
            Channel::Telegram => user.telegram.as_deref(),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Email => "email",
            Channel::Telegram => "telegram",
        })
    }
}

/// Delivers one message over one channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, address: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

pub fn cancellation_subject() -> &'static str {
    "Booking cancelled"
}

pub fn cancellation_body(booking: &Booking) -> String {
    format!(
        "Your booking {} for event {} has been cancelled.",
        booking.id, booking.event_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::model::UserRole;
    use chrono::Utc;

    #[test]
    fn contact_follows_channel() {
        let u = User::new(
            Some("ana@example.com".into()),
            None,
            UserRole::User,
            Utc::now(),
        );
        assert_eq!(Channel::Email.contact(&u), Some("ana@example.com"));
        assert_eq!(Channel::Telegram.contact(&u), None);
    }
}
