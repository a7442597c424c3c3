//! Message channel abstraction.
//!
//! Delivery is at-least-once and ordered per publisher: a single subscriber
//! receives notifications in the order they were accepted. Redeliveries
//! re-enter the queue behind anything published in the meantime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glimpse_core::Notification;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel is closed")]
    Closed,

    #[error("Publish rejected: {0}")]
    Rejected(String),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// One delivery attempt of a notification. `attempt` starts at 1.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub notification: Notification,
    pub attempt: u32,
}

impl Delivery {
    pub fn first(notification: Notification) -> Self {
        Self {
            notification,
            attempt: 1,
        }
    }

    pub fn next_attempt(self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self
        }
    }
}

/// A notification removed from the main queue after its handler kept failing.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub notification: Notification,
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(delivery: Delivery, last_error: impl Into<String>) -> Self {
        Self {
            notification: delivery.notification,
            attempts: delivery.attempt,
            last_error: last_error.into(),
            dead_lettered_at: Utc::now(),
        }
    }
}

/// Transport between the upload path and the analysis path.
///
/// Every delivery handed out by `receive` must be settled exactly once with
/// `ack`, `redeliver` or `dead_letter`.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Accept a notification. Returns once the channel has taken ownership;
    /// never waits for consumption.
    async fn publish(&self, notification: Notification) -> ChannelResult<()>;

    /// Next delivery in order, or `None` once the channel is closed and drained.
    async fn receive(&self) -> ChannelResult<Option<Delivery>>;

    /// Settle a delivery whose handler succeeded.
    async fn ack(&self, delivery: &Delivery) -> ChannelResult<()>;

    /// Queue another attempt of a failed delivery.
    async fn redeliver(&self, delivery: Delivery) -> ChannelResult<()>;

    /// Move a delivery to the dead-letter side channel.
    async fn dead_letter(&self, dead: DeadLetter) -> ChannelResult<()>;

    /// Stop accepting new publishes. Queued deliveries are still handed out.
    fn close(&self);
}
