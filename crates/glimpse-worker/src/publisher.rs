use glimpse_core::{Location, Notification};
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::compute_backoff;
use crate::channel::{ChannelError, ChannelResult, MessageChannel};

/// Publishing side of the notification channel.
#[derive(Clone)]
pub struct NotificationPublisher {
    channel: Arc<dyn MessageChannel>,
}

impl NotificationPublisher {
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self { channel }
    }

    /// Announce that `location` holds a new object.
    ///
    /// Returns once the channel accepted the notification.
    pub async fn send(&self, location: Location) -> ChannelResult<Notification> {
        let notification = Notification::new(location);
        self.channel.publish(notification.clone()).await?;

        tracing::info!(
            notification_id = %notification.id,
            location = %notification.location,
            "Notification published"
        );

        Ok(notification)
    }

    /// `send` with up to `max_attempts` tries. A closed channel is not retried.
    pub async fn send_with_retry(
        &self,
        location: Location,
        max_attempts: u32,
        base_backoff: Duration,
    ) -> ChannelResult<Notification> {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.send(location.clone()).await {
                Ok(notification) => return Ok(notification),
                Err(ChannelError::Closed) => return Err(ChannelError::Closed),
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = compute_backoff(attempt, base_backoff, base_backoff * 8);
                    tracing::warn!(
                        location = %location,
                        attempt = attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Notification publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
