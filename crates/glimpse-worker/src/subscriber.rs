//! Notification subscriber: a bounded worker pool draining a [`MessageChannel`].
//!
//! A single receive loop hands deliveries to workers in channel order, so with
//! `max_workers = 1` handlers run strictly in publish order. A failed delivery
//! is redelivered after a capped exponential backoff until the
//! [`DeadLetterPolicy`] gives up, and errors marked permanent with
//! [`HandlerError`] go straight to the dead-letter channel.
//!
//! Shutdown: [`NotificationSubscriber::shutdown`] stops the receive loop; it
//! does not wait for in-flight handlers.

use async_trait::async_trait;
use glimpse_core::{DeadLetterPolicy, HandlerError, Notification};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use crate::backoff::compute_backoff;
use crate::channel::{DeadLetter, Delivery, MessageChannel};

/// Consumer callback invoked once per delivery.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Return `Err` to have the delivery retried; wrap it in
    /// [`HandlerError::permanent`] to dead-letter it at once.
    async fn on_message(&self, notification: &Notification) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub max_workers: usize,
    pub dead_letter_policy: DeadLetterPolicy,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            dead_letter_policy: DeadLetterPolicy::DeadLetter { max_attempts: 5 },
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl From<&glimpse_core::Config> for SubscriberConfig {
    fn from(config: &glimpse_core::Config) -> Self {
        Self {
            max_workers: config.consumer_max_workers,
            dead_letter_policy: config.dead_letter_policy,
            base_backoff: config.redelivery_base_backoff,
            max_backoff: config.redelivery_max_backoff,
        }
    }
}

#[derive(Clone)]
pub struct NotificationSubscriber {
    shutdown_tx: mpsc::Sender<()>,
    config: SubscriberConfig,
}

impl NotificationSubscriber {
    /// Register `handler` on `channel` and start the worker pool.
    ///
    /// The pool stops when `shutdown` is called, when every clone of the
    /// returned subscriber is dropped, or when the channel is closed and drained.
    pub fn subscribe(
        channel: Arc<dyn MessageChannel>,
        handler: Arc<dyn NotificationHandler>,
        config: SubscriberConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let pool_config = config.clone();
        tokio::spawn(async move {
            Self::worker_pool(channel, handler, pool_config, shutdown_rx).await;
        });

        Self {
            shutdown_tx,
            config,
        }
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    async fn worker_pool(
        channel: Arc<dyn MessageChannel>,
        handler: Arc<dyn NotificationHandler>,
        config: SubscriberConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            dead_letter_policy = ?config.dead_letter_policy,
            "Notification subscriber started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));

        loop {
            // Take a worker slot before pulling the next delivery so nothing
            // is received that cannot be processed yet.
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = tokio::select! {
                _ = shutdown_rx.recv() => break,
                delivery = channel.receive() => delivery,
            };

            match delivery {
                Ok(Some(delivery)) => {
                    let channel = channel.clone();
                    let handler = handler.clone();
                    let config = config.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        Self::process_delivery(delivery, channel, handler, config).await;
                    });
                }
                Ok(None) => {
                    tracing::info!("Notification channel closed and drained");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive notification");
                    drop(permit);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        tracing::info!("Notification subscriber stopped");
    }

    #[tracing::instrument(
        skip_all,
        fields(
            notification.id = %delivery.notification.id,
            location = %delivery.notification.location,
            attempt = delivery.attempt
        )
    )]
    async fn process_delivery(
        delivery: Delivery,
        channel: Arc<dyn MessageChannel>,
        handler: Arc<dyn NotificationHandler>,
        config: SubscriberConfig,
    ) {
        // Run the handler in its own task so a panic is contained and counted
        // as a failed attempt.
        let notification = delivery.notification.clone();
        let outcome = tokio::spawn(async move { handler.on_message(&notification).await })
            .await
            .unwrap_or_else(|e| Err(anyhow::anyhow!("handler panicked: {}", e)));

        let error = match outcome {
            Ok(()) => {
                tracing::debug!("Notification handled");
                if let Err(e) = channel.ack(&delivery).await {
                    tracing::error!(error = %e, "Failed to ack notification");
                }
                return;
            }
            Err(error) => error,
        };

        let permanent = HandlerError::is_permanent(&error);
        if !permanent && config.dead_letter_policy.allows_redelivery(delivery.attempt) {
            let delay = compute_backoff(delivery.attempt, config.base_backoff, config.max_backoff);
            tracing::warn!(
                error = %format!("{:#}", error),
                retry_in_ms = delay.as_millis() as u64,
                "Notification handler failed, scheduling redelivery"
            );

            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let next = delivery.clone().next_attempt();
                if let Err(e) = channel.redeliver(next).await {
                    let dead = DeadLetter::new(
                        delivery,
                        format!("{:#}; redelivery failed: {}", error, e),
                    );
                    if let Err(e) = channel.dead_letter(dead).await {
                        tracing::error!(error = %e, "Failed to dead-letter notification");
                    }
                }
            });
            return;
        }

        tracing::error!(
            error = %format!("{:#}", error),
            permanent = permanent,
            "Notification handler failed, giving up"
        );
        if let Err(e) = channel
            .dead_letter(DeadLetter::new(delivery, format!("{:#}", error)))
            .await
        {
            tracing::error!(error = %e, "Failed to dead-letter notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryChannel;
    use crate::publisher::NotificationPublisher;
    use glimpse_core::{HandlerResultExt, Location};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn location(path: &str) -> Location {
        Location::parse(format!("blob://{}", path)).unwrap()
    }

    fn config(max_workers: usize, policy: DeadLetterPolicy) -> SubscriberConfig {
        SubscriberConfig {
            max_workers,
            dead_letter_policy: policy,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    /// Records handled paths; fails each path the configured number of times.
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
        failures: Mutex<HashMap<String, usize>>,
        permanent: bool,
        panic_on: Option<String>,
    }

    impl RecordingHandler {
        fn failing(path: &str, times: usize) -> Self {
            let handler = Self::default();
            handler
                .failures
                .lock()
                .unwrap()
                .insert(path.to_string(), times);
            handler
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationHandler for RecordingHandler {
        async fn on_message(&self, notification: &Notification) -> anyhow::Result<()> {
            let path = notification.location.path().to_string();
            self.seen.lock().unwrap().push(path.clone());

            if self.panic_on.as_deref() == Some(path.as_str()) {
                panic!("handler blew up on {}", path);
            }

            let should_fail = {
                let mut failures = self.failures.lock().unwrap();
                match failures.get_mut(&path) {
                    Some(remaining) if *remaining > 0 => {
                        *remaining -= 1;
                        true
                    }
                    _ => false,
                }
            };
            if !should_fail {
                return Ok(());
            }

            let result: anyhow::Result<()> = Err(anyhow::anyhow!("analysis of {} failed", path));
            if self.permanent {
                Ok(result.permanent()?)
            } else {
                result
            }
        }
    }

    async fn run(
        handler: Arc<RecordingHandler>,
        paths: &[&str],
        config: SubscriberConfig,
    ) -> Arc<InMemoryChannel> {
        let channel = Arc::new(InMemoryChannel::new(64));
        let subscriber = NotificationSubscriber::subscribe(channel.clone(), handler, config);
        let publisher = NotificationPublisher::new(channel.clone());

        for path in paths {
            publisher.send(location(path)).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), channel.wait_until_settled())
            .await
            .expect("deliveries were not settled in time");
        subscriber.shutdown().await;
        channel
    }

    #[tokio::test]
    async fn single_worker_handles_in_publish_order() {
        let handler = Arc::new(RecordingHandler::default());
        let paths = ["a.png", "b.png", "c.png", "d.png"];

        let channel = run(handler.clone(), &paths, config(1, DeadLetterPolicy::Redeliver)).await;

        assert_eq!(handler.seen(), paths);
        assert!(channel.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_is_redelivered() {
        let handler = Arc::new(RecordingHandler::failing("a.png", 2));

        let channel = run(handler.clone(), &["a.png"], config(1, DeadLetterPolicy::Redeliver)).await;

        assert_eq!(handler.seen(), vec!["a.png"; 3]);
        assert!(channel.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn exhausted_attempts_are_dead_lettered() {
        let handler = Arc::new(RecordingHandler::failing("a.png", usize::MAX));
        let policy = DeadLetterPolicy::DeadLetter { max_attempts: 3 };

        let channel = run(handler.clone(), &["a.png", "b.png"], config(1, policy)).await;

        let attempts_on_a = handler.seen().iter().filter(|p| *p == "a.png").count();
        assert_eq!(attempts_on_a, 3);
        assert!(handler.seen().contains(&"b.png".to_string()));

        let dead = channel.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].notification.location, location("a.png"));
        assert_eq!(dead[0].attempts, 3);
        assert!(dead[0].last_error.contains("analysis of a.png failed"));
    }

    #[tokio::test]
    async fn permanent_failure_skips_redelivery() {
        let mut handler = RecordingHandler::failing("a.png", usize::MAX);
        handler.permanent = true;
        let handler = Arc::new(handler);

        let channel = run(handler.clone(), &["a.png"], config(1, DeadLetterPolicy::Redeliver)).await;

        assert_eq!(handler.seen(), vec!["a.png"]);
        assert_eq!(channel.dead_letters().len(), 1);
        assert_eq!(channel.dead_letters()[0].attempts, 1);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_the_pool() {
        let handler = Arc::new(RecordingHandler {
            panic_on: Some("boom.png".to_string()),
            ..Default::default()
        });
        let policy = DeadLetterPolicy::DeadLetter { max_attempts: 1 };

        let channel = run(handler.clone(), &["boom.png", "ok.png"], config(1, policy)).await;

        assert_eq!(handler.seen(), vec!["boom.png", "ok.png"]);
        let dead = channel.dead_letters();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].last_error.contains("panicked"));
    }

    struct SlowHandler {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl NotificationHandler for SlowHandler {
        async fn on_message(&self, _notification: &Notification) -> anyhow::Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn worker_count_is_bounded() {
        let channel = Arc::new(InMemoryChannel::new(64));
        let handler = Arc::new(SlowHandler {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let subscriber = NotificationSubscriber::subscribe(
            channel.clone(),
            handler.clone(),
            config(2, DeadLetterPolicy::Redeliver),
        );
        let publisher = NotificationPublisher::new(channel.clone());

        for i in 0..8 {
            publisher.send(location(&format!("{}.png", i))).await.unwrap();
        }
        tokio::time::timeout(Duration::from_secs(5), channel.wait_until_settled())
            .await
            .unwrap();
        subscriber.shutdown().await;

        assert!(handler.peak.load(Ordering::SeqCst) <= 2);
        assert!(handler.peak.load(Ordering::SeqCst) >= 1);
    }
}
