//! In-process channel backed by a bounded tokio mpsc queue.

use async_trait::async_trait;
use glimpse_core::Notification;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};

use crate::channel::{ChannelError, ChannelResult, DeadLetter, Delivery, MessageChannel};

/// Dead letters kept for inspection before the oldest are discarded.
pub const DEFAULT_DEAD_LETTER_RETENTION: usize = 1024;

pub struct InMemoryChannel {
    sender: Mutex<Option<mpsc::Sender<Delivery>>>,
    receiver: AsyncMutex<mpsc::Receiver<Delivery>>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    dead_letter_retention: usize,
    // Published but not yet acked or dead-lettered.
    outstanding: watch::Sender<usize>,
}

impl InMemoryChannel {
    /// `capacity` bounds queued deliveries; `publish` waits for room.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (outstanding, _) = watch::channel(0);
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: AsyncMutex::new(rx),
            dead_letters: Mutex::new(VecDeque::new()),
            dead_letter_retention: DEFAULT_DEAD_LETTER_RETENTION,
            outstanding,
        }
    }

    /// Keep at most `retention` dead letters; older ones are dropped first.
    pub fn with_dead_letter_retention(mut self, retention: usize) -> Self {
        self.dead_letter_retention = retention.max(1);
        self
    }

    /// Snapshot of the retained dead letters, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .map(|letters| letters.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Notifications accepted but not yet settled.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolve once every accepted notification was acked or dead-lettered.
    pub async fn wait_until_settled(&self) {
        let mut rx = self.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn sender(&self) -> ChannelResult<mpsc::Sender<Delivery>> {
        self.sender
            .lock()
            .map_err(|_| ChannelError::Closed)?
            .clone()
            .ok_or(ChannelError::Closed)
    }

    fn settle_one(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn publish(&self, notification: Notification) -> ChannelResult<()> {
        let tx = self.sender()?;
        // Counted only once a slot is held, so a publish cancelled while
        // waiting for room leaves nothing outstanding.
        let permit = tx.reserve().await.map_err(|_| ChannelError::Closed)?;
        self.outstanding.send_modify(|n| *n += 1);
        permit.send(Delivery::first(notification));
        Ok(())
    }

    async fn receive(&self) -> ChannelResult<Option<Delivery>> {
        let mut rx = self.receiver.lock().await;
        Ok(rx.recv().await)
    }

    async fn ack(&self, _delivery: &Delivery) -> ChannelResult<()> {
        self.settle_one();
        Ok(())
    }

    async fn redeliver(&self, delivery: Delivery) -> ChannelResult<()> {
        let tx = self.sender()?;
        tx.send(delivery).await.map_err(|_| ChannelError::Closed)
    }

    async fn dead_letter(&self, dead: DeadLetter) -> ChannelResult<()> {
        tracing::error!(
            notification_id = %dead.notification.id,
            location = %dead.notification.location,
            attempts = dead.attempts,
            error = %dead.last_error,
            "Notification dead-lettered"
        );
        {
            let mut letters = self
                .dead_letters
                .lock()
                .map_err(|_| ChannelError::Rejected("dead-letter store poisoned".to_string()))?;
            if letters.len() >= self.dead_letter_retention {
                if let Some(dropped) = letters.pop_front() {
                    tracing::warn!(
                        notification_id = %dropped.notification.id,
                        retention = self.dead_letter_retention,
                        "Dead-letter retention reached, discarding oldest"
                    );
                }
            }
            letters.push_back(dead);
        }
        self.settle_one();
        Ok(())
    }

    fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}
