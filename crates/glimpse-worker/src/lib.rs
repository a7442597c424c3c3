//! Glimpse Worker Library
//!
//! Decouples the upload path from the analysis path: a [`MessageChannel`]
//! carries [`Notification`](glimpse_core::Notification)s from a
//! [`NotificationPublisher`] to a [`NotificationSubscriber`], which runs a
//! bounded worker pool with redelivery and dead-lettering.

pub mod backoff;
pub mod channel;
pub mod memory;
pub mod publisher;
pub mod subscriber;

pub use backoff::compute_backoff;
pub use channel::{ChannelError, ChannelResult, DeadLetter, Delivery, MessageChannel};
pub use memory::InMemoryChannel;
pub use publisher::NotificationPublisher;
pub use subscriber::{NotificationHandler, NotificationSubscriber, SubscriberConfig};
