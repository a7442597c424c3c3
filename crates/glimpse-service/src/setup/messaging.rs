use anyhow::Result;
use glimpse_core::Config;
use glimpse_worker::InMemoryChannel;
use std::sync::Arc;

/// Build the notification channel. `Config::validate` has already limited
/// the broker to `memory://`.
pub fn setup_channel(config: &Config) -> Result<Arc<InMemoryChannel>> {
    tracing::info!(
        broker = %config.messaging_broker_uri,
        capacity = config.messaging_channel_capacity,
        "Message channel initialized"
    );

    Ok(Arc::new(InMemoryChannel::new(
        config.messaging_channel_capacity,
    )))
}
