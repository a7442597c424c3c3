use glimpse_core::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. Target matching is by prefix, so
/// this covers every `glimpse_*` crate.
pub const DEFAULT_FILTER: &str = "glimpse=info";

/// Initialize tracing
///
/// `default_filter` applies when `RUST_LOG` is unset or invalid. Fails if a
/// global subscriber is already installed.
pub fn init_telemetry(format: LogFormat, default_filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let (pretty, json) = match format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!(log_format = ?format, "Tracing initialized");
    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails_instead_of_panicking() {
        let _ = init_telemetry(LogFormat::Json, DEFAULT_FILTER);
        assert!(init_telemetry(LogFormat::Pretty, DEFAULT_FILTER).is_err());
    }
}
