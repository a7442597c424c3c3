use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::Location;

/// Announcement that an object was stored at `location`.
///
/// Built by the publisher, owned by the channel while in transit, read-only
/// for the subscriber. `id` lets consumers correlate redeliveries of the same
/// message in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub location: Location,
    pub published_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(location: Location) -> Self {
        Self {
            id: Uuid::new_v4(),
            location,
            published_at: Utc::now(),
        }
    }
}
