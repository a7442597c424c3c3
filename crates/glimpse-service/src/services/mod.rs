pub mod ingest;

pub use ingest::{IngestError, IngestReceipt, IngestService, NotificationStatus};
