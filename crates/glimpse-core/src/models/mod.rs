pub mod analysis;
pub mod location;
pub mod notification;

pub use analysis::{AnalysisResult, Caption, Category, ColorInfo};
pub use location::{Location, LocationError};
pub use notification::Notification;
