//! Utilities module for errors, logging and evaluation metrics
//!
//! - Structured logging with tracing
//! - Accuracy, per-class metrics and confusion matrix
//! - The crate-wide error type

pub mod error;
pub mod logging;
pub mod metrics;

// Re-export main types for convenience
pub use error::{GrapeLeafError, Result};
pub use logging::{init_logging, LogConfig, TrainingLogger};
pub use metrics::{ClassMetrics, ConfusionMatrix, Metrics};

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}
