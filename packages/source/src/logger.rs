use crate::source::Source;
use tracing::{error, info, warn};

/// Logging collaborator held by every context
pub trait Logger {
    fn log_source(&self, source: &Source);
    fn log_information(&self, message: &str);
    fn log_warning(&self, message: &str);
    fn log_error(&self, message: &str, error: &dyn std::error::Error);
}

/// Forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log_source(&self, source: &Source) {
        info!(
            source = %source.id(),
            rows = source.len(),
            merge = ?source.merge_type(),
            "Source set"
        );
    }

    fn log_information(&self, message: &str) {
        info!("{}", message);
    }

    fn log_warning(&self, message: &str) {
        warn!("{}", message);
    }

    fn log_error(&self, message: &str, err: &dyn std::error::Error) {
        error!(error = %err, "{}", message);
    }
}
