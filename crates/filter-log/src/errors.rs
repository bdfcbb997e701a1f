use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("no session provider")]
    NoProvider,
    #[error("session provider failed")]
    Provider,
}

impl LogError {
    pub fn into_filter_log_error(
        self,
        detail: impl Into<String>,
    ) -> filterkit_core_types::FilterLogError {
        let message = format!("{}: {}", self, detail.into());
        filterkit_core_types::FilterLogError::new(message)
    }
}
