use thiserror::Error;

/// Central error type for the calwave engine
#[derive(Error, Debug)]
pub enum CalwaveError {
    // ============================================================================
    // Task Errors
    // ============================================================================
    #[error("A computation is already running on slot '{0}'")]
    AlreadyRunning(String),

    #[error("Failed to start worker thread: {0}")]
    WorkerSpawnFailed(String),

    // ============================================================================
    // Stage Errors
    // ============================================================================
    #[error("Operation requires an earlier pipeline stage: {0}")]
    PreconditionNotMet(String),

    #[error("Invalid stage transition: {0}")]
    InvalidStageTransition(String),

    // ============================================================================
    // Collaborator Errors
    // ============================================================================
    /// The data/analysis collaborator rejected its inputs. Carries the
    /// human-readable message shown to the operator; there is no structured
    /// code beyond "domain validation failure".
    #[error("{0}")]
    DomainValidation(String),

    // ============================================================================
    // Settings Errors
    // ============================================================================
    #[error("Settings path not found: {0}")]
    SettingsPath(String),

    #[error("Settings value has the wrong kind: {0}")]
    SettingsKind(String),

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mutex lock error")]
    LockError,

    #[error("Internal error: {0}")]
    Internal(String),
}

// Implement conversion from PoisonError for Mutex locks
impl<T> From<std::sync::PoisonError<T>> for CalwaveError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        CalwaveError::LockError
    }
}

// Implement conversion to String for the shell boundary
impl From<CalwaveError> for String {
    fn from(error: CalwaveError) -> Self {
        error.to_string()
    }
}

// Helper type alias for Results
pub type CalwaveResult<T> = Result<T, CalwaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CalwaveError::AlreadyRunning("main".to_string());
        assert_eq!(
            err.to_string(),
            "A computation is already running on slot 'main'"
        );
    }

    #[test]
    fn test_domain_validation_carries_message_only() {
        let err = CalwaveError::DomainValidation("Dataset is empty".to_string());
        assert_eq!(err.to_string(), "Dataset is empty");
    }

    #[test]
    fn test_error_conversion_to_string() {
        let err = CalwaveError::PreconditionNotMet("filter requires imported data".to_string());
        let s: String = err.into();
        assert_eq!(
            s,
            "Operation requires an earlier pipeline stage: filter requires imported data"
        );
    }

    #[test]
    fn test_poison_error_conversion() {
        let mutex = std::sync::Mutex::new(());
        let guard = mutex.lock().unwrap();
        let poison = std::sync::PoisonError::new(guard);
        let err: CalwaveError = poison.into();
        assert!(matches!(err, CalwaveError::LockError));
    }
}
