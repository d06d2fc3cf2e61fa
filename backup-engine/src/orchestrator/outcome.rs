use crate::utils::errors::BackupError;

/// Result of a sub-step that may be tolerated by its parent operation.
///
/// `Fatal` carries whatever partial value the step produced (e.g. the
/// commit made before a push failed) so the parent can still record it.
#[derive(Debug)]
pub enum StepOutcome<T> {
    Ok(T),
    Advisory(Option<T>, String),
    Fatal(BackupError, Option<T>),
}

impl<T> StepOutcome<T> {
    /// Downgrades a fatal outcome to an advisory one, for best-effort steps.
    pub fn tolerate(self) -> Self {
        match self {
            StepOutcome::Fatal(err, value) => StepOutcome::Advisory(value, err.to_string()),
            other => other,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            StepOutcome::Ok(value) => Some(value),
            StepOutcome::Advisory(value, _) | StepOutcome::Fatal(_, value) => value.as_ref(),
        }
    }

    pub fn advisory(&self) -> Option<&str> {
        match self {
            StepOutcome::Advisory(_, message) => Some(message),
            _ => None,
        }
    }
}
