use std::fmt;
use thiserror::Error;
use tokio::time::Duration;

use crate::controllers::cluster::ReconcileStep;

#[derive(Error, Debug)]
pub enum StdError {
    #[error("JsonSerializationError: {0}")]
    JsonSerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("ExecError: {0}")]
    ExecError(String),

    #[error("ScaleDownRefused: {0}")]
    ScaleDownRefused(String),

    #[error("InvalidSpec: {0}")]
    InvalidSpec(String),
}

impl StdError {
    pub fn metric_label(&self) -> String {
        match self {
            StdError::JsonSerializationError(_) => "jsonserializationerror",
            StdError::KubeError(_) => "kubeerror",
            StdError::MetadataMissing(_) => "metadatamissing",
            StdError::ExecError(_) => "execerror",
            StdError::ScaleDownRefused(_) => "scaledownrefused",
            StdError::InvalidSpec(_) => "invalidspec",
        }
        .to_string()
    }
}

#[derive(Error, Debug)]
pub struct ErrorWithRequeue {
    pub duration: Duration,
    pub error: StdError,
}

impl ErrorWithRequeue {
    pub fn new(error: StdError, duration: Duration) -> ErrorWithRequeue {
        ErrorWithRequeue { error, duration }
    }

    pub fn metric_label(&self) -> String {
        self.error.metric_label()
    }
}

impl fmt::Display for ErrorWithRequeue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Standard Error: {0}")]
    StdError(#[source] StdError),

    #[error("Error With Requeue: {0}")]
    ErrorWithRequeue(#[source] ErrorWithRequeue),

    #[error("{namespace}/{name}: {step} reconcile failed: {source}")]
    StepFailed {
        namespace: String,
        name: String,
        step: ReconcileStep,
        #[source]
        source: Box<Error>,
    },

    #[error("reconcile target is missing")]
    MissingTarget,
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::StdError(e) => e.metric_label(),
            Error::ErrorWithRequeue(e) => e.metric_label(),
            Error::StepFailed { source, .. } => source.metric_label(),
            Error::MissingTarget => "missingtarget".to_string(),
        }
    }

    /// The requeue delay carried by this error (or the error it wraps), if any.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Error::ErrorWithRequeue(e) => Some(e.duration),
            Error::StepFailed { source, .. } => source.requeue_after(),
            _ => None,
        }
    }

    /// True when the store rejected a create because the object is already there.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::StdError(StdError::KubeError(kube::Error::Api(response))) => {
                response.code == 409 && response.reason == "AlreadyExists"
            }
            _ => false,
        }
    }

    pub fn step_failed(namespace: &str, name: &str, step: ReconcileStep, source: Error) -> Error {
        Error::StepFailed {
            namespace: namespace.to_string(),
            name: name.to_string(),
            step,
            source: Box::new(source),
        }
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::StdError(StdError::KubeError(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> Error {
        Error::from(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: reason.to_string(),
            code,
        }))
    }

    #[test]
    fn already_exists_is_detected_from_conflict_responses() {
        assert!(api_error(409, "AlreadyExists").is_already_exists());
        assert!(!api_error(409, "Conflict").is_already_exists());
        assert!(!api_error(500, "InternalError").is_already_exists());
        assert!(!Error::MissingTarget.is_already_exists());
    }

    #[test]
    fn step_failure_keeps_context_and_requeue() {
        let inner = Error::ErrorWithRequeue(ErrorWithRequeue::new(
            StdError::MetadataMissing("name".to_string()),
            Duration::from_secs(30),
        ));
        let err = Error::step_failed("default", "example", ReconcileStep::Service, inner);

        assert_eq!(err.requeue_after(), Some(Duration::from_secs(30)));
        assert_eq!(err.metric_label(), "metadatamissing");
        assert_eq!(
            err.to_string(),
            "default/example: service reconcile failed: Error With Requeue: MetadataMissing: name"
        );
    }
}
