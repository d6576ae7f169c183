use thiserror::Error;

use crate::domain::intent::IntentKind;
use crate::turns::TurnTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("intent confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(String),
    #[error("outbound email needs at least one recipient")]
    MissingRecipients,
    #[error(transparent)]
    TurnTransition(#[from] TurnTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure of the intent recognizer for a single utterance.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("recognizer did not answer within {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("recognizer unavailable: {0}")]
    Unavailable(String),
    #[error("recognizer returned a malformed result: {0}")]
    Malformed(String),
}

/// Failure of the email executor. `Timeout` means the outcome of the side
/// effect is unknown.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("{kind} intent is not executable")]
    NotExecutable { kind: IntentKind },
    #[error("invalid recipient `{0}`")]
    InvalidRecipient(String),
    #[error("mailbox authentication failed: {0}")]
    AuthFailed(String),
    #[error("message `{0}` was not found")]
    MessageNotFound(String),
    #[error("another request for this caller is still running")]
    Busy,
    #[error("executor did not answer within {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("mail backend failure: {0}")]
    Backend(String),
}

impl ExecutionError {
    /// Short caller-facing summary, safe to speak aloud.
    pub fn user_summary(&self) -> String {
        match self {
            Self::NotExecutable { .. } => "the request was missing some details".to_owned(),
            Self::InvalidRecipient(recipient) => {
                format!("I couldn't find an address for {recipient}")
            }
            Self::AuthFailed(_) => "I couldn't sign in to your mailbox".to_owned(),
            Self::MessageNotFound(_) => "I couldn't find that email anymore".to_owned(),
            Self::Busy => "another request is still being handled".to_owned(),
            Self::Timeout { .. } => "your mail service didn't respond in time".to_owned(),
            Self::Backend(_) => "your mail service reported a problem".to_owned(),
        }
    }

    pub fn outcome_unknown(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Coarse failure classes used in logs and call reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    RecognitionFailed,
    AmbiguousIntent,
    ExecutionFailed,
    UnrecoverableSession,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecognitionFailed => "recognition_failed",
            Self::AmbiguousIntent => "ambiguous_intent",
            Self::ExecutionFailed => "execution_failed",
            Self::UnrecoverableSession => "unrecoverable_session",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => "The call is already in progress.",
            Self::NotFound { .. } => "No active call matches that id.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(_) => {
                Self::BadRequest { message: "domain validation failed".to_owned(), correlation_id }
            }
            ApplicationError::Execution(ExecutionError::Busy) => {
                Self::Conflict { message: ExecutionError::Busy.to_string(), correlation_id }
            }
            ApplicationError::Execution(ExecutionError::MessageNotFound(id)) => {
                Self::NotFound { message: format!("message `{id}`"), correlation_id }
            }
            ApplicationError::Recognition(error) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            ApplicationError::Execution(error) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{
        ApplicationError, DomainError, ExecutionError, InterfaceError, RecognitionError,
    };

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::MissingRecipients).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn recognizer_outage_maps_to_service_unavailable() {
        let interface =
            ApplicationError::from(RecognitionError::Unavailable("connection refused".to_owned()))
                .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn busy_executor_maps_to_conflict() {
        let interface = ApplicationError::from(ExecutionError::Busy).into_interface("req-3");
        assert!(matches!(interface, InterfaceError::Conflict { .. }));
    }

    #[test]
    fn only_timeouts_leave_the_outcome_unknown() {
        assert!(ExecutionError::Timeout { after_ms: 15_000 }.outcome_unknown());
        assert!(!ExecutionError::AuthFailed("expired token".to_owned()).outcome_unknown());
        assert_eq!(
            ExecutionError::InvalidRecipient("jane".to_owned()).user_summary(),
            "I couldn't find an address for jane"
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing mailbox token".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
