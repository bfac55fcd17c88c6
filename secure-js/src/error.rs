use crate::problem::Problem;
use std::fmt::Display;
use std::sync::Arc;

/// Errors raised by the host realm while running native code or reconfiguring members.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
  /// A script-visible `TypeError` (rejected `defineProperty`, calling a non-callable, ...).
  #[error("TypeError: {0}")]
  TypeError(String),

  /// Source handed to the dynamic-execution primitive could not be parsed.
  #[error("SyntaxError: {0}")]
  SyntaxError(String),

  /// A [`SecurityError`] thrown through a script-facing export.
  #[error("{0}")]
  Security(SecurityError),
}

/// Errors returned by the public hardening operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SecureError {
  /// The caller passed an argument of the wrong type or shape. Nothing was attempted.
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// Some members could not be protected and the caller asked for a hard failure.
  #[error("{0}")]
  Security(#[from] SecurityError),

  /// A host operation (usually a script callback) failed while delivering problems.
  #[error(transparent)]
  Host(#[from] HostError),
}

impl SecureError {
  pub(crate) fn invalid_argument(message: impl Display) -> Self {
    SecureError::InvalidArgument(message.to_string())
  }
}

impl From<SecureError> for HostError {
  fn from(err: SecureError) -> Self {
    match err {
      SecureError::InvalidArgument(message) => HostError::TypeError(message),
      SecureError::Security(err) => HostError::Security(err),
      SecureError::Host(err) => err,
    }
  }
}

/// Raised by [`crate::Secure::lock_standard_library`] with [`crate::ProblemHandler::Fail`] when at
/// least one standard-library member could not be locked.
#[derive(Debug, Clone, thiserror::Error)]
#[error("SecurityError: {message}")]
pub struct SecurityError {
  pub message: String,
  pub problems: Arc<[Problem]>,
}

impl SecurityError {
  pub fn new(problems: Arc<[Problem]>) -> Self {
    let message = format!(
      "unable to protect {count} standard library member(s)",
      count = problems.len()
    );
    Self { message, problems }
  }
}
