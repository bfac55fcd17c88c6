use serde::Serialize;
use std::fmt;

/// Why a member could not be protected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemKind {
  /// The member does not exist.
  Missing,
  /// The member is already non-writable or non-configurable; someone else locked it first.
  AlreadyProtected,
  /// The member exists but is not a function.
  NotCallable,
  /// The member looked lockable but the change was rejected or did not stick.
  ProtectionFailed,
}

impl ProblemKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ProblemKind::Missing => "missing",
      ProblemKind::AlreadyProtected => "already-protected",
      ProblemKind::NotCallable => "not-callable",
      ProblemKind::ProtectionFailed => "protection-failed",
    }
  }

  /// Whether the problem needs no action: the member is already locked down.
  pub fn is_benign(self) -> bool {
    matches!(self, ProblemKind::AlreadyProtected)
  }
}

impl fmt::Display for ProblemKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A member that could not be protected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Problem {
  /// The member name, qualified for standard-library members (`Date.prototype.getTime`).
  pub key: String,
  #[serde(rename = "reason")]
  pub kind: ProblemKind,
  /// Host error text, when the host rejected the change.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub detail: Option<String>,
}

impl Problem {
  pub fn new(key: impl Into<String>, kind: ProblemKind) -> Self {
    Self {
      key: key.into(),
      kind,
      detail: None,
    }
  }

  pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
    self.detail = Some(detail.into());
    self
  }

  /// Human-readable description of the problem.
  pub fn message(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for Problem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let key = &self.key;
    match self.kind {
      ProblemKind::Missing => write!(f, "{key} does not exist")?,
      ProblemKind::AlreadyProtected => {
        write!(f, "{key} is already non-writable or non-configurable")?
      }
      ProblemKind::NotCallable => write!(f, "{key} is not a function")?,
      ProblemKind::ProtectionFailed => write!(f, "{key} could not be protected")?,
    }
    if let Some(detail) = &self.detail {
      write!(f, ": {detail}")?;
    }
    Ok(())
  }
}
