//! Error policy applied during tree walks.
//!
//! Lenient lookups on read handles and sample writes on the write session
//! route their failures through an [`ErrorHandler`]. The handler either
//! returns the error annotated with the node path, or logs it and hands back
//! a default. Handles pass their handler on to the children they create.

use crate::util::Result;

/// What to do when a policy-governed call fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ErrorPolicy {
    /// Return the error.
    #[default]
    Throw,
    /// Log a warning and return the default.
    NoisyDefault,
    /// Return the default silently.
    QuietDefault,
}

impl ErrorPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "throw" => Some(Self::Throw),
            "noisy" => Some(Self::NoisyDefault),
            "quiet" => Some(Self::QuietDefault),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorHandler {
    policy: ErrorPolicy,
}

impl ErrorHandler {
    pub const fn new(policy: ErrorPolicy) -> Self {
        Self { policy }
    }

    #[inline]
    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Apply the policy to `result` produced at node `path`.
    ///
    /// `Ok(v)` passes through as `Ok(Some(v))`. An error becomes `Err`
    /// (annotated with `path`) under [`ErrorPolicy::Throw`] and `Ok(None)`
    /// otherwise.
    pub fn handle<T>(&self, path: &str, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(err) => match self.policy {
                ErrorPolicy::Throw => Err(err.at(path)),
                ErrorPolicy::NoisyDefault => {
                    tracing::warn!(path, kind = ?err.kind(), "{}", err);
                    Ok(None)
                }
                ErrorPolicy::QuietDefault => Ok(None),
            },
        }
    }

    /// [`handle`](Self::handle) for calls without a value.
    pub fn handle_unit(&self, path: &str, result: Result<()>) -> Result<()> {
        self.handle(path, result).map(|_| ())
    }
}

impl From<ErrorPolicy> for ErrorHandler {
    fn from(policy: ErrorPolicy) -> Self {
        Self::new(policy)
    }
}
