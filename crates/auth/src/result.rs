//! Typed outcome of a mutating store or manager operation.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// A single recoverable failure, identified by a stable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityError {
    pub code: Cow<'static, str>,
    pub description: String,
}

impl IdentityError {
    pub fn new(code: impl Into<Cow<'static, str>>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }

    pub fn default_error(description: impl Into<String>) -> Self {
        Self::new("DefaultError", description)
    }

    /// The stored row changed since it was read (stale concurrency stamp).
    pub fn concurrency_failure() -> Self {
        Self::new(
            "ConcurrencyFailure",
            "Optimistic concurrency failure, object has been modified.",
        )
    }

    pub fn role_not_found(role_name: &str) -> Self {
        Self::new("RoleNotFound", format!("Role '{role_name}' does not exist."))
    }

    pub fn user_not_in_role(role_name: &str) -> Self {
        Self::new("UserNotInRole", format!("User is not in role '{role_name}'."))
    }

    pub fn user_already_in_role(role_name: &str) -> Self {
        Self::new(
            "UserAlreadyInRole",
            format!("User already in role '{role_name}'."),
        )
    }

    pub fn duplicate_user_name(user_name: &str) -> Self {
        Self::new(
            "DuplicateUserName",
            format!("Username '{user_name}' is already taken."),
        )
    }

    pub fn duplicate_role_name(role_name: &str) -> Self {
        Self::new(
            "DuplicateRoleName",
            format!("Role name '{role_name}' is already taken."),
        )
    }

    pub fn invalid_role_name(role_name: &str) -> Self {
        Self::new("InvalidRoleName", format!("Role name '{role_name}' is invalid."))
    }
}

impl core::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

/// Success, or the list of reasons an operation did not take effect.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityResult {
    Success,
    Failed(Vec<IdentityError>),
}

impl IdentityResult {
    pub fn failed(error: IdentityError) -> Self {
        Self::Failed(vec![error])
    }

    /// `Success` when at least one row was written, else a failure built by `on_zero`.
    pub fn from_rows_affected(rows: u64, on_zero: impl FnOnce() -> IdentityError) -> Self {
        if rows > 0 {
            Self::Success
        } else {
            Self::failed(on_zero())
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn errors(&self) -> &[IdentityError] {
        match self {
            Self::Success => &[],
            Self::Failed(errors) => errors,
        }
    }

    pub fn has_error(&self, code: &str) -> bool {
        self.errors().iter().any(|e| e.code == code)
    }
}

impl core::fmt::Display for IdentityResult {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Success => f.write_str("Succeeded"),
            Self::Failed(errors) => {
                f.write_str("Failed : ")?;
                for (idx, e) in errors.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(&e.code)?;
                }
                Ok(())
            }
        }
    }
}
