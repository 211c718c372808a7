//! `idstore-core` — shared building blocks for the identity stores.
//!
//! This crate contains no storage or framework concerns: identifiers, the
//! store error model and the cancellation guard used at every store entry.

pub mod cancel;
pub mod error;
pub mod id;

pub use cancel::ensure_not_cancelled;
pub use error::{StoreError, StoreResult};
pub use id::{RoleId, UserId};
