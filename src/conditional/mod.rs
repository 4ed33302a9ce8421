//! Conditional execution layer
//!
//! Gates every network operation behind a list of named preconditions and
//! reports both "did not try" and "tried and failed" as a failed
//! [`HttpResult`], told apart only by the error id.
//!
//! # Module Structure
//!
//! - [`preconditions`] - Precondition identifiers, checks and their registry
//! - [`client`] - [`ConditionalClient`] and the [`Query`] forms it accepts
//! - [`result`] - [`HttpResult`], the success-or-error envelope

pub mod client;
pub mod preconditions;
pub mod result;

pub use client::{ConditionalClient, Query, PRECONDITION_CHECK_FAILED, TOKEN_UNAVAILABLE};
pub use preconditions::{Precondition, PreconditionId, PreconditionRegistry, PreconditionResult};
pub use result::{HttpError, HttpResult};
