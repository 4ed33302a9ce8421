//! Management-plane identity
//!
//! Everything that identifies and authenticates against one function app.
//!
//! # Module Structure
//!
//! - [`auth`] - Access tokens with expiry caching
//! - [`site`] - Site description, URL templates and the per-operation target context

pub mod auth;
pub mod site;

pub use auth::Credentials;
pub use site::{Site, SiteContext, UrlTemplates};
