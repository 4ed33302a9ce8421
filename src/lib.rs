//! Console core for serverless function apps.
//!
//! Every network operation against a function app is gated behind a set of
//! preconditions (site stopped, over quota, unreachable, easy auth, client
//! certificates, runtime down) and reported through one result type.
//!
//! - [`arm`] - sites, URL templates and access tokens
//! - [`cache`] - the resource cache every call goes through
//! - [`conditional`] - preconditions and the conditional client
//! - [`functions`] - the function app service built on top
//! - [`config`] - persisted user configuration

pub mod arm;
pub mod cache;
pub mod conditional;
pub mod config;
pub mod functions;

/// Version injected at compile time via TFUNC_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("TFUNC_VERSION") {
    Some(v) => v,
    None => "dev",
};
