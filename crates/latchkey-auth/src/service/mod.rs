//! Identity service implementations

pub mod identity;

pub use identity::IdentityService;
