//! Grantor - OAuth2 provider core
//!
//! Lifecycle of registered clients, authorization requests, authorization
//! codes and access tokens: issuance, lookup, scope narrowing, expiry and
//! revocation, with the client counters kept in step transactionally.

pub mod auth_requests;
pub mod clients;
pub mod context;
pub mod entities;
pub mod errors;
pub mod grants;
pub mod identity;
pub mod random;
pub mod scope;
pub mod settings;
pub mod storage;
pub mod tokens;

pub use context::OAuthContext;
pub use errors::GrantorError;
pub use identity::Identity;
pub use scope::ScopeSet;
