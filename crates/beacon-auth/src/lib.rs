//! Handshake authentication and channel access control.
//!
//! The [`oracle::PermissionOracle`] turns a bearer credential into an
//! [`beacon_core::types::Identity`] exactly once per connection; the
//! [`acl::ChannelAcl`] then decides, per subscribe, whether that identity's
//! capabilities cover the channel.

pub mod acl;
pub mod error;
pub mod oracle;
pub mod signed;

pub use acl::{AclDecision, ChannelAcl};
pub use error::{AuthError, Result};
pub use oracle::{PermissionOracle, StaticTokenOracle};
pub use signed::{SignedTokenOracle, TokenClaims};
