//! Domain layer
//!
//! Pure domain identifiers shared by the auth core, storage and HTTP layers.

pub mod id;

pub use id::{OrganizationId, PrincipalId, ResetTokenId};
