//! Credential record types, redacted secrets, and partial-update patches.

pub mod record;
pub mod secret;

pub use record::*;
pub use secret::*;
