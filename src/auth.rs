//! Credential models, the authentication collaborator contract, and the credential manager.

pub mod credential;
pub mod manager;
pub mod secret;
pub mod source;

pub use credential::*;
pub use manager::*;
pub use secret::*;
pub use source::*;
