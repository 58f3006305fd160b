//! Credential and session-token handling

/// Token cache with time-based expiry
pub mod cache;
/// Injectable time source
pub mod clock;
/// Login collaborator and its HTTP implementation
pub mod login;

pub use cache::{CredentialSupplier, SessionCache, SessionCacheEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use login::{HttpLoginClient, LoginCollaborator};
