// =============================================================================
// Accounts — registered users, password hashing and login sessions
// =============================================================================

pub mod password;
pub mod sessions;
pub mod users;

pub use password::PasswordHasher;
pub use sessions::SessionStore;
pub use users::{AccountError, UserStore};
