//! Session domain: opaque credentials, the persisted session record, and expiry checks.

pub mod expiry;
pub mod secret;
pub mod session;

pub use expiry::*;
pub use secret::*;
pub use session::*;
