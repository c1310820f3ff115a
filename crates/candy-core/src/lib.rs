//! Platform-free core of the candy world weather and music visuals.
//!
//! Nothing in this crate touches the browser; the web front end wraps these
//! types and the native harness drives them headlessly.

pub mod constants;
pub mod particles;
pub mod protocol;
pub mod tracker;
pub mod weather;

pub use particles::*;
pub use protocol::*;
pub use weather::*;
