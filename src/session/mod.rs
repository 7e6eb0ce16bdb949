//! Session Module
//!
//! Session identity (ID + OS family) and the registry of connected sessions.

mod registry;
pub mod types;

pub use registry::SessionRegistry;
pub use types::{OsFamily, Session, SessionId};
