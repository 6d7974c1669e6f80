//! CueCannon Core Library
//!
//! Domain models, role assignment, show session state and local script
//! storage for CueCannon.

pub mod casting;
pub mod error;
pub mod models;
pub mod session;
pub mod storage;

pub use casting::{cast, ActorsByPart, Casting};
pub use error::{Error, Result};
pub use models::*;
pub use session::{CueAdvance, CueView, Role, ShowSession, Stage};
pub use storage::{Database, ScriptSource, ScriptStore, StoredScript};
