//! Security manager
//!
//! This module pairs devices over BR/EDR Secure Simple Pairing and LE SMP:
//! - Choosing the association model and relaying prompts to the application
//! - Collecting and persisting link keys and LE key sets
//! - Tracking per-peer link security and service authorization

pub mod constants;
pub mod types;
mod callbacks;
mod classic;
mod events;
mod keys;
mod le;
mod manager;
mod record;
mod session;
mod transport;

// Re-export public API
pub use self::callbacks::*;
pub use self::classic::{select_association_model, ClassicState};
pub use self::events::*;
pub use self::keys::*;
pub use self::le::LeState;
pub use self::manager::{AccessDenial, AccessStatus, SecurityManager};
pub use self::record::BondRecord;
pub use self::session::SessionState;
pub use self::transport::*;
pub use self::types::*;
