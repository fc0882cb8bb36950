pub mod error;
pub mod memory;
pub mod traits;
pub mod ttl;

pub use error::StoreError;
pub use memory::{MemoryCallLedger, MemorySessionStore};
pub use traits::{CallLedger, SessionStateStore, TransitionOutcome};
