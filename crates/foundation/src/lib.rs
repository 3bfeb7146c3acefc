pub mod bounds;
pub mod error;
pub mod math;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use error::{EngineError, Result};
