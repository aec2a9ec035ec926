//! The inevitable catchall "utils" crate. Generally only add
//! things here that only depend on the standard library and
//! "core" crates.
//!
mod path;
pub use path::*;
mod timestamp;
pub use timestamp::*;
mod tracing_util;
pub use tracing_util::*;
