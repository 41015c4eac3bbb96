pub mod assembler;
pub mod config;
pub mod exec;
pub mod infolog;
pub mod io;
pub mod locator;
pub mod paths;
pub mod portability;
pub mod probe;
pub mod version;

pub use assembler::{Assembler, Resolution, ResolveError, ResolverContext};
pub use config::{FileConfig, Flags, Options};
pub use infolog::InfoLog;
pub use paths::*;

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("accelspec-core/", env!("CARGO_PKG_VERSION"));
