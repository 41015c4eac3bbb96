//! Shared types for accelspec.
//!
//! Everything here is plain data: the host [`Target`] the resolver runs for,
//! the [`ModuleBuildSpec`] records handed to the external builder, and the
//! [`RemoteResource`] catalogue entries served by the resource cache.

pub mod arch;
pub mod resource;
pub mod spec;

// Re-exports
pub use arch::*;
pub use resource::*;
pub use spec::*;
