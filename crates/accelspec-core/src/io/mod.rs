//! IO modules - side effects (network, filesystem)

pub mod cache;
pub mod download;
pub mod extract;
