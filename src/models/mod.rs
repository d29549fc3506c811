pub mod cluster;
pub mod deployment;
pub mod phase;

pub use cluster::*;
pub use deployment::*;
pub use phase::*;
