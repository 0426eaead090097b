pub mod cache;
pub mod compatibility;
pub mod fallback;
pub mod replacement;
pub mod signal;
pub mod votes;

#[cfg(test)]
pub mod testing;

pub use compatibility::*;
pub use fallback::*;
pub use replacement::*;
pub use signal::*;
pub use votes::*;
