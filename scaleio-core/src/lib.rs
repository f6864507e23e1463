//! ScaleIO Core Library
//!
//! Wire types and error shapes shared by the ScaleIO / PowerFlex REST client
//! and every resource wrapper built on top of it.

pub mod error;
pub mod links;
pub mod types;

// Re-export commonly used types
pub use error::*;
pub use links::find_link;
pub use types::*;
