pub mod client;
pub mod error;
pub mod payload;

pub use client::*;
pub use error::*;
pub use payload::*;
