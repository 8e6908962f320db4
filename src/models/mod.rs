pub mod analysis;
pub mod call;
pub mod transcript;

pub use analysis::*;
pub use call::*;
pub use transcript::*;
