pub mod groups;
pub mod quota;
pub mod usage;

pub use groups::*;
pub use quota::*;
pub use usage::*;
