pub mod overview;
pub mod quota;
pub mod today;

pub use overview::*;
pub use quota::*;
pub use today::*;
