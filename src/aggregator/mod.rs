pub mod quota;
pub mod stats;
