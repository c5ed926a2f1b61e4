pub mod certificates;
pub mod fixtures;

pub use fixtures::*;
