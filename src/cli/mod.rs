//! CLI command handling

pub mod args;
pub mod output;
pub mod start;
pub mod status;

pub use args::*;
pub use output::*;
pub use start::*;
pub use status::*;
