pub mod error;
pub mod program;
pub mod machine;
pub mod search;
pub mod input;

pub use error::{Error, Result};
pub use machine::{Machine, Output, Registers, evaluate, run};
pub use program::Program;
pub use search::{SearchConfig, Strategy, find_self_reproducing_a};
