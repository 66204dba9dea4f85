mod command;
mod runner;

pub use command::Command;
pub use runner::{OutputMode, load_model, run, run_with_format};
