//! Subcommand implementations. Each returns the text to print.

pub mod inspect;
pub mod run;
