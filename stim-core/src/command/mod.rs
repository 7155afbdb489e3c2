//! Operator command surface: the request grammar and its dispatcher.

pub mod commands;
pub mod grammar;

pub use commands::{CommandError, CommandExecutor, Reply, SampleReading, StatusReport};
pub use grammar::{Command, CommandTag, ParseError, parse};
