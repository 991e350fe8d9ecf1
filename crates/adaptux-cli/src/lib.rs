//! Command line driver for the adaptux decision pipeline
//!
//! The binary wraps three commands: `check` validates a config file, `eval`
//! runs one set of signals through a fresh engine and `replay` streams a
//! recorded sequence of emissions through one.

pub mod cli;
pub mod commands;
