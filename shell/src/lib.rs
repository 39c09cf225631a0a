//! An interactive Unix shell with a hand-rolled line editor.
//!
//! A line typed at the prompt goes through three stages:
//! - [`input`] reads it byte by byte from a terminal in non-canonical mode,
//!   with backspace, one-entry history on Up-arrow and Tab completion.
//! - [`parser`] turns it into a [`Pipeline`] of stages with redirections.
//! - [`Interpreter`] runs the pipeline: built-ins in-process, everything else
//!   as child processes wired together with pipes.
//!
//! Built-ins besides `cd` and `exit` are `shortdir` (persistent directory
//! shortcuts), `highlight`, `goodMorning` (cron alarm), `kdiff` and
//! `concatenate`. See [`command`] for the traits to plug in more commands.

mod alias;
mod builtin;
pub mod command;
pub mod complete;
pub mod config;
mod diff;
pub mod env;
pub mod error;
mod external;
pub mod input;
mod interpreter;
mod lexer;
pub mod parser;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use interpreter::Interpreter;
pub use parser::{Pipeline, parse};
