//! Parley is a full-screen terminal chat client for OpenAI-compatible
//! completion APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation state machine, configuration, the
//!   completion gateway, and the relay that carries reply snapshots from a
//!   background producer to the UI.
//! - [`ui`] renders the terminal interface and runs the interactive event loop
//!   that drives user input and display updates.
//! - [`api`] defines the chat completion payloads sent to and read from the
//!   server.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which resolves settings and hands off to
//! [`ui::chat_loop`].

pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod ui;

#[cfg(test)]
mod test_utils;
