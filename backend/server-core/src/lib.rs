//! Core of the max-requests server.
//!
//! A process serves HTTP until it has handled a configured number of
//! requests, then stops accepting, drains, and launches a successor that
//! inherits the very same listening sockets through the environment. The
//! kernel keeps queueing connections while neither process accepts, so none
//! are refused across the switch.

pub mod access_log;
pub mod application;
pub mod config;
pub mod error;
pub mod gate;
pub mod handoff;
pub mod listener;
pub mod server;
pub mod succession;

#[cfg(test)]
mod tests;
