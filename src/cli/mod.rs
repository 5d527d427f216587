//! CLI module for the rembg-lite library
//!
//! This module is only available when the "cli" feature is enabled.

#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, run_image_command, Cli, Command, ImageArgs};
