//! rembg CLI
//!
//! `rembg i [-m MODEL] INPUT OUTPUT` removes the background from one image.

use rembg_lite::cli;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    cli::main().await
}
