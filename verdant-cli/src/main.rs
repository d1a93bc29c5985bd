//! Entry point for the Verdant command-line interface.
#![forbid(unsafe_code)]

use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(error) = verdant_cli::run().await {
        eprintln!("verdant: {error}");
        process::exit(1);
    }
}
