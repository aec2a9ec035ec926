//! The main entrypoint for bls-ucode, which mostly just calls out into the
//! library crate.

use anyhow::Result;
use owo_colors::OwoColorize;

fn run() -> Result<()> {
    bls_ucode_utils::initialize_tracing();
    tracing::trace!("starting {}", env!("CARGO_PKG_NAME"));
    bls_ucode_lib::cli::run_from_iter(std::env::args())
}

fn main() {
    // In order to print the error in a custom format (with :#) our
    // main simply invokes a run() where all the work is done.
    // This code just captures any errors.
    if let Err(e) = run() {
        anstream::eprintln!("{}{:#}", "error: ".red().bold(), e);
        std::process::exit(1);
    }
}
