// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! `minvm` CLI: load, validate, deserialize, and execute one `MNML`
//! bytecode artifact.
//!
//! ```text
//! minvm <path>
//! minvm *stdin
//! ```

use clap::Parser;

/// Run a precompiled `MNML` bytecode artifact.
#[derive(Debug, Parser)]
#[command(name = "minvm", version, about)]
struct Args {
    /// Path to the artifact, or `*stdin` (case-insensitive) to read it from
    /// standard input.
    path: String,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    match minvm::run_artifact(&args.path) {
        Ok(_) => std::process::exit(0),
        Err(err) => {
            // `run_artifact` already printed the VM's own two-line runtime
            // diagnostic on a dispatch failure; loader/deserializer failures
            // have no such format, so report them plainly here. Either way
            // this line is unconditional, not gated behind `RUST_LOG`.
            eprintln!("minvm: {err}");
            std::process::exit(1);
        }
    }
}
