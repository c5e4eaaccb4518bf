//! `cmdwire` binary: serves the built-in commands, or sends them to a peer
//! when `--connect` is given.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    cmdwire::run(std::env::args_os(), &mut io::stderr())
}
