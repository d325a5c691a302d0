mod cli;
mod session;

use clap::Parser;

use crate::cli::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = session::run_session(cli) {
        eprintln!("codepad: {:#}", e);
        std::process::exit(1);
    }
}
