//! TLS handshake benchmark client
//!
//! Opens a new TCP + TLS connection per cycle, sends one request, reads one
//! response and tears everything down, for `-time` seconds.

use std::process::ExitCode;
use tlsperf::cli::{self, ClientArgs};
use tlsperf::harness;

fn main() -> ExitCode {
    let args = match cli::parse::<ClientArgs, _, _>(std::env::args()) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(2) } else { ExitCode::SUCCESS };
        }
    };

    cli::init_logging();

    let settings = match args.into_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    println!("Performing TLS connections...");
    match harness::run_client(&settings) {
        Ok(result) => {
            println!("{}", result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(stage = e.stage(), "{}", e);
            ExitCode::FAILURE
        }
    }
}
