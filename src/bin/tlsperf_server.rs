//! TLS sample server
//!
//! Accepts connections on `-addr`/`-port`, completes the handshake and answers
//! each request with the next canned response.

use std::process::ExitCode;
use tlsperf::cli::{self, ServerArgs};
use tlsperf::harness;

fn main() -> ExitCode {
    let args = match cli::parse::<ServerArgs, _, _>(std::env::args()) {
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

    match harness::run_server(&settings) {
        Ok(result) => {
            tracing::info!(connections = result.count, "server done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(stage = e.stage(), "{}", e);
            ExitCode::FAILURE
        }
    }
}
