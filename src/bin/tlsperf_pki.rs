//! Writes a throwaway demo PKI for the client and server samples

use std::process::ExitCode;
use tlsperf::cli::{self, PkiArgs};
use tlsperf::tls::DemoPki;

fn main() -> ExitCode {
    let args = match cli::parse::<PkiArgs, _, _>(std::env::args()) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(2) } else { ExitCode::SUCCESS };
        }
    };

    cli::init_logging();

    match DemoPki::generate().and_then(|pki| pki.write_to(&args.dir)) {
        Ok(paths) => {
            println!("root CA:     {}", paths.root_cert.display());
            println!("server cert: {}", paths.server_cert.display());
            println!("server key:  {}", paths.server_key.display());
            println!("client cert: {}", paths.client_cert.display());
            println!("client key:  {}", paths.client_key.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("writing demo PKI to {} failed: {}", args.dir.display(), e);
            ExitCode::FAILURE
        }
    }
}
