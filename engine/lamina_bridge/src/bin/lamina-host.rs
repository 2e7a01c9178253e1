//! Lamina host runtime.
//!
//! Speaks the bridge protocol on stdin/stdout; logs go to stderr.

use std::io::{self, BufWriter};
use std::process::ExitCode;

use lamina_bridge::{host, init_tracing, BridgeConfig};

fn main() -> ExitCode {
    init_tracing();
    let config = BridgeConfig::from_env();
    let stdin = io::stdin().lock();
    let stdout = BufWriter::new(io::stdout().lock());
    match host::serve(stdin, stdout, config.max_call_depth) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("lamina-host: {err}");
            ExitCode::FAILURE
        }
    }
}
