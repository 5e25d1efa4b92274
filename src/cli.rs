//! Shared exit-code and error-reporting convention for every `src/bin`
//! entry point: run the tool's body, print any error to stderr, and map
//! it onto the process exit status the shell expects.

use std::error::Error as StdError;
use std::process::ExitCode;

/// A bin's fallible body. Boxed rather than [`crate::Error`] directly so
/// tools that also touch non-library errors (PNG decoding, plain I/O)
/// can still funnel everything through one `?`.
pub type BinResult = Result<(), Box<dyn StdError>>;

/// Runs `body`, printing its error (if any) to stderr and translating it
/// into an exit code. Out-of-memory errors get the same blunt message
/// the source tools print; anything else gets its own `Display`.
pub fn run(body: impl FnOnce() -> BinResult) -> ExitCode {
    env_logger::init();
    match body() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let is_oom = err
                .downcast_ref::<crate::Error>()
                .map(crate::Error::is_out_of_memory)
                .unwrap_or(false);
            if is_oom {
                eprintln!("out of memory");
            } else {
                eprintln!("error: {}", err);
            }
            ExitCode::FAILURE
        }
    }
}
