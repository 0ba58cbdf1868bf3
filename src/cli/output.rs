//! Output helpers shared by the CLI commands.
//!
//! Global flags are carried as environment variables set in `main` so any
//! module can check them without threading a context through every call.

use serde::Serialize;

pub fn is_json() -> bool {
    std::env::var("PRICELENS_JSON").is_ok()
}

pub fn is_quiet() -> bool {
    std::env::var("PRICELENS_QUIET").is_ok()
}

/// Print a value as pretty JSON to stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("  Error: failed to serialize output: {e}"),
    }
}

/// Print a line unless `--quiet` is set.
pub fn say(line: &str) {
    if !is_quiet() {
        println!("{line}");
    }
}
