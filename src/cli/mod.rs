//! CLI subcommand implementations for the pricelens binary.

pub mod analyze_cmd;
pub mod doctor;
pub mod init_cmd;
pub mod output;
pub mod probe_cmd;
pub mod run_cmd;
pub mod watch_cmd;
