pub mod baseline;
pub mod companies;
pub mod config;
pub mod context;
pub mod diagnose;
pub mod register;
pub mod settings;
pub mod stats;
pub mod steps;
pub mod sync;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
