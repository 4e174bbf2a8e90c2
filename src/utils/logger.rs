use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Verbosity ladder driven by the `-v`/`-V` counters. Index 0 is quietest.
const VERBOSITY_LADDER: [LevelFilter; 5] = [
    LevelFilter::Error,
    LevelFilter::Warn,
    LevelFilter::Warn,
    LevelFilter::Info,
    LevelFilter::Debug,
];

/// Map a verbosity counter (default 2, bumped by -v, lowered by -V) onto
/// a log level filter.
pub fn level_for_verbosity(counter: i32) -> LevelFilter {
    let idx = counter.clamp(0, VERBOSITY_LADDER.len() as i32 - 1) as usize;
    VERBOSITY_LADDER[idx]
}

pub fn setup_logging(verbosity: i32, color: bool) {
    let level = level_for_verbosity(verbosity);

    colored::control::set_override(color);

    Builder::from_default_env()
        .filter_level(LevelFilter::Warn) // Default: only warnings from dependencies
        .filter_module(env!("CARGO_PKG_NAME"), level) // Our crate: use requested level
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME");
            let line = match record.level() {
                Level::Error | Level::Warn => {
                    let level_str = match record.level() {
                        Level::Warn => "WARN".yellow(),
                        Level::Error => "ERROR".red(),
                        _ => unreachable!(),
                    };
                    format!("[{} {}] {}", name.cyan(), level_str, record.args())
                }
                _ => format!("[{}] {}", name.cyan(), record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .init();
}
