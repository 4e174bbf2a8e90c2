pub mod config;
pub mod fd_limit;
pub mod logger;

pub use config::*;
pub use fd_limit::read_worker_cap;
pub use logger::{level_for_verbosity, setup_logging};
