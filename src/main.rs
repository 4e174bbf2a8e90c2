//! scour CLI: parse arguments, run a scan, exit nonzero on fatal
//! errors.

use clap::Parser;
use scour::cli::{Cli, build_cfg};
use scour::utils::setup_logging;
use std::time::Instant;

fn main() {
    let start_time = Instant::now();
    let cli = Cli::parse();

    let verbosity = 2 + cli.loud as i32 - cli.quiet as i32;
    setup_logging(verbosity, !cli.no_with_color);

    let cmdline = std::env::args().collect::<Vec<_>>().join(" ");
    let cfg = match build_cfg(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            log::error!("{:#}", err);
            std::process::exit(2);
        }
    };

    if let Err(err) = scour::run(cfg, &cmdline) {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
    log::debug!("total time: {:?}", start_time.elapsed());
}
