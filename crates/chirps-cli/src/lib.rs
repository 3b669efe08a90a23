//! Shared helpers for the chirps binaries

pub mod output;

/// Initialize logging: `Info` with `--verbose`, otherwise warnings only
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}
