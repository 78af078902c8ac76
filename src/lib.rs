pub mod cli;

/// Logs to stderr so stdout stays free for program output. `RUST_LOG`
/// overrides the defaults.
pub fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_pipe", log::LevelFilter::Debug)
        .parse_default_env()
        .init();
}
