/// Logging initialization.
///
/// Called once at the start of `MurmurApp::new()`, before anything else.
/// `RUST_LOG` overrides the default filter. With `log_to_file` set, events are
/// also appended to `<data_dir>/murmur.log` so a session can be inspected after
/// the fact.
pub fn init_logging(data_dir: &str, log_to_file: bool) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "murmur_core=debug,info".into());

    let file_layer = if log_to_file {
        let log_path = std::path::Path::new(data_dir).join("murmur.log");
        let _ = std::fs::create_dir_all(data_dir);
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .ok()
            .map(|file| {
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
            })
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}
