use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Console subscriber filtered by LOG_LEVEL; LOG_FILE adds a file writer.
/// Called once at startup; repeated init (tests) is ignored.
pub fn init(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path);
            match file {
                Ok(file) => {
                    let _ = tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(std::sync::Arc::new(file))
                        .with_ansi(false)
                        .with_target(false)
                        .try_init();
                }
                Err(err) => {
                    eprintln!("cannot open LOG_FILE {}: {}", path.display(), err);
                    let _ = tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_target(false)
                        .try_init();
                }
            }
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .try_init();
        }
    }
}
