use log::LevelFilter;
use simplelog::{self, ConfigBuilder};

/// Modules to filter out from logging when not in Trace mode.
/// These are typically verbose dependencies that clutter normal log output.
const FILTERED_MODULES: &[&str] = &["hyper", "reqwest", "tower", "axum", "h2", "rustls"];

pub struct Logger {}

impl Logger {
    /// Initializes the global logger at the given level.
    ///
    /// When the log level is set to Trace, all logs including dependency
    /// logs are shown. For all other log levels, verbose dependency logs
    /// are filtered out.
    pub fn init(level: LevelFilter) {
        let log_config = Self::build_log_config(Self::should_filter_dependencies(level));
        simplelog::TermLogger::init(
            level,
            log_config,
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        )
        .expect("Failed to start simplelog");
    }

    /// Returns `false` for Trace level (show all logs), `true` otherwise.
    fn should_filter_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();
        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }
        builder.build()
    }
}
