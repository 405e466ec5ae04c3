use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info",
/// "crystal_ring=debug,wgpu=warn"). The browser build only honours the most
/// verbose level named in it.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    #[cfg(not(target_arch = "wasm32"))]
    pub write_style: env_logger::WriteStyle,
}

impl LoggingConfig {
    pub fn with_filter(filter: Option<String>) -> Self {
        Self {
            env_filter: filter,
            ..Self::default()
        }
    }
}

static INIT: Once = Once::new();

/// Installs the global logger. Later calls are ignored.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = config.env_filter {
            builder.parse_filters(&filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(log::LevelFilter::Info);
            // wgpu is chatty at info.
            builder.filter_module("wgpu_core", log::LevelFilter::Warn);
            builder.filter_module("wgpu_hal", log::LevelFilter::Warn);
        }

        builder.write_style(config.write_style);
        if install(builder) {
            log::debug!("logging initialized");
        }
    });
}

/// Installs `builder` as the global logger. Returns false when another
/// logger was set first, which is then kept.
#[cfg(not(target_arch = "wasm32"))]
fn install(mut builder: env_logger::Builder) -> bool {
    match builder.try_init() {
        Ok(()) => true,
        Err(err) => {
            log::debug!("keeping the logger installed earlier: {err}");
            false
        }
    }
}

/// Installs the console logger and the panic hook. Later calls are ignored.
#[cfg(target_arch = "wasm32")]
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        console_error_panic_hook::set_once();
        let level = config
            .env_filter
            .as_deref()
            .map(max_level)
            .unwrap_or(log::Level::Info);
        wasm_logger::init(wasm_logger::Config::new(level));
        log::debug!("logging initialized");
    });
}

/// Most verbose level mentioned in an `env_logger` style filter.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn max_level(filter: &str) -> log::Level {
    filter
        .split(',')
        .filter_map(|directive| {
            let level = directive.rsplit('=').next()?.trim();
            level.parse::<log::Level>().ok()
        })
        .max()
        .unwrap_or(log::Level::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_level_picks_most_verbose_directive() {
        assert_eq!(max_level("warn"), log::Level::Warn);
        assert_eq!(max_level("wgpu=warn,crystal_ring=debug"), log::Level::Debug);
        assert_eq!(max_level("nonsense"), log::Level::Info);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn init_is_idempotent() {
        init_logging(LoggingConfig::with_filter(Some("debug".into())));
        init_logging(LoggingConfig::default());
        assert!(INIT.is_completed());
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn existing_logger_is_kept() {
        init_logging(LoggingConfig::default());
        assert!(!install(env_logger::Builder::new()));
    }
}
