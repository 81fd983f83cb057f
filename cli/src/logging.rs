//! `tracing` subscriber setup for the `marketindex` binary.

use std::collections::HashMap;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logging options collected from the command line.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level for every target (`info`, `debug`, ...).
    pub level: String,
    /// Per-target overrides, e.g. `sqlx` → `warn`.
    pub components: HashMap<String, String>,
    /// Emit newline-delimited JSON instead of human-readable lines.
    pub json: bool,
}

impl LogConfig {
    pub fn new(level: impl Into<String>, json: bool) -> Self {
        let mut components = HashMap::new();
        // sqlx logs every statement at info.
        components.insert("sqlx".to_string(), "warn".to_string());
        Self {
            level: level.into(),
            components,
            json,
        }
    }

    /// Filter directives: `RUST_LOG` wins when set, otherwise the level plus
    /// the per-component overrides.
    fn directives(&self) -> String {
        if let Ok(env) = std::env::var("RUST_LOG") {
            if !env.trim().is_empty() {
                return env;
            }
        }
        let mut directives = vec![self.level.clone()];
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (target, level) in components {
            directives.push(format!("{target}={level}"));
        }
        directives.join(",")
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(config.directives()).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
