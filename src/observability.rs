//! This module provides observability and diagnostics for the engine.
//!
//! The core only ever talks to the `log` facade. Installing a logger is the
//! caller's business; `enable_verbose_logging` is a convenience for tools that
//! want the engine's stage decisions on stderr or in a file.

use log::LevelFilter;
use std::fs::OpenOptions;
use std::sync::Once;

/// Logs a structured key-value metric string through `log::debug!`, only in debug builds.
///
/// # Example
/// ```
/// use phi_engine::log_metric;
/// let ratio = 4.2;
/// log_metric!("event"="compress", "mode"="Symbolic", "ratio"=&ratio);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        #[cfg(debug_assertions)]
        {
            // Collect each pair as a JSON string fragment
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+

            log::debug!("PHI_METRIC: {{ {} }}", parts.join(", "));
        }
    };
}

static INIT_LOGGER: Once = Once::new();

/// Installs an `env_logger` at `Info` level, once per process.
///
/// When `log_file` is given, records are appended to that file instead of
/// stderr. Later calls are no-ops.
pub fn enable_verbose_logging(log_file: Option<&str>) -> Result<(), crate::error::PhiError> {
    // Open the file up front so failures surface to the caller instead of
    // inside the `Once` closure.
    let file = match log_file {
        Some(path) => Some(OpenOptions::new().append(true).create(true).open(path)?),
        None => None,
    };

    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(LevelFilter::Info);

        // Custom formatter: just print the level and message
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())
        });

        if let Some(file) = file {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let _ = builder.try_init();
    });
    Ok(())
}
