//! `RIX_ROOT`/`RIX_VERBOSE` environment configuration (C8/C9).
//!
//! Read once at startup into this small typed struct; nothing downstream
//! re-reads the environment, so the abort window, root prefix, and tracing
//! level are fixed for the process lifetime once the [`Emulator`](crate::emulator::Emulator)
//! aggregate is built.

/// Parsed `RIX_ROOT`/`RIX_VERBOSE` configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory prefix shared-library paths are resolved against.
    ///
    /// Unset is tolerated (mirrors the original tool): an empty prefix makes
    /// library paths resolve against the process's working directory rather
    /// than failing the load, per `rixrun-loader`'s `get_hdr`.
    pub root: String,
    /// Tracing verbosity: 0 (warnings/fatal only), 1 (+ loader decisions and
    /// first-occurrence notices), 2 (+ per-SWI tracing and the startup
    /// register dump). Unset or unparseable defaults to 0.
    pub verbose: u8,
}

impl Config {
    /// Reads `RIX_ROOT` and `RIX_VERBOSE` from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let root = std::env::var("RIX_ROOT").unwrap_or_default();
        if root.is_empty() {
            log::warn!("RIX_ROOT is not set; shared-library paths will resolve against the current directory");
        }
        let verbose = std::env::var("RIX_VERBOSE")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(0);
        Config { root, verbose }
    }

    /// The `log::LevelFilter` this verbosity maps to, per §4.7.
    #[must_use]
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_the_documented_tiers() {
        assert_eq!(Config { root: String::new(), verbose: 0 }.log_level(), log::LevelFilter::Warn);
        assert_eq!(Config { root: String::new(), verbose: 1 }.log_level(), log::LevelFilter::Info);
        assert_eq!(Config { root: String::new(), verbose: 2 }.log_level(), log::LevelFilter::Trace);
        assert_eq!(Config { root: String::new(), verbose: 9 }.log_level(), log::LevelFilter::Trace);
    }
}
