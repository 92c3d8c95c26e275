//! Runtime verification configuration.
//!
//! The verification mode is set via the `LEAKCHECK_MODE` environment variable:
//! - `enforce` (default): policies apply as registered. Leaks under `FailIfLeaked` and absent
//!   leaks under `ExpectLeak` fail the test.
//! - `lenient`: every fatal issue is downgraded to a warning. Useful while burning down a
//!   backlog of known leaks without turning the suite red.
//! - `off`: the pass still drains the registry but reports nothing.
//!
//! `LEAKCHECK_LOG=<path>` additionally appends structured JSONL records for every pass.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable selecting the [`VerifyMode`].
pub const MODE_ENV: &str = "LEAKCHECK_MODE";

/// Environment variable naming the JSONL log file.
pub const LOG_ENV: &str = "LEAKCHECK_LOG";

/// How verification results are enforced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyMode {
    /// Policies apply as registered.
    #[default]
    Enforce,
    /// Fatal issues are reported as warnings.
    Lenient,
    /// Nothing is evaluated.
    Off,
}

impl VerifyMode {
    /// Parse from string (case-insensitive). Unknown values fall back to `Enforce`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" | "warn" | "relaxed" => Self::Lenient,
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::Enforce,
        }
    }

    /// Returns true if entries are evaluated at all.
    #[must_use]
    pub const fn verification_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Returns true if fatal outcomes become warnings.
    #[must_use]
    pub const fn downgrades_failures(self) -> bool {
        matches!(self, Self::Lenient)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::Lenient => "lenient",
            Self::Off => "off",
        }
    }
}

static CACHED_MODE: OnceLock<VerifyMode> = OnceLock::new();
static CACHED_LOG_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Configured verify mode (reads the env var on first call, caches thereafter).
#[must_use]
pub fn verify_mode() -> VerifyMode {
    *CACHED_MODE.get_or_init(|| {
        std::env::var(MODE_ENV)
            .map(|v| VerifyMode::from_str_loose(&v))
            .unwrap_or_default()
    })
}

/// Configured JSONL log path, if any.
#[must_use]
pub fn log_path() -> Option<&'static PathBuf> {
    CACHED_LOG_PATH
        .get_or_init(|| parse_log_path(std::env::var_os(LOG_ENV)))
        .as_ref()
}

fn parse_log_path(raw: Option<std::ffi::OsString>) -> Option<PathBuf> {
    raw.filter(|v| !v.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_verify_modes() {
        assert_eq!(VerifyMode::from_str_loose("enforce"), VerifyMode::Enforce);
        assert_eq!(VerifyMode::from_str_loose("strict"), VerifyMode::Enforce);
        assert_eq!(VerifyMode::from_str_loose("LENIENT"), VerifyMode::Lenient);
        assert_eq!(VerifyMode::from_str_loose("warn"), VerifyMode::Lenient);
        assert_eq!(VerifyMode::from_str_loose(" off "), VerifyMode::Off);
        assert_eq!(VerifyMode::from_str_loose("disabled"), VerifyMode::Off);
        assert_eq!(VerifyMode::from_str_loose("bogus"), VerifyMode::Enforce);
    }

    #[test]
    fn default_is_enforce() {
        assert_eq!(VerifyMode::default(), VerifyMode::Enforce);
    }

    #[test]
    fn only_lenient_downgrades() {
        assert!(!VerifyMode::Enforce.downgrades_failures());
        assert!(VerifyMode::Lenient.downgrades_failures());
        assert!(!VerifyMode::Off.downgrades_failures());
    }

    #[test]
    fn verification_except_off() {
        assert!(VerifyMode::Enforce.verification_enabled());
        assert!(VerifyMode::Lenient.verification_enabled());
        assert!(!VerifyMode::Off.verification_enabled());
    }

    #[test]
    fn empty_log_path_is_disabled() {
        assert_eq!(parse_log_path(None), None);
        assert_eq!(parse_log_path(Some("".into())), None);
        assert_eq!(
            parse_log_path(Some("target/leaks.jsonl".into())),
            Some(PathBuf::from("target/leaks.jsonl"))
        );
    }
}
