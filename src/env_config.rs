//! Centralized environment-variable parsing helpers.
//!
//! All kernel toggles and tuning knobs read from the environment go through
//! these helpers so the truthy/falsey parsing logic lives in exactly one place.

/// Pins the scalar reference kernel regardless of detected CPU features.
pub(crate) const FORCE_SCALAR_VAR: &str = "YIQDIFF_FORCE_SCALAR";
/// Processes every comparison as a single band on the calling thread.
pub(crate) const DISABLE_PARALLEL_VAR: &str = "YIQDIFF_DISABLE_PARALLEL";
/// Upper bound on the number of band workers.
pub(crate) const MAX_WORKERS_VAR: &str = "YIQDIFF_MAX_WORKERS";

/// Returns `true` when the environment variable is set to a truthy value
/// (`1`, `true`, `yes`, or `on`, case-insensitive, trimmed).
#[inline]
pub(crate) fn env_var_truthy(var_name: &str) -> bool {
    std::env::var(var_name)
        .map(|raw| is_truthy(&raw))
        .unwrap_or(false)
}

fn is_truthy(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
}

/// Parses the environment variable as a `u64`, returning `Some` only when
/// the value is a valid positive (> 0) integer.
#[inline]
pub(crate) fn env_var_positive_u64(var_name: &str) -> Option<u64> {
    let raw = std::env::var(var_name).ok()?;
    let parsed = parse_positive_u64(&raw);
    if parsed.is_none() {
        log::warn!("ignoring {var_name}={raw:?}: expected a positive integer");
    }
    parsed
}

fn parse_positive_u64(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|value| *value > 0)
}

/// Declares a cached boolean feature flag backed by a `OnceLock<bool>`.
///
/// `enabled_unless(fn_name, "ENV_VAR")` returns `true` unless the env var
/// is truthy (i.e. the feature is on by default, disabled by the env var).
///
/// `enabled_when(fn_name, "ENV_VAR")` returns `true` only when the env var
/// is truthy (i.e. the feature is off by default, enabled by the env var).
macro_rules! define_env_flag {
    (enabled_unless($fn_name:ident, $var:expr)) => {
        #[inline]
        pub(crate) fn $fn_name() -> bool {
            static VALUE: ::std::sync::OnceLock<bool> = ::std::sync::OnceLock::new();
            *VALUE.get_or_init(|| !$crate::env_config::env_var_truthy($var))
        }
    };
    (enabled_when($fn_name:ident, $var:expr)) => {
        #[inline]
        pub(crate) fn $fn_name() -> bool {
            static VALUE: ::std::sync::OnceLock<bool> = ::std::sync::OnceLock::new();
            *VALUE.get_or_init(|| $crate::env_config::env_var_truthy($var))
        }
    };
}

pub(crate) use define_env_flag;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values_are_case_insensitive_and_trimmed() {
        for raw in ["1", "true", " YES ", "On"] {
            assert!(is_truthy(raw), "{raw:?} should be truthy");
        }
        for raw in ["", "0", "false", "off", "enabled"] {
            assert!(!is_truthy(raw), "{raw:?} should be falsey");
        }
    }

    #[test]
    fn positive_u64_rejects_zero_and_garbage() {
        assert_eq!(parse_positive_u64(" 4 "), Some(4));
        assert_eq!(parse_positive_u64("0"), None);
        assert_eq!(parse_positive_u64("-2"), None);
        assert_eq!(parse_positive_u64("many"), None);
    }
}
