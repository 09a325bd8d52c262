//! `${VAR}` expansion for configuration text.

use regex_lite::Regex;
use std::sync::OnceLock;

fn env_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$\{([^}]+)\}").ok())
        .as_ref()
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
///
/// Unset variables are left as written so the parse error points at them.
pub fn expand_env(s: &str) -> String {
    let Some(re) = env_pattern() else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env() {
        // Unique var names, tests run in parallel
        std::env::set_var("WATCHER_ENV_TEST_VAR", "test_value");
        assert_eq!(expand_env("${WATCHER_ENV_TEST_VAR}"), "test_value");
        assert_eq!(
            expand_env("prefix_${WATCHER_ENV_TEST_VAR}_suffix"),
            "prefix_test_value_suffix"
        );
        assert_eq!(expand_env("no_vars"), "no_vars");
        std::env::remove_var("WATCHER_ENV_TEST_VAR");
    }

    #[test]
    fn test_unset_var_left_in_place() {
        assert_eq!(
            expand_env("key = \"${WATCHER_ENV_SURELY_UNSET}\""),
            "key = \"${WATCHER_ENV_SURELY_UNSET}\""
        );
    }
}
