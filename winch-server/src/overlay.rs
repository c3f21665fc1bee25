//! Operator-level environment defaults for job subprocesses
//!
//! Settings resolved at spawn time and merged under the job's own
//! `env_overrides` (the job always wins on key collision).

use std::collections::HashMap;

/// Source of operator-level default environment variables for jobs.
pub trait EnvironmentOverlay: Send + Sync {
    /// Resolve the current defaults. Called once per spawn so later
    /// configuration changes reach subsequent jobs.
    fn resolve(&self) -> HashMap<String, String>;
}

/// Overlay backed by the server's own environment: every ambient variable
/// starting with the prefix is forwarded to jobs with the prefix stripped
/// (`WINCH_JOB_ENV_REGISTRY_URL` becomes `REGISTRY_URL`).
pub struct EnvPrefixOverlay {
    prefix: String,
}

impl EnvPrefixOverlay {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl EnvironmentOverlay for EnvPrefixOverlay {
    fn resolve(&self) -> HashMap<String, String> {
        std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(&self.prefix)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_string(), value))
            })
            .collect()
    }
}

/// Fixed overlay for tests.
#[cfg(test)]
#[derive(Default)]
pub struct StaticOverlay {
    vars: HashMap<String, String>,
}

#[cfg(test)]
impl StaticOverlay {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }
}

#[cfg(test)]
impl EnvironmentOverlay for StaticOverlay {
    fn resolve(&self) -> HashMap<String, String> {
        self.vars.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_overlay_strips_prefix() {
        // Set-and-sweep against the real environment; unique name to avoid
        // collisions with parallel tests.
        unsafe {
            std::env::set_var("WINCH_TEST_OVERLAY_REGISTRY_URL", "http://localhost:5000");
        }
        let overlay = EnvPrefixOverlay::new("WINCH_TEST_OVERLAY_");
        let vars = overlay.resolve();
        unsafe {
            std::env::remove_var("WINCH_TEST_OVERLAY_REGISTRY_URL");
        }

        assert_eq!(
            vars.get("REGISTRY_URL"),
            Some(&"http://localhost:5000".to_string())
        );
    }

    #[test]
    fn test_prefix_overlay_ignores_bare_prefix() {
        unsafe {
            std::env::set_var("WINCH_TEST_BARE_", "value");
        }
        let overlay = EnvPrefixOverlay::new("WINCH_TEST_BARE_");
        let vars = overlay.resolve();
        unsafe {
            std::env::remove_var("WINCH_TEST_BARE_");
        }

        assert!(vars.is_empty());
    }
}
