//! Bridge configuration.

use std::path::PathBuf;
use std::time::Duration;

use lamina_ir::RuntimeName;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Per-call deadline for external runtimes.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for an external runtime to complete its handshake.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);
/// Initial native output buffer length, in values.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 256;

/// How to launch one external runtime kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Origin of contrast and domain indices the runtime expects
    /// (1 for MATLAB-style environments).
    #[serde(default)]
    pub index_base: usize,
}

impl RuntimeCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        RuntimeCommand {
            program: program.into(),
            args: Vec::new(),
            index_base: 0,
        }
    }

    #[must_use]
    pub fn with_args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_index_base(mut self, base: usize) -> Self {
        self.index_base = base;
        self
    }
}

/// Settings shared by the registry, its adapters and the driver.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub call_timeout: Duration,
    pub startup_timeout: Duration,
    pub runtimes: FxHashMap<RuntimeName, RuntimeCommand>,
    pub output_capacity: usize,
    /// Recursion limit for interpreted functions.
    pub max_call_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut runtimes = FxHashMap::default();
        runtimes.insert(RuntimeName::host(), RuntimeCommand::new("lamina-host"));
        BridgeConfig {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            runtimes,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            max_call_depth: lamina_script::Interpreter::DEFAULT_MAX_DEPTH,
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `LAMINA_CALL_TIMEOUT_MS`,
    /// `LAMINA_STARTUP_TIMEOUT_MS` and `LAMINA_HOST`.
    pub fn from_env() -> Self {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ms) = millis(&var, "LAMINA_CALL_TIMEOUT_MS") {
            self.call_timeout = ms;
        }
        if let Some(ms) = millis(&var, "LAMINA_STARTUP_TIMEOUT_MS") {
            self.startup_timeout = ms;
        }
        if let Some(host) = var("LAMINA_HOST").filter(|h| !h.is_empty()) {
            self.runtimes
                .insert(RuntimeName::host(), RuntimeCommand::new(host));
        }
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_runtime(mut self, name: RuntimeName, command: RuntimeCommand) -> Self {
        self.runtimes.insert(name, command);
        self
    }

    #[must_use]
    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn runtime(&self, name: &RuntimeName) -> Option<&RuntimeCommand> {
        self.runtimes.get(name)
    }
}

fn millis(var: impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = var(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring malformed duration");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.startup_timeout, Duration::from_secs(60));
        assert_eq!(config.output_capacity, 256);
        assert_eq!(
            config.runtime(&RuntimeName::host()),
            Some(&RuntimeCommand::new("lamina-host"))
        );
    }

    #[test]
    fn environment_overrides() {
        let env = |key: &str| match key {
            "LAMINA_CALL_TIMEOUT_MS" => Some("1500".to_string()),
            "LAMINA_STARTUP_TIMEOUT_MS" => Some("soon".to_string()),
            "LAMINA_HOST" => Some("/opt/lamina/host".to_string()),
            _ => None,
        };
        let config = BridgeConfig::default().apply_env(env);
        assert_eq!(config.call_timeout, Duration::from_millis(1500));
        assert_eq!(config.startup_timeout, DEFAULT_STARTUP_TIMEOUT);
        assert_eq!(
            config.runtime(&RuntimeName::host()).map(|c| c.program.clone()),
            Some(PathBuf::from("/opt/lamina/host"))
        );
    }

    #[test]
    fn builder() {
        let config = BridgeConfig::default()
            .with_call_timeout(Duration::from_millis(10))
            .with_output_capacity(0)
            .with_runtime(
                RuntimeName::new("matlab"),
                RuntimeCommand::new("matlab-bridge").with_index_base(1),
            );
        assert_eq!(config.call_timeout, Duration::from_millis(10));
        assert_eq!(config.output_capacity, 1);
        assert_eq!(
            config.runtime(&RuntimeName::new("matlab")).map(|c| c.index_base),
            Some(1)
        );
    }
}
