//! Host environment captured into each interaction.

use interlog_core::JsonMap;
use serde_json::Value;

/// Source of the flat key-value environment map attached at `start`.
pub trait EnvironmentProbe: Send + Sync {
    fn capture(&self) -> JsonMap;
}

/// Reads platform, working directory and crate version from the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostEnvironment;

impl EnvironmentProbe for HostEnvironment {
    fn capture(&self) -> JsonMap {
        let mut env = JsonMap::new();
        env.insert("platform".into(), Value::from(std::env::consts::OS));
        env.insert("arch".into(), Value::from(std::env::consts::ARCH));
        env.insert("version".into(), Value::from(env!("CARGO_PKG_VERSION")));
        if let Ok(cwd) = std::env::current_dir() {
            env.insert("working_directory".into(), Value::from(cwd.display().to_string()));
        }
        if let Ok(hostname) = std::env::var("HOSTNAME") {
            env.insert("hostname".into(), Value::from(hostname));
        }
        env
    }
}

/// Returns the same map every time.
#[derive(Debug, Clone, Default)]
pub struct FixedEnvironment(pub JsonMap);

impl EnvironmentProbe for FixedEnvironment {
    fn capture(&self) -> JsonMap {
        self.0.clone()
    }
}
