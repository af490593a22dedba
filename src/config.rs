use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

/// Engine configuration.
///
/// Loaded from the YAML file named by `WEFT_CONFIG` when set; `LISTEN`
/// overrides the listen address either way.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub limits: Limits,
    pub timeouts: Timeouts,
    pub pool: PoolConfig,
}

/// Size limits for parsing and reading.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Longest accepted request line, line terminator excluded
    pub max_first_line_size: usize,
    /// Largest accepted header block, line terminators included
    pub max_header_size: usize,
    /// Largest accepted request body
    pub max_body_size: usize,
    /// Size of the per-connection read buffer
    pub read_buffer_size: usize,
}

/// Connection deadlines in milliseconds. Unset means no deadline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub read_ms: Option<u64>,
    pub write_ms: Option<u64>,
    pub idle_ms: Option<u64>,
    pub handler_ms: Option<u64>,
    /// Short wait for pipelined bytes before falling back to the idle deadline
    pub pipeline_probe_ms: u64,
}

/// Context and buffer pool sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_idle_contexts: usize,
    /// Buffers larger than this are dropped instead of being kept for reuse
    pub buffer_retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_first_line_size: 4096,
            max_header_size: 8192,
            max_body_size: 4 * 1024 * 1024,
            read_buffer_size: 4096,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read_ms: Some(30_000),
            write_ms: Some(30_000),
            idle_ms: Some(60_000),
            handler_ms: None,
            pipeline_probe_ms: 5,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_contexts: 1024,
            buffer_retention: 64 * 1024,
        }
    }
}

impl Timeouts {
    /// No deadlines at all, and no pipeline probe.
    pub fn none() -> Self {
        Self {
            read_ms: None,
            write_ms: None,
            idle_ms: None,
            handler_ms: None,
            pipeline_probe_ms: 0,
        }
    }

    pub fn read(&self) -> Option<Duration> {
        self.read_ms.map(Duration::from_millis)
    }

    pub fn write(&self) -> Option<Duration> {
        self.write_ms.map(Duration::from_millis)
    }

    pub fn idle(&self) -> Option<Duration> {
        self.idle_ms.map(Duration::from_millis)
    }

    pub fn handler(&self) -> Option<Duration> {
        self.handler_ms.map(Duration::from_millis)
    }

    pub fn pipeline_probe(&self) -> Duration {
        Duration::from_millis(self.pipeline_probe_ms)
    }
}

impl Config {
    /// Loads the configuration, falling back to defaults when the file named
    /// by `WEFT_CONFIG` cannot be used.
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to default configuration");
                let mut cfg = Self::default();
                cfg.apply_env();
                cfg
            }
        }
    }

    pub fn try_load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("WEFT_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("LISTEN") {
            self.listen_addr = addr;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.limits.read_buffer_size == 0 {
            anyhow::bail!("limits.read_buffer_size must be greater than zero");
        }
        if self.limits.max_first_line_size == 0 || self.limits.max_header_size == 0 {
            anyhow::bail!("request line and header limits must be greater than zero");
        }
        Ok(())
    }
}
