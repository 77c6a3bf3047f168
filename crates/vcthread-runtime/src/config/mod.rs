//! Runtime configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Environment variables, read once when the core pool starts
//! 2. The user's config file named by `VCT_CONFIG_RS` at build time
//! 3. Library defaults
//!
//! ```rust,ignore
//! use vcthread_runtime::config::VcoreConfig;
//!
//! let config = VcoreConfig::from_env().max_vcores(4).pin_cores(false);
//! config.validate()?;
//! ```

pub mod defaults;

use vcthread_core::constants::{MAX_VCORES, MIN_STACK_SIZE};
use vcthread_core::env::{env_get, env_get_bool, env_get_size};

/// Number of processors the host reports, at least 1
pub fn host_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Virtual core pool configuration with builder pattern
#[derive(Debug, Clone)]
pub struct VcoreConfig {
    /// Size of the core pool, fixed for the life of the process
    pub max_vcores: usize,
    /// Stack each core runs vcore-context code on
    pub transition_stack_size: usize,
    /// Alternate stack for the notification signal handler
    pub signal_stack_size: usize,
    /// Default size of stacks handed out by `UthreadStack::with_default_size`
    pub uthread_stack_size: usize,
    /// Stack of each backing pthread (the entry gate runs here)
    pub vcore_thread_stack_size: usize,
    /// Pin core N to processor N modulo the host count
    pub pin_cores: bool,
    pub debug_logging: bool,
}

impl Default for VcoreConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl VcoreConfig {
    /// Compile-time defaults with environment overrides
    ///
    /// Environment variables (all optional):
    /// - `VCORE_LIMIT` - Number of virtual cores (default: host CPU count)
    /// - `VCT_TRANSITION_STACK_SIZE` - Vcore-context stack, e.g. `256K`
    /// - `VCT_SIGNAL_STACK_SIZE` - Signal alternate stack
    /// - `VCT_UTHREAD_STACK_SIZE` - Default user thread stack
    /// - `VCT_VCORE_THREAD_STACK_SIZE` - Backing pthread stack
    /// - `VCT_PIN_CORES` - Pin cores to processors (0/1)
    /// - `VCT_DEBUG` - Enable debug logging (0/1)
    pub fn from_env() -> Self {
        let base = Self::new();
        Self {
            max_vcores: env_get("VCORE_LIMIT", base.max_vcores),
            transition_stack_size: env_get_size(
                "VCT_TRANSITION_STACK_SIZE",
                base.transition_stack_size,
            ),
            signal_stack_size: env_get_size("VCT_SIGNAL_STACK_SIZE", base.signal_stack_size),
            uthread_stack_size: env_get_size("VCT_UTHREAD_STACK_SIZE", base.uthread_stack_size),
            vcore_thread_stack_size: env_get_size(
                "VCT_VCORE_THREAD_STACK_SIZE",
                base.vcore_thread_stack_size,
            ),
            pin_cores: env_get_bool("VCT_PIN_CORES", base.pin_cores),
            debug_logging: env_get_bool("VCT_DEBUG", base.debug_logging),
        }
    }

    /// Compiled-in defaults only (no env override)
    pub fn new() -> Self {
        let max_vcores = match defaults::MAX_VCORES {
            0 => host_cpus().min(MAX_VCORES),
            n => n,
        };
        Self {
            max_vcores,
            transition_stack_size: defaults::TRANSITION_STACK_SIZE,
            signal_stack_size: defaults::SIGNAL_STACK_SIZE,
            uthread_stack_size: defaults::UTHREAD_STACK_SIZE,
            vcore_thread_stack_size: defaults::VCORE_THREAD_STACK_SIZE,
            pin_cores: defaults::PIN_CORES,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn max_vcores(mut self, n: usize) -> Self {
        self.max_vcores = n;
        self
    }

    pub fn transition_stack_size(mut self, size: usize) -> Self {
        self.transition_stack_size = size;
        self
    }

    pub fn signal_stack_size(mut self, size: usize) -> Self {
        self.signal_stack_size = size;
        self
    }

    pub fn uthread_stack_size(mut self, size: usize) -> Self {
        self.uthread_stack_size = size;
        self
    }

    pub fn vcore_thread_stack_size(mut self, size: usize) -> Self {
        self.vcore_thread_stack_size = size;
        self
    }

    pub fn pin_cores(mut self, enable: bool) -> Self {
        self.pin_cores = enable;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_vcores == 0 {
            return Err(ConfigError::InvalidValue("max_vcores must be > 0"));
        }
        if self.max_vcores > MAX_VCORES {
            return Err(ConfigError::InvalidValue("max_vcores must be <= 64"));
        }
        if self.transition_stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("transition_stack_size must be >= 16KB"));
        }
        if self.signal_stack_size < libc::MINSIGSTKSZ.max(MIN_STACK_SIZE) {
            return Err(ConfigError::InvalidValue("signal_stack_size below MINSIGSTKSZ"));
        }
        if self.uthread_stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("uthread_stack_size must be >= 16KB"));
        }
        if self.vcore_thread_stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("vcore_thread_stack_size must be >= 16KB"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("vcthread configuration:");
        eprintln!("  max_vcores:              {}", self.max_vcores);
        eprintln!("  transition_stack_size:   {}", self.transition_stack_size);
        eprintln!("  signal_stack_size:       {}", self.signal_stack_size);
        eprintln!("  uthread_stack_size:      {}", self.uthread_stack_size);
        eprintln!("  vcore_thread_stack_size: {}", self.vcore_thread_stack_size);
        eprintln!("  pin_cores:               {}", self.pin_cores);
        eprintln!("  debug_logging:           {}", self.debug_logging);
    }
}

/// Configuration error
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for vcthread_core::VcoreError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => vcthread_core::VcoreError::Config(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = VcoreConfig::new();
        assert!(config.max_vcores >= 1);
        assert!(config.max_vcores <= MAX_VCORES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = VcoreConfig::new()
            .max_vcores(4)
            .pin_cores(false)
            .uthread_stack_size(1 << 20);
        assert_eq!(config.max_vcores, 4);
        assert!(!config.pin_cores);
        assert_eq!(config.uthread_stack_size, 1 << 20);
    }

    #[test]
    fn test_validation() {
        assert!(VcoreConfig::new().max_vcores(0).validate().is_err());
        assert!(VcoreConfig::new().max_vcores(65).validate().is_err());
        assert!(VcoreConfig::new().signal_stack_size(512).validate().is_err());
        assert!(VcoreConfig::new().transition_stack_size(4096).validate().is_err());
    }

    #[test]
    fn test_config_error_converts() {
        let err: vcthread_core::VcoreError = ConfigError::InvalidValue("x").into();
        assert_eq!(err, vcthread_core::VcoreError::Config("x"));
    }
}
