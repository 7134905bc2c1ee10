//! Runtime configuration for a VM instance.
//!
//! The capacities here are the values that a fixed-array implementation
//! would bake in at compile time. Exceeding any of them is reported as an
//! overflow rather than reallocated past.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum depth of a fiber's value stack
pub const DEFAULT_MAX_STACK_SLOTS: usize = 1024;
/// Default maximum depth of a fiber's call-frame stack
pub const DEFAULT_MAX_CALL_FRAMES: usize = 256;
/// Default maximum number of interned symbols per table
pub const DEFAULT_MAX_SYMBOLS: usize = 256;
/// Default byte threshold that triggers the first collection (10 MiB)
pub const DEFAULT_INITIAL_NEXT_GC: usize = 10 * 1024 * 1024;
/// Default lower bound for the recomputed threshold (1 MiB)
pub const DEFAULT_MIN_NEXT_GC: usize = 1024 * 1024;
/// Default threshold growth after a collection, as a percentage of live bytes
pub const DEFAULT_HEAP_GROWTH_PERCENT: usize = 150;

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A capacity was zero
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
    /// Operands are encoded in 16 bits, so larger tables are unaddressable
    #[error("max_symbols {0} exceeds the 65536 slots addressable by an operand")]
    TooManySymbols(usize),
    /// The collector would never raise its threshold
    #[error("heap_growth_percent must be at least 100, got {0}")]
    GrowthTooSmall(usize),
    /// The configuration file could not be parsed
    #[error("invalid configuration: {0}")]
    Parse(String),
}

/// Capacity limits and collector tuning for a VM.
///
/// # Examples
///
/// ```
/// use core_types::VmConfig;
///
/// let config = VmConfig::default()
///     .with_max_stack_slots(64)
///     .with_max_call_frames(8);
///
/// assert_eq!(config.max_stack_slots, 64);
/// assert_eq!(config.max_symbols, 256);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Maximum number of values on the fiber's stack
    pub max_stack_slots: usize,
    /// Maximum number of live call frames
    pub max_call_frames: usize,
    /// Maximum number of entries in each symbol table
    pub max_symbols: usize,
    /// Allocated bytes that trigger the first collection
    pub initial_next_gc: usize,
    /// Smallest threshold the collector will set after a cycle
    pub min_next_gc: usize,
    /// Threshold after a cycle, as a percentage of the surviving bytes
    pub heap_growth_percent: usize,
    /// Hard heap limit; `None` means limited only by the system allocator
    pub max_heap_bytes: Option<usize>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack_slots: DEFAULT_MAX_STACK_SLOTS,
            max_call_frames: DEFAULT_MAX_CALL_FRAMES,
            max_symbols: DEFAULT_MAX_SYMBOLS,
            initial_next_gc: DEFAULT_INITIAL_NEXT_GC,
            min_next_gc: DEFAULT_MIN_NEXT_GC,
            heap_growth_percent: DEFAULT_HEAP_GROWTH_PERCENT,
            max_heap_bytes: None,
        }
    }
}

impl VmConfig {
    /// Set the value stack capacity
    pub fn with_max_stack_slots(mut self, slots: usize) -> Self {
        self.max_stack_slots = slots;
        self
    }

    /// Set the call frame capacity
    pub fn with_max_call_frames(mut self, frames: usize) -> Self {
        self.max_call_frames = frames;
        self
    }

    /// Set the symbol table capacity
    pub fn with_max_symbols(mut self, symbols: usize) -> Self {
        self.max_symbols = symbols;
        self
    }

    /// Set the first collection threshold
    pub fn with_initial_next_gc(mut self, bytes: usize) -> Self {
        self.initial_next_gc = bytes;
        self
    }

    /// Set the lower bound for recomputed thresholds
    pub fn with_min_next_gc(mut self, bytes: usize) -> Self {
        self.min_next_gc = bytes;
        self
    }

    /// Set the threshold growth percentage
    pub fn with_heap_growth_percent(mut self, percent: usize) -> Self {
        self.heap_growth_percent = percent;
        self
    }

    /// Set a hard heap limit
    pub fn with_max_heap_bytes(mut self, bytes: usize) -> Self {
        self.max_heap_bytes = Some(bytes);
        self
    }

    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_stack_slots == 0 {
            return Err(ConfigError::ZeroCapacity("max_stack_slots"));
        }
        if self.max_call_frames == 0 {
            return Err(ConfigError::ZeroCapacity("max_call_frames"));
        }
        if self.max_symbols == 0 {
            return Err(ConfigError::ZeroCapacity("max_symbols"));
        }
        if self.max_symbols > usize::from(u16::MAX) + 1 {
            return Err(ConfigError::TooManySymbols(self.max_symbols));
        }
        if self.heap_growth_percent < 100 {
            return Err(ConfigError::GrowthTooSmall(self.heap_growth_percent));
        }
        Ok(())
    }

    /// Parse a configuration from JSON. Missing fields keep their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::VmConfig;
    ///
    /// let config = VmConfig::from_json(r#"{ "max_call_frames": 32 }"#).unwrap();
    /// assert_eq!(config.max_call_frames, 32);
    /// assert_eq!(config.max_stack_slots, 1024);
    /// ```
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: VmConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
