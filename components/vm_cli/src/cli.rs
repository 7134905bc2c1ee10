//! Command-line arguments

use clap::Parser;
use core_types::VmConfig;
use log::LevelFilter;

use crate::error::CliResult;

/// Run assembled programs on the VM
#[derive(Parser, Debug, Clone, PartialEq, Eq, Default)]
#[command(name = "corten-vm", version, about)]
pub struct Cli {
    /// Assembly source or compiled image to run
    pub file: Option<String>,

    /// Print the disassembled program before running it
    #[arg(short, long)]
    pub disassemble: bool,

    /// Log every executed instruction
    #[arg(long)]
    pub trace: bool,

    /// Print collector statistics after the run
    #[arg(long)]
    pub gc_stats: bool,

    /// Collect on every allocation
    #[arg(long)]
    pub stress_gc: bool,

    /// JSON file with VM limits and collector tuning
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<String>,

    /// Value stack capacity in slots
    #[arg(long, value_name = "SLOTS")]
    pub stack_size: Option<usize>,

    /// Call frame capacity
    #[arg(long, value_name = "FRAMES")]
    pub max_frames: Option<usize>,

    /// Write a compiled image to PATH instead of running
    #[arg(short = 'o', long, value_name = "PATH")]
    pub compile: Option<String>,
}

impl Cli {
    /// Arguments that run `file` with defaults
    pub fn with_file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Self::default()
        }
    }

    /// The VM configuration: the `--config` file if given, then flag overrides
    pub fn vm_config(&self) -> CliResult<VmConfig> {
        let mut config = match &self.config {
            Some(path) => VmConfig::from_json(&std::fs::read_to_string(path)?)?,
            None => VmConfig::default(),
        };
        if let Some(slots) = self.stack_size {
            config = config.with_max_stack_slots(slots);
        }
        if let Some(frames) = self.max_frames {
            config = config.with_max_call_frames(frames);
        }
        if self.stress_gc {
            config = config
                .with_initial_next_gc(0)
                .with_min_next_gc(0)
                .with_heap_growth_percent(100);
        }
        config.validate()?;
        Ok(config)
    }

    /// Log level when `RUST_LOG` is unset
    pub fn log_level(&self) -> LevelFilter {
        if self.trace {
            LevelFilter::Trace
        } else {
            LevelFilter::Warn
        }
    }
}
