//! Runtime orchestration for program execution
//!
//! The Runtime struct ties the components together:
//! - the assembler and compiled images for loading programs
//! - the disassembler for `--disassemble`
//! - the VM for execution and collector statistics

use std::fs;
use std::io::Write;
use std::path::Path;

use bytecode_system::{assemble, disassemble_with_options, BytecodeChunk, DisasmOptions, SymbolKind};
use core_types::{Value, VmConfig};
use interpreter::Vm;

use crate::error::CliResult;
use crate::image::Image;

/// Loads and runs programs on one VM
pub struct Runtime {
    /// Whether to print the disassembly before execution
    print_disassembly: bool,
    /// VM shared by every program this runtime executes
    vm: Vm,
}

impl Runtime {
    /// Create a runtime around a fresh VM
    ///
    /// # Example
    /// ```
    /// use core_types::VmConfig;
    /// use vm_cli::Runtime;
    ///
    /// let runtime = Runtime::new(VmConfig::default()).unwrap();
    /// assert!(!runtime.is_print_disassembly_enabled());
    /// ```
    pub fn new(config: VmConfig) -> CliResult<Self> {
        Ok(Self {
            print_disassembly: false,
            vm: Vm::new(config)?,
        })
    }

    /// Enable disassembly printing
    pub fn with_print_disassembly(mut self, enabled: bool) -> Self {
        self.print_disassembly = enabled;
        self
    }

    /// Send `IO.write` output to `output`
    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.vm = self.vm.with_output(output);
        self
    }

    /// Check if disassembly printing is enabled
    pub fn is_print_disassembly_enabled(&self) -> bool {
        self.print_disassembly
    }

    /// Load a program file: an image if it looks like one, assembly otherwise
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> CliResult<BytecodeChunk> {
        let text = fs::read_to_string(path)?;
        if Image::is_image(&text) {
            Image::from_json(&text)?.install(&mut self.vm)
        } else {
            Ok(assemble(&text, &mut self.vm)?)
        }
    }

    /// Execute a program file
    ///
    /// # Example
    /// ```no_run
    /// use core_types::VmConfig;
    /// use vm_cli::Runtime;
    ///
    /// let mut runtime = Runtime::new(VmConfig::default()).unwrap();
    /// let result = runtime.execute_file("program.casm").unwrap();
    /// ```
    pub fn execute_file(&mut self, path: impl AsRef<Path>) -> CliResult<Value> {
        let chunk = self.load_file(path)?;
        self.execute_chunk(&chunk)
    }

    /// Assemble and execute source text
    ///
    /// # Example
    /// ```
    /// use core_types::{Value, VmConfig};
    /// use vm_cli::Runtime;
    ///
    /// let mut runtime = Runtime::new(VmConfig::default()).unwrap();
    /// let result = runtime
    ///     .execute_string(".fn main 0\n CONSTANT 6\n CONSTANT 7\n CALL_1 *\n END\n.end\n")
    ///     .unwrap();
    /// assert_eq!(result, Value::Num(42.0));
    /// ```
    pub fn execute_string(&mut self, source: &str) -> CliResult<Value> {
        let chunk = assemble(source, &mut self.vm)?;
        self.execute_chunk(&chunk)
    }

    /// Execute an already assembled chunk
    pub fn execute_chunk(&mut self, chunk: &BytecodeChunk) -> CliResult<Value> {
        if self.print_disassembly {
            println!("{}", self.disassemble(chunk)?);
        }
        Ok(self.vm.run(chunk)?)
    }

    /// Assemble the program at `input` and write it to `output` as an image
    pub fn compile_file(
        &mut self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> CliResult<()> {
        let chunk = self.load_file(input)?;
        chunk.validate().map_err(core_types::VmError::from)?;
        let image = Image::capture(&self.vm, &chunk);
        fs::write(output.as_ref(), image.to_json()?)?;
        log::info!("wrote image to {}", output.as_ref().display());
        Ok(())
    }

    /// Disassemble `chunk` with symbol operands shown by name
    pub fn disassemble(&self, chunk: &BytecodeChunk) -> CliResult<String> {
        let vm = &self.vm;
        let resolve: &dyn Fn(SymbolKind, u16) -> Option<String> = &|kind: SymbolKind, index: u16| {
            let table = match kind {
                SymbolKind::Method => vm.method_symbols(),
                SymbolKind::Global => vm.global_symbols(),
            };
            table.name_of(usize::from(index)).map(str::to_string)
        };
        let options = DisasmOptions {
            symbol_resolver: Some(resolve),
        };
        Ok(disassemble_with_options(chunk, &options).map_err(core_types::VmError::from)?)
    }

    /// Render a value the way `toString` does
    pub fn display(&self, value: Value) -> CliResult<String> {
        Ok(self.vm.display(value)?)
    }

    /// Collector statistics as printed by `--gc-stats`
    pub fn gc_report(&self) -> String {
        let stats = self.vm.gc_stats();
        let heap = self.vm.heap();
        format!(
            "collections: {}\nobjects allocated: {}\nobjects freed: {}\nbytes freed: {}\npeak bytes: {}\nlive objects: {}\nlive bytes: {}",
            stats.collections,
            stats.objects_allocated,
            stats.objects_freed,
            stats.bytes_freed,
            stats.peak_bytes,
            heap.live_objects(),
            heap.total_allocated()
        )
    }

    /// Get access to the VM for direct manipulation
    pub fn vm(&mut self) -> &mut Vm {
        &mut self.vm
    }
}
