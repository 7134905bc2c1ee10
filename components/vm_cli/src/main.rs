//! Corten VM CLI
//!
//! Entry point for the VM. Parses CLI arguments and delegates to the
//! Runtime for loading and execution.

use clap::Parser as ClapParser;
use core_types::Value;
use vm_cli::{Cli, CliResult, Runtime};

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("{}", e.report());
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> CliResult<()> {
    let Some(file) = &cli.file else {
        print_usage();
        return Ok(());
    };

    let mut runtime = Runtime::new(cli.vm_config()?)?.with_print_disassembly(cli.disassemble);

    if let Some(output) = &cli.compile {
        return runtime.compile_file(file, output);
    }

    let result = runtime.execute_file(file);
    if cli.gc_stats {
        eprintln!("{}", runtime.gc_report());
    }
    let result = result?;
    // Print result if not null
    if result != Value::Null {
        println!("{}", runtime.display(result)?);
    }
    Ok(())
}

fn print_usage() {
    println!("Corten VM v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage:");
    println!("  corten-vm <FILE>                Run an assembly file or compiled image");
    println!("  corten-vm <FILE> -o <IMAGE>     Compile an assembly file to an image");
    println!("  corten-vm <FILE> --disassemble  Print the program before running it");
    println!();
    println!("Run 'corten-vm --help' for more options.");
}
