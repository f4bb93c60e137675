use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::{fs, io, path};

use xtensa_codegen::codegen::{CodeGen, CodeGenOptions, ParallelStyle};
use xtensa_codegen::demos::{all_demos, DemoKernel};
use xtensa_codegen::ir::Module;
use xtensa_codegen::utils::ToWriteFmt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Largest constant-size automatic allocation, in bytes, placed on the stack
    #[arg(long, default_value_t = 16 * 1024)]
    stack_cutoff: u64,

    /// Do not acquire the DMA engine around each function
    #[arg(long)]
    no_dma_scope: bool,

    /// Drop assertions instead of checking them at run time
    #[arg(long)]
    no_assertions: bool,

    /// Print each function's IR as a comment above it
    #[arg(long)]
    include_ir: bool,

    /// Emit parallel loops as serial loops
    #[arg(long)]
    serial: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    #[command(about = "Print the code generated for a built-in sample function")]
    Demo {
        /// Emit every sample function if omitted
        #[arg(value_enum)]
        kernel: Option<DemoKernel>,
    },
    #[command(about = "Lower a bincode-encoded module")]
    Lower { path: path::PathBuf },
}

impl Args {
    fn options(&self) -> CodeGenOptions {
        CodeGenOptions {
            stack_cutoff_bytes: self.stack_cutoff,
            dma_scope: !self.no_dma_scope,
            assertions: !self.no_assertions,
            include_ir: self.include_ir,
            parallel_style: if self.serial {
                ParallelStyle::Serial
            } else {
                ParallelStyle::OpenMp
            },
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let options = args.options();
    let mut out = ToWriteFmt(io::stdout().lock());
    match &args.command {
        Command::Demo { kernel: Some(kernel) } => {
            kernel.function().emit_ext(&options, &mut out)?;
        }
        Command::Demo { kernel: None } => {
            all_demos().emit_ext(&options, &mut out)?;
        }
        Command::Lower { path } => {
            let bytes =
                fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let module: Module = bincode::deserialize(&bytes)
                .with_context(|| format!("decoding module from {}", path.display()))?;
            info!(
                "Read module {} ({} functions) from {}",
                module.name,
                module.functions.len(),
                path.display()
            );
            module.emit_ext(&options, &mut out)?;
        }
    }
    Ok(())
}
