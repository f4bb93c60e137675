pub mod c_utils;
mod cache;
mod expr;
mod header;
pub mod intrinsics;
mod memory;
mod namegen;
mod shuffle;
mod stmt;
mod xtensa;

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::Type;
use crate::ir::{LoweredFunc, Module};
use crate::target::UnsupportedWidth;

pub use self::cache::ValueCache;
pub use self::expr::Value;
pub use self::header::HeaderEmitter;
pub use self::memory::{Allocation, StorageClass};
pub use self::namegen::NameGenerator;
pub use self::xtensa::{CFunction, XtensaCodeGenerator};

/// Largest byte size of any single allocation.
pub const MAX_ALLOCATION_BYTES: u64 = i32::MAX as u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum ParallelStyle {
    /// Annotate parallel loops with `#pragma omp parallel for`.
    #[default]
    OpenMp,
    /// Emit parallel loops as ordinary serial loops.
    Serial,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CodeGenOptions {
    /// Constant-size allocations of automatic storage at or below this many bytes go on the
    /// stack.
    pub stack_cutoff_bytes: u64,
    /// Acquire the DMA engine at function entry and release it on every exit.
    pub dma_scope: bool,
    /// Lower `Assert` statements into run-time checks. When false they are dropped.
    pub assertions: bool,
    /// Prefix each function with its IR, pretty-printed as a comment.
    pub include_ir: bool,
    pub parallel_style: ParallelStyle,
}

impl Default for CodeGenOptions {
    fn default() -> Self {
        CodeGenOptions {
            stack_cutoff_bytes: 16 * 1024,
            dma_scope: true,
            assertions: true,
            include_ir: false,
            parallel_style: ParallelStyle::default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CodeGenError {
    #[error(transparent)]
    UnsupportedWidth(#[from] UnsupportedWidth),
    #[error("no intrinsic implements {operation} on {ty}")]
    NoMatchingIntrinsic { operation: String, ty: Type },
    #[error("allocation `{name}` needs {bytes} bytes, more than the 2147483647 byte limit")]
    AllocationOverflow { name: String, bytes: u128 },
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("malformed IR: {0}")]
    MalformedIr(String),
    #[error("{source}\n  in: {node}")]
    At {
        node: String,
        #[source]
        source: Box<CodeGenError>,
    },
}

impl CodeGenError {
    /// Attaches the IR node being lowered, unless a more deeply nested node is already attached.
    pub fn at(self, node: impl FnOnce() -> String) -> Self {
        match self {
            CodeGenError::At { .. } => self,
            _ => CodeGenError::At {
                node: node(),
                source: Box::new(self),
            },
        }
    }

    /// The error with any node attachment removed.
    pub fn kind(&self) -> &CodeGenError {
        match self {
            CodeGenError::At { source, .. } => source.kind(),
            _ => self,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoweringError {
    #[error("failed to lower `{function}`: {source}")]
    Function {
        function: String,
        #[source]
        source: CodeGenError,
    },
    #[error("failed to write generated code")]
    Fmt(#[from] fmt::Error),
}

pub trait CodeGen {
    fn emit<W: fmt::Write>(&self, out: &mut W) -> Result<(), LoweringError> {
        self.emit_ext(&CodeGenOptions::default(), out)
    }

    fn emit_ext<W: fmt::Write>(
        &self,
        options: &CodeGenOptions,
        out: &mut W,
    ) -> Result<(), LoweringError>;

    fn emit_string(&self, options: &CodeGenOptions) -> Result<String, LoweringError> {
        let mut out = String::new();
        self.emit_ext(options, &mut out)?;
        Ok(out)
    }
}

impl CodeGen for Module {
    fn emit_ext<W: fmt::Write>(
        &self,
        options: &CodeGenOptions,
        out: &mut W,
    ) -> Result<(), LoweringError> {
        info!(
            "Lowering module {} with {} functions",
            self.name,
            self.functions.len()
        );
        // Functions share no state, so they are lowered independently and stitched together
        // in input order.
        let lowered = self
            .functions
            .par_iter()
            .map(|f| lower_function(f, options))
            .collect::<Vec<_>>();

        let mut headers = HeaderEmitter::new();
        let mut functions = Vec::with_capacity(lowered.len());
        for result in lowered {
            let (function, function_headers) = result?;
            headers.merge(function_headers);
            functions.push(function);
        }
        headers.emit(out)?;
        for function in &functions {
            out.write_char('\n')?;
            function.emit(out)?;
        }
        Ok(())
    }
}

impl CodeGen for LoweredFunc {
    fn emit_ext<W: fmt::Write>(
        &self,
        options: &CodeGenOptions,
        out: &mut W,
    ) -> Result<(), LoweringError> {
        let (function, headers) = lower_function(self, options)?;
        headers.emit(out)?;
        out.write_char('\n')?;
        function.emit(out)?;
        Ok(())
    }
}

/// Lowers one function, returning its C definition and the type declarations it needs.
pub fn lower_function(
    f: &LoweredFunc,
    options: &CodeGenOptions,
) -> Result<(CFunction, HeaderEmitter), LoweringError> {
    info!("Lowering function {}", f.name);
    let mut generator = XtensaCodeGenerator::new(options);
    let function = generator
        .compile_function(f)
        .map_err(|source| LoweringError::Function {
            function: f.name.clone(),
            source,
        })?;
    Ok((function, generator.headers))
}
