//! Sample functions exercising the main lowering paths, for the command-line tool and tests.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

use crate::common::Type;
use crate::ir::{
    Arg, BinOp, Callee, Expr, ForKind, Linkage, LoweredFunc, MemoryType, Module, ModulusRemainder,
    Stmt,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumIter, clap::ValueEnum,
)]
pub enum DemoKernel {
    /// Element-wise sum of two int16 arrays, two registers per iteration.
    AddI16,
    /// Clamp of int16 values into a range passed as arguments.
    Clamp,
    /// Widening multiply-accumulate of int16 inputs into int32.
    WidenMulAdd,
    /// Even bytes of a uint8 array.
    Deinterleave,
    /// Tiles of a buffer copied through scratchpad memory by DMA, scaled in parallel.
    DmaScale,
}

impl DemoKernel {
    pub fn function(&self) -> LoweredFunc {
        match self {
            DemoKernel::AddI16 => add_i16(),
            DemoKernel::Clamp => clamp(),
            DemoKernel::WidenMulAdd => widen_mul_add(),
            DemoKernel::Deinterleave => deinterleave(),
            DemoKernel::DmaScale => dma_scale(),
        }
    }
}

/// A module holding every demo function.
pub fn all_demos() -> Module {
    Module {
        name: "demos".to_string(),
        functions: DemoKernel::iter().map(|k| k.function()).collect(),
    }
}

fn i32_var(name: &str) -> Expr {
    Expr::var(name, Type::int(32, 1))
}

fn buffer(name: &str, elem: Type) -> Arg {
    Arg::Buffer {
        name: name.to_string(),
        elem,
    }
}

fn scalar(name: &str, ty: Type) -> Arg {
    Arg::Scalar {
        name: name.to_string(),
        ty,
    }
}

fn aligned(bytes: i64) -> ModulusRemainder {
    ModulusRemainder::new(bytes, 0)
}

/// `base + x * step`
fn tile_base(x: &str, step: i64) -> Expr {
    Expr::binary(BinOp::Mul, i32_var(x), Expr::i32(step))
}

fn add_i16() -> LoweredFunc {
    let elem = Type::int(16, 1);
    let lanes = 64;
    let load = |buf: &str| {
        Expr::dense_load(elem, buf, tile_base("x", lanes.into()), lanes, aligned(64))
    };
    let body = Stmt::serial_for(
        "x",
        Expr::i32(0),
        Expr::binary(BinOp::Div, i32_var("n"), Expr::i32(lanes.into())),
        Stmt::dense_store(
            "out",
            tile_base("x", lanes.into()),
            Expr::binary(BinOp::Add, load("a"), load("b")),
            aligned(64),
        ),
    );
    LoweredFunc {
        name: "add_i16".to_string(),
        args: vec![
            buffer("a", elem),
            buffer("b", elem),
            buffer("out", elem),
            scalar("n", Type::int(32, 1)),
        ],
        body,
        linkage: Linkage::External,
    }
}

fn clamp() -> LoweredFunc {
    let elem = Type::int(16, 1);
    let lanes = 32;
    let value = Expr::dense_load(elem, "in", tile_base("x", lanes.into()), lanes, aligned(64));
    let clamped = Expr::binary(
        BinOp::Min,
        Expr::binary(BinOp::Max, value, Expr::broadcast(Expr::var("lo", elem), lanes)),
        Expr::broadcast(Expr::var("hi", elem), lanes),
    );
    let body = Stmt::block(vec![
        Stmt::Assert {
            condition: Expr::binary(BinOp::Le, Expr::var("lo", elem), Expr::var("hi", elem)),
            message: "clamp bounds are inverted".to_string(),
        },
        Stmt::serial_for(
            "x",
            Expr::i32(0),
            Expr::binary(BinOp::Div, i32_var("n"), Expr::i32(lanes.into())),
            Stmt::dense_store("out", tile_base("x", lanes.into()), clamped, aligned(64)),
        ),
    ]);
    LoweredFunc {
        name: "clamp".to_string(),
        args: vec![
            buffer("in", elem),
            buffer("out", elem),
            scalar("lo", elem),
            scalar("hi", elem),
            scalar("n", Type::int(32, 1)),
        ],
        body,
        linkage: Linkage::External,
    }
}

fn widen_mul_add() -> LoweredFunc {
    let narrow = Type::int(16, 1);
    let wide = Type::int(32, 1);
    let lanes = 32;
    let widened = |buf: &str| {
        Expr::cast(
            wide.with_lanes(lanes),
            Expr::dense_load(narrow, buf, tile_base("x", lanes.into()), lanes, aligned(64)),
        )
    };
    let acc = Expr::dense_load(wide, "acc", tile_base("x", lanes.into()), lanes, aligned(64));
    let sum = Expr::binary(
        BinOp::Add,
        acc,
        Expr::binary(BinOp::Mul, widened("a"), widened("b")),
    );
    let body = Stmt::serial_for(
        "x",
        Expr::i32(0),
        Expr::binary(BinOp::Div, i32_var("n"), Expr::i32(lanes.into())),
        Stmt::dense_store("acc", tile_base("x", lanes.into()), sum, aligned(64)),
    );
    LoweredFunc {
        name: "widen_mul_add".to_string(),
        args: vec![
            buffer("a", narrow),
            buffer("b", narrow),
            buffer("acc", wide),
            scalar("n", Type::int(32, 1)),
        ],
        body,
        linkage: Linkage::External,
    }
}

fn deinterleave() -> LoweredFunc {
    let elem = Type::uint(8, 1);
    let lanes = 64;
    let pair = Expr::dense_load(
        elem,
        "in",
        tile_base("x", 2 * i64::from(lanes)),
        2 * lanes,
        aligned(64),
    );
    let evens = Expr::Shuffle {
        vectors: vec![pair],
        indices: (0..lanes as i32).map(|i| 2 * i).collect(),
    };
    let body = Stmt::serial_for(
        "x",
        Expr::i32(0),
        Expr::binary(BinOp::Div, i32_var("n"), Expr::i32(lanes.into())),
        Stmt::dense_store("out", tile_base("x", lanes.into()), evens, aligned(64)),
    );
    LoweredFunc {
        name: "deinterleave".to_string(),
        args: vec![
            buffer("in", elem),
            buffer("out", elem),
            scalar("n", Type::int(32, 1)),
        ],
        body,
        linkage: Linkage::Internal,
    }
}

fn dma_scale() -> LoweredFunc {
    let elem = Type::int(16, 1);
    let tile = 1024;
    let lanes = 32;
    let tile_offset = tile_base("t", tile);
    let copy = |dst: &str, dst_offset: Expr, src: &str, src_offset: Expr| {
        Stmt::Evaluate(Expr::call(
            Type::int(32, 1),
            Callee::DmaCopy1d,
            vec![
                i32_var(dst),
                dst_offset,
                i32_var(src),
                src_offset,
                Expr::i32(tile),
                Expr::i32(elem.bytes().into()),
            ],
        ))
    };
    let wait = || {
        Stmt::Evaluate(Expr::call(
            Type::int(32, 1),
            Callee::DmaWait,
            vec![Expr::i32(0)],
        ))
    };
    let scaled = Expr::binary(
        BinOp::Mul,
        Expr::dense_load(elem, "scratch", tile_base("x", lanes.into()), lanes, aligned(64)),
        Expr::broadcast(Expr::var("scale", elem), lanes),
    );
    let per_tile = Stmt::Allocate {
        name: "scratch".to_string(),
        ty: elem,
        memory: MemoryType::Scratchpad,
        extents: vec![Expr::i32(tile)],
        condition: Expr::bool(true),
        new_expr: None,
        free_function: None,
        body: Box::new(Stmt::block(vec![
            copy("scratch", Expr::i32(0), "in", tile_offset.clone()),
            wait(),
            Stmt::serial_for(
                "x",
                Expr::i32(0),
                Expr::i32(tile / i64::from(lanes)),
                Stmt::dense_store("scratch", tile_base("x", lanes.into()), scaled, aligned(64)),
            ),
            copy("out", tile_offset, "scratch", Expr::i32(0)),
            wait(),
            Stmt::Free {
                name: "scratch".to_string(),
            },
        ])),
    };
    let body = Stmt::block(vec![
        Stmt::Assert {
            condition: Expr::binary(
                BinOp::Eq,
                Expr::binary(BinOp::Mod, i32_var("n"), Expr::i32(tile)),
                Expr::i32(0),
            ),
            message: "n must be a whole number of tiles".to_string(),
        },
        Stmt::For {
            var: "t".to_string(),
            min: Expr::i32(0),
            extent: Expr::binary(BinOp::Div, i32_var("n"), Expr::i32(tile)),
            kind: ForKind::Parallel,
            body: Box::new(per_tile),
        },
    ]);
    LoweredFunc {
        name: "dma_scale".to_string(),
        args: vec![
            buffer("in", elem),
            buffer("out", elem),
            scalar("scale", elem),
            scalar("n", Type::int(32, 1)),
        ],
        body,
        linkage: Linkage::External,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{CodeGen, CodeGenOptions};

    /// The generated definition of `kernel`, without the prelude.
    fn emit(kernel: DemoKernel) -> String {
        let f = kernel.function();
        let out = f.emit_string(&CodeGenOptions::default()).unwrap();
        let start = out.find(&format!(" {}(", f.name)).unwrap();
        let line_start = out[..start].rfind('\n').map_or(0, |i| i + 1);
        out[line_start..].to_string()
    }

    #[test]
    fn test_every_demo_lowers() {
        for kernel in DemoKernel::iter() {
            let out = emit(kernel);
            let f = kernel.function();
            assert!(
                out.contains(&format!("int {}(", f.name)),
                "{:?} is missing its definition",
                kernel
            );
        }
    }

    #[test]
    fn test_add_uses_native_adds_only() {
        let out = emit(DemoKernel::AddI16);
        assert_eq!(out.matches("IVP_ADDNX16(").count(), 2);
        assert!(!out.contains("xt_lanewise"));
    }

    #[test]
    fn test_deinterleave_selects_even_lanes() {
        let out = emit(DemoKernel::Deinterleave);
        assert!(out.contains("EXTRACT_1_OF_2_OFF_0"));
        assert!(out.contains("static int deinterleave("));
    }

    #[test]
    fn test_dma_scale_releases_scratchpad_in_loop() {
        let out = emit(DemoKernel::DmaScale);
        assert!(out.contains("#pragma omp parallel for"));
        assert!(out.contains("xt_scratchpad_malloc"));
        assert!(out.contains("xt_dma_copy_1d(_ucon, "));
    }

    #[test]
    fn test_module_of_all_demos() {
        let module = all_demos();
        let out = module.emit_string(&CodeGenOptions::default()).unwrap();
        let positions = module
            .functions
            .iter()
            .map(|f| out.find(&format!(" {}(", f.name)).unwrap())
            .collect::<Vec<_>>();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
