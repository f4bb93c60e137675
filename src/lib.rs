pub mod codegen;
pub mod common;
pub mod demos;
pub mod ir;
pub mod pprint;
pub mod target;
pub mod utils;
