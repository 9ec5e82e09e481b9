pub mod ast;
pub mod check;
pub mod codegen;
pub mod compile_unit_info;
pub mod driver;
pub mod ir;
