//! Textual form of the IR, loosely following LLVM assembly.

use std::{collections::HashMap, fmt};

use itertools::Itertools;

use super::{
    CastOp, ConstValue, FCmpPred, Function, InstKind, Instruction, Module, Operand, Terminator,
    Type, ValueId,
};

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "i1"),
            Type::Char8 => write!(f, "i8"),
            Type::Int32 => write!(f, "i32"),
            Type::Float32 => write!(f, "float"),
            Type::Ptr(_) => write!(f, "ptr"),
            Type::Function(sig) => {
                write!(f, "{} ({})", sig.ret, sig.params.iter().join(", "))
            }
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bool(x) => write!(f, "{x}"),
            ConstValue::Char(x) => write!(f, "{x}"),
            ConstValue::I32(x) => write!(f, "{x}"),
            ConstValue::F32(x) => write!(f, "{x:?}"),
        }
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CastOp::SiToFp => "sitofp",
            CastOp::UiToFp => "uitofp",
            CastOp::FpToSi => "fptosi",
            CastOp::FpToUi => "fptoui",
            CastOp::ZExt => "zext",
            CastOp::Trunc => "trunc",
        })
    }
}

impl fmt::Display for FCmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FCmpPred::One => write!(f, "one"),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;

        for global in &self.globals {
            writeln!(f)?;
            writeln!(f, "@{} = global {} {}", global.name, global.ty, global.init)?;
        }

        for (_, func) in self.iter_functions() {
            writeln!(f)?;
            FunctionPrinter {
                module: self,
                func,
                value_types: func.value_types(),
            }
            .write(f)?;
        }

        Ok(())
    }
}

struct FunctionPrinter<'a> {
    module: &'a Module,
    func: &'a Function,
    value_types: HashMap<ValueId, Type>,
}

impl FunctionPrinter<'_> {
    fn write(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.func;
        let ret = &func.signature.ret;

        if !func.has_body() {
            return writeln!(
                f,
                "declare {} @{}({})",
                ret,
                func.name,
                func.signature.params.iter().join(", ")
            );
        }

        let params = func
            .signature
            .params
            .iter()
            .enumerate()
            .map(|(i, ty)| format!("{ty} %a{i}"))
            .join(", ");
        writeln!(f, "define {} @{}({}) {{", ret, func.name, params)?;

        for (i, block_idx) in func.layout.iter().enumerate() {
            let block = &func.blocks[*block_idx];
            writeln!(f, "{}:", self.label(*block_idx))?;

            if i == 0 {
                for (local_idx, local) in func.locals.iter().enumerate() {
                    write!(f, "  %l{} = alloca {}", local_idx, local.ty)?;
                    match &local.debug_name {
                        Some(name) => writeln!(f, " ; {name}")?,
                        None => writeln!(f)?,
                    }
                }
            }

            for inst in &block.instructions {
                write!(f, "  ")?;
                self.write_instruction(f, inst)?;
                writeln!(f)?;
            }

            write!(f, "  ")?;
            match &block.terminator {
                Some(terminator) => self.write_terminator(f, terminator)?,
                None => write!(f, "; missing terminator")?,
            }
            writeln!(f)?;
        }

        writeln!(f, "}}")
    }

    fn label(&self, block: usize) -> String {
        format!("{}.{}", self.func.blocks[block].name, block)
    }

    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Const(value) => value.to_string(),
            Operand::Arg(idx) => format!("%a{idx}"),
            Operand::Temp(id) => format!("%t{id}"),
            Operand::Local(idx) => format!("%l{idx}"),
            Operand::Global(idx) => match self.module.globals.get(*idx) {
                Some(global) => format!("@{}", global.name),
                None => format!("@<invalid global {idx}>"),
            },
        }
    }

    fn typed_operand(&self, operand: &Operand) -> String {
        match self
            .func
            .operand_type(self.module, &self.value_types, operand)
        {
            Some(ty) => format!("{} {}", ty, self.operand(operand)),
            None => format!("<unknown> {}", self.operand(operand)),
        }
    }

    fn write_instruction(&self, f: &mut fmt::Formatter<'_>, inst: &Instruction) -> fmt::Result {
        if let Some(id) = inst.result {
            write!(f, "%t{id} = ")?;
        }

        match &inst.kind {
            InstKind::Load { ptr } => write!(f, "load {}, {}", inst.ty, self.typed_operand(ptr)),
            InstKind::Store { ptr, value } => write!(
                f,
                "store {}, {}",
                self.typed_operand(value),
                self.typed_operand(ptr)
            ),
            InstKind::Cast { op, value } => {
                write!(f, "{} {} to {}", op, self.typed_operand(value), inst.ty)
            }
            InstKind::FCmp { pred, lhs, rhs } => write!(
                f,
                "fcmp {} {}, {}",
                pred,
                self.typed_operand(lhs),
                self.operand(rhs)
            ),
            InstKind::Call { func, args } => {
                let callee = self
                    .module
                    .functions
                    .get(*func)
                    .map(|x| x.name.as_str())
                    .unwrap_or("<invalid function>");
                write!(
                    f,
                    "call {} @{}({})",
                    inst.ty,
                    callee,
                    args.iter().map(|x| self.typed_operand(x)).join(", ")
                )
            }
        }
    }

    fn write_terminator(&self, f: &mut fmt::Formatter<'_>, terminator: &Terminator) -> fmt::Result {
        match terminator {
            Terminator::Br { target } => write!(f, "br label %{}", self.label(*target)),
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "br {}, label %{}, label %{}",
                self.typed_operand(cond),
                self.label(*then_block),
                self.label(*else_block)
            ),
            Terminator::Return(Some(value)) => write!(f, "ret {}", self.typed_operand(value)),
            Terminator::Return(None) => write!(f, "ret void"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}
