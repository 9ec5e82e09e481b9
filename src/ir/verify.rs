//! Structural and type soundness checks over the IR.
//!
//! Temporaries in this IR never cross block boundaries (values that live longer go through
//! a stack slot), so a temporary must be defined earlier in the block that uses it.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use super::{
    BasicBlock, CastOp, FnIndex, Function, InstKind, Instruction, Module, Operand, Terminator,
    Type, ValueId,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("block {block:?} of function {function:?} has no terminator")]
    MissingTerminator { function: String, block: String },
    #[error("block {block:?} of function {function:?} branches to block {target}, which is not part of the function body")]
    DanglingBranch {
        function: String,
        block: String,
        target: usize,
    },
    #[error("the entry block of function {function:?} has predecessors")]
    EntryHasPredecessors { function: String },
    #[error("invalid operand in block {block:?} of function {function:?}: {message}")]
    InvalidOperand {
        function: String,
        block: String,
        message: String,
    },
    #[error("type mismatch in block {block:?} of function {function:?}: {message}")]
    TypeMismatch {
        function: String,
        block: String,
        message: String,
    },
    #[error("call to {callee:?} in function {function:?} passes {found} arguments, needs {needs}")]
    CallArity {
        function: String,
        callee: String,
        found: usize,
        needs: usize,
    },
    #[error("local {local} of function {function:?} has invalid type {ty}")]
    InvalidLocal {
        function: String,
        local: usize,
        ty: String,
    },
    #[error("global {name:?} is declared as {ty} but initialized with a {init}")]
    GlobalInitializer {
        name: String,
        ty: String,
        init: String,
    },
    #[error("symbol {name:?} is defined more than once")]
    DuplicateSymbol { name: String },
}

/// Verifies a whole module: every function plus symbol uniqueness.
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    let mut names = HashSet::new();

    for global in &module.globals {
        if !names.insert(global.name.as_str()) {
            return Err(VerifyError::DuplicateSymbol {
                name: global.name.clone(),
            });
        }
        if global.init.ty() != global.ty {
            return Err(VerifyError::GlobalInitializer {
                name: global.name.clone(),
                ty: global.ty.to_string(),
                init: global.init.ty().to_string(),
            });
        }
    }

    for (idx, func) in module.iter_functions() {
        if !names.insert(func.name.as_str()) || module.get_function(&func.name) != Some(idx) {
            return Err(VerifyError::DuplicateSymbol {
                name: func.name.clone(),
            });
        }
        verify_function(module, idx)?;
    }

    debug!("module {:?} verified", module.name);
    Ok(())
}

/// Verifies a single function. Declarations without a body always pass.
pub fn verify_function(module: &Module, idx: FnIndex) -> Result<(), VerifyError> {
    let func = module.function(idx);

    if !func.has_body() {
        return Ok(());
    }

    for (local_idx, local) in func.locals.iter().enumerate() {
        if !local.ty.is_arithmetic() {
            return Err(VerifyError::InvalidLocal {
                function: func.name.clone(),
                local: local_idx,
                ty: local.ty.to_string(),
            });
        }
    }

    if let Some(entry) = func.entry() {
        if !func.predecessors(entry).is_empty() {
            return Err(VerifyError::EntryHasPredecessors {
                function: func.name.clone(),
            });
        }
    }

    let value_types = func.value_types();
    let mut seen_results = HashSet::new();

    for block_idx in &func.layout {
        let block = &func.blocks[*block_idx];
        let checker = BlockChecker {
            module,
            func,
            block,
            value_types: &value_types,
        };
        checker.check(&mut seen_results)?;
    }

    Ok(())
}

struct BlockChecker<'a> {
    module: &'a Module,
    func: &'a Function,
    block: &'a BasicBlock,
    value_types: &'a HashMap<ValueId, Type>,
}

impl BlockChecker<'_> {
    fn check(&self, seen_results: &mut HashSet<ValueId>) -> Result<(), VerifyError> {
        let mut defined = HashSet::new();

        for inst in &self.block.instructions {
            self.check_instruction(inst, &defined)?;
            if let Some(id) = inst.result {
                if !seen_results.insert(id) {
                    return Err(self.invalid(format!("%t{id} is defined more than once")));
                }
                defined.insert(id);
            }
        }

        let Some(terminator) = &self.block.terminator else {
            return Err(VerifyError::MissingTerminator {
                function: self.func.name.clone(),
                block: self.block.name.clone(),
            });
        };

        for target in terminator.successors() {
            if !self.func.is_attached(target) {
                return Err(VerifyError::DanglingBranch {
                    function: self.func.name.clone(),
                    block: self.block.name.clone(),
                    target,
                });
            }
        }

        let ret = self.func.signature.ret.as_ref();
        match terminator {
            Terminator::CondBr { cond, .. } => {
                let ty = self.operand_type(cond, &defined)?;
                if ty != Type::Bool {
                    return Err(self.mismatch(format!("branch condition has type {ty}, needs i1")));
                }
            }
            Terminator::Return(Some(value)) => {
                let ty = self.operand_type(value, &defined)?;
                if ty != *ret || *ret == Type::Void {
                    return Err(self.mismatch(format!("returns {ty}, function returns {ret}")));
                }
            }
            Terminator::Return(None) => {
                if *ret != Type::Void {
                    return Err(self.mismatch(format!("returns void, function returns {ret}")));
                }
            }
            Terminator::Br { .. } | Terminator::Unreachable => {}
        }

        Ok(())
    }

    fn check_instruction(
        &self,
        inst: &Instruction,
        defined: &HashSet<ValueId>,
    ) -> Result<(), VerifyError> {
        match &inst.kind {
            InstKind::Load { ptr } => {
                let pointee = self.pointee(ptr, defined)?;
                if pointee != inst.ty {
                    return Err(
                        self.mismatch(format!("load of {} through a {pointee} slot", inst.ty))
                    );
                }
            }
            InstKind::Store { ptr, value } => {
                let pointee = self.pointee(ptr, defined)?;
                let ty = self.operand_type(value, defined)?;
                if pointee != ty {
                    return Err(self.mismatch(format!("store of {ty} into a {pointee} slot")));
                }
                self.expect_no_result(inst)?;
            }
            InstKind::Cast { op, value } => {
                let from = self.operand_type(value, defined)?;
                if !cast_is_valid(*op, &from, &inst.ty) {
                    return Err(self.mismatch(format!("invalid cast {op} {from} to {}", inst.ty)));
                }
            }
            InstKind::FCmp { lhs, rhs, .. } => {
                let lhs = self.operand_type(lhs, defined)?;
                let rhs = self.operand_type(rhs, defined)?;
                if lhs != Type::Float32 || rhs != Type::Float32 || inst.ty != Type::Bool {
                    return Err(self.mismatch(format!(
                        "fcmp needs float operands and an i1 result, found {lhs}, {rhs} -> {}",
                        inst.ty
                    )));
                }
            }
            InstKind::Call { func, args } => {
                let Some(callee) = self.module.functions.get(*func) else {
                    return Err(self.invalid("call to a function that doesn't exist".to_string()));
                };

                if args.len() != callee.signature.params.len() {
                    return Err(VerifyError::CallArity {
                        function: self.func.name.clone(),
                        callee: callee.name.clone(),
                        found: args.len(),
                        needs: callee.signature.params.len(),
                    });
                }

                for (i, (arg, param)) in args.iter().zip(&callee.signature.params).enumerate() {
                    let ty = self.operand_type(arg, defined)?;
                    if ty != *param {
                        return Err(self.mismatch(format!(
                            "argument {i} of call to {:?} is {ty}, needs {param}",
                            callee.name
                        )));
                    }
                }

                if *callee.signature.ret != inst.ty {
                    return Err(self.mismatch(format!(
                        "call to {:?} produces {}, annotated as {}",
                        callee.name, callee.signature.ret, inst.ty
                    )));
                }
                if inst.ty == Type::Void {
                    self.expect_no_result(inst)?;
                }
            }
        }

        if inst.ty != Type::Void && inst.result.is_none() {
            return Err(self.invalid(format!("instruction producing {} has no result", inst.ty)));
        }

        Ok(())
    }

    fn operand_type(
        &self,
        operand: &Operand,
        defined: &HashSet<ValueId>,
    ) -> Result<Type, VerifyError> {
        if let Operand::Temp(id) = operand {
            if !defined.contains(id) {
                return Err(self.invalid(format!("%t{id} is used before being defined")));
            }
        }

        self.func
            .operand_type(self.module, self.value_types, operand)
            .ok_or_else(|| self.invalid(format!("{operand:?} doesn't exist")))
    }

    fn pointee(&self, operand: &Operand, defined: &HashSet<ValueId>) -> Result<Type, VerifyError> {
        match self.operand_type(operand, defined)? {
            Type::Ptr(inner) => Ok(*inner),
            other => Err(self.mismatch(format!("expected an address, found {other}"))),
        }
    }

    fn expect_no_result(&self, inst: &Instruction) -> Result<(), VerifyError> {
        match inst.result {
            Some(id) => Err(self.invalid(format!("%t{id} names an instruction without a value"))),
            None => Ok(()),
        }
    }

    fn invalid(&self, message: String) -> VerifyError {
        VerifyError::InvalidOperand {
            function: self.func.name.clone(),
            block: self.block.name.clone(),
            message,
        }
    }

    fn mismatch(&self, message: String) -> VerifyError {
        VerifyError::TypeMismatch {
            function: self.func.name.clone(),
            block: self.block.name.clone(),
            message,
        }
    }
}

fn cast_is_valid(op: CastOp, from: &Type, to: &Type) -> bool {
    fn int_width(ty: &Type) -> Option<u32> {
        match ty {
            Type::Bool => Some(1),
            Type::Char8 => Some(8),
            Type::Int32 => Some(32),
            _ => None,
        }
    }

    match op {
        CastOp::SiToFp | CastOp::UiToFp => int_width(from).is_some() && to.is_float(),
        CastOp::FpToSi | CastOp::FpToUi => from.is_float() && int_width(to).is_some(),
        CastOp::ZExt => matches!((int_width(from), int_width(to)), (Some(a), Some(b)) if a < b),
        CastOp::Trunc => matches!((int_width(from), int_width(to)), (Some(a), Some(b)) if a > b),
    }
}
