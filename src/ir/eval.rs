//! A small interpreter over verified IR, used to observe the behavior of generated code
//! without going through a target backend.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, trace};

use super::{
    CastOp, ConstValue, FCmpPred, FnIndex, InstKind, Module, Operand, Terminator, Type, ValueId,
};

/// Maximum nesting of calls before the evaluation is aborted.
pub const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeValue {
    Bool(bool),
    Char(u8),
    Int(i32),
    Float(f32),
}

impl From<ConstValue> for RuntimeValue {
    fn from(value: ConstValue) -> Self {
        match value {
            ConstValue::Bool(x) => RuntimeValue::Bool(x),
            ConstValue::Char(x) => RuntimeValue::Char(x),
            ConstValue::I32(x) => RuntimeValue::Int(x),
            ConstValue::F32(x) => RuntimeValue::Float(x),
        }
    }
}

impl RuntimeValue {
    fn as_int_bits(&self) -> Option<i64> {
        match self {
            RuntimeValue::Bool(x) => Some(i64::from(*x)),
            RuntimeValue::Char(x) => Some(i64::from(*x)),
            RuntimeValue::Int(x) => Some(i64::from(*x)),
            RuntimeValue::Float(_) => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("function {name:?} not found")]
    UnknownFunction { name: String },
    #[error("function {name:?} has no body")]
    NoBody { name: String },
    #[error("function {name:?} takes {needs} arguments, {found} given")]
    ArgumentCount {
        name: String,
        found: usize,
        needs: usize,
    },
    #[error("read of uninitialized slot {local} in function {function:?}")]
    UninitializedRead { function: String, local: usize },
    #[error("reached unreachable code in function {function:?}")]
    Unreachable { function: String },
    #[error("block {block} of function {function:?} has no terminator")]
    MissingTerminator { function: String, block: usize },
    #[error("call depth exceeded {limit}")]
    StackOverflow { limit: usize },
    #[error("trap in function {function:?}: {message}")]
    Trap { function: String, message: String },
}

/// Runs `name` in a fresh interpreter and returns its result.
pub fn run_function(
    module: &Module,
    name: &str,
    args: &[RuntimeValue],
) -> Result<Option<RuntimeValue>, EvalError> {
    Interpreter::new(module).run_function(name, args)
}

#[derive(Debug)]
pub struct Interpreter<'m> {
    module: &'m Module,
    globals: Vec<RuntimeValue>,
    depth: usize,
}

#[derive(Debug)]
struct Frame {
    args: Vec<RuntimeValue>,
    locals: Vec<Option<RuntimeValue>>,
    temps: HashMap<ValueId, RuntimeValue>,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            globals: module.globals.iter().map(|x| x.init.into()).collect(),
            depth: 0,
        }
    }

    /// Executes `name` as an entry function.
    pub fn run_function(
        &mut self,
        name: &str,
        args: &[RuntimeValue],
    ) -> Result<Option<RuntimeValue>, EvalError> {
        let idx = self
            .module
            .get_function(name)
            .ok_or_else(|| EvalError::UnknownFunction {
                name: name.to_string(),
            })?;
        self.call(idx, args.to_vec())
    }

    /// The current value of a global variable.
    pub fn global(&self, name: &str) -> Option<RuntimeValue> {
        let idx = *self.module.global_names.get(name)?;
        self.globals.get(idx).copied()
    }

    fn call(
        &mut self,
        idx: FnIndex,
        args: Vec<RuntimeValue>,
    ) -> Result<Option<RuntimeValue>, EvalError> {
        let module = self.module;
        let func = module.function(idx);

        if !func.has_body() {
            return Err(EvalError::NoBody {
                name: func.name.clone(),
            });
        }
        if args.len() != func.signature.params.len() {
            return Err(EvalError::ArgumentCount {
                name: func.name.clone(),
                found: args.len(),
                needs: func.signature.params.len(),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::StackOverflow {
                limit: MAX_CALL_DEPTH,
            });
        }

        debug!("calling {}", func.name);
        self.depth += 1;
        let mut frame = Frame {
            args,
            locals: vec![None; func.locals.len()],
            temps: HashMap::new(),
        };
        let result = self.run_frame(idx, &mut frame);
        self.depth -= 1;
        result
    }

    fn run_frame(
        &mut self,
        idx: FnIndex,
        frame: &mut Frame,
    ) -> Result<Option<RuntimeValue>, EvalError> {
        let module = self.module;
        let func = module.function(idx);
        let trap = |message: String| EvalError::Trap {
            function: func.name.clone(),
            message,
        };

        let mut current = func
            .entry()
            .ok_or_else(|| EvalError::NoBody {
                name: func.name.clone(),
            })?;

        loop {
            let block = &func.blocks[current];
            trace!("entering block {}.{}", block.name, current);

            for inst in &block.instructions {
                let result = match &inst.kind {
                    InstKind::Load { ptr } => Some(self.load(func.name.as_str(), frame, ptr)?),
                    InstKind::Store { ptr, value } => {
                        let value = self.operand(frame, value).map_err(&trap)?;
                        self.store(frame, ptr, value).map_err(&trap)?;
                        None
                    }
                    InstKind::Cast { op, value } => {
                        let value = self.operand(frame, value).map_err(&trap)?;
                        Some(cast(*op, value, &inst.ty).map_err(&trap)?)
                    }
                    InstKind::FCmp { pred, lhs, rhs } => {
                        let lhs = self.operand(frame, lhs).map_err(&trap)?;
                        let rhs = self.operand(frame, rhs).map_err(&trap)?;
                        match (pred, lhs, rhs) {
                            (FCmpPred::One, RuntimeValue::Float(a), RuntimeValue::Float(b)) => {
                                Some(RuntimeValue::Bool(!a.is_nan() && !b.is_nan() && a != b))
                            }
                            _ => return Err(trap("fcmp on non float operands".to_string())),
                        }
                    }
                    InstKind::Call { func: callee, args } => {
                        let args = args
                            .iter()
                            .map(|x| self.operand(frame, x))
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(&trap)?;
                        self.call(*callee, args)?
                    }
                };

                if let (Some(id), Some(value)) = (inst.result, result) {
                    frame.temps.insert(id, value);
                }
            }

            match &block.terminator {
                Some(Terminator::Br { target }) => current = *target,
                Some(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                }) => match self.operand(frame, cond).map_err(&trap)? {
                    RuntimeValue::Bool(true) => current = *then_block,
                    RuntimeValue::Bool(false) => current = *else_block,
                    other => return Err(trap(format!("branch on non boolean {other:?}"))),
                },
                Some(Terminator::Return(value)) => {
                    return value
                        .as_ref()
                        .map(|x| self.operand(frame, x))
                        .transpose()
                        .map_err(&trap);
                }
                Some(Terminator::Unreachable) => {
                    return Err(EvalError::Unreachable {
                        function: func.name.clone(),
                    });
                }
                None => {
                    return Err(EvalError::MissingTerminator {
                        function: func.name.clone(),
                        block: current,
                    });
                }
            }
        }
    }

    fn operand(&self, frame: &Frame, operand: &Operand) -> Result<RuntimeValue, String> {
        match operand {
            Operand::Const(value) => Ok((*value).into()),
            Operand::Arg(idx) => frame
                .args
                .get(*idx)
                .copied()
                .ok_or_else(|| format!("argument {idx} out of range")),
            Operand::Temp(id) => frame
                .temps
                .get(id)
                .copied()
                .ok_or_else(|| format!("%t{id} is not defined")),
            Operand::Local(_) | Operand::Global(_) => {
                Err("an address can't be used as a value".to_string())
            }
        }
    }

    fn load(
        &self,
        function: &str,
        frame: &Frame,
        ptr: &Operand,
    ) -> Result<RuntimeValue, EvalError> {
        match ptr {
            Operand::Local(idx) => frame.locals.get(*idx).copied().flatten().ok_or_else(|| {
                EvalError::UninitializedRead {
                    function: function.to_string(),
                    local: *idx,
                }
            }),
            Operand::Global(idx) => {
                self.globals
                    .get(*idx)
                    .copied()
                    .ok_or_else(|| EvalError::Trap {
                        function: function.to_string(),
                        message: format!("global {idx} out of range"),
                    })
            }
            other => Err(EvalError::Trap {
                function: function.to_string(),
                message: format!("load through non address {other:?}"),
            }),
        }
    }

    fn store(
        &mut self,
        frame: &mut Frame,
        ptr: &Operand,
        value: RuntimeValue,
    ) -> Result<(), String> {
        let slot = match ptr {
            Operand::Local(idx) => frame.locals.get_mut(*idx).map(|x| {
                *x = Some(value);
            }),
            Operand::Global(idx) => self.globals.get_mut(*idx).map(|x| {
                *x = value;
            }),
            other => return Err(format!("store through non address {other:?}")),
        };
        slot.ok_or_else(|| format!("store to {ptr:?} out of range"))
    }
}

fn cast(op: CastOp, value: RuntimeValue, to: &Type) -> Result<RuntimeValue, String> {
    let from_int = |bits: i64| -> Result<RuntimeValue, String> {
        match to {
            Type::Bool => Ok(RuntimeValue::Bool(bits & 1 != 0)),
            Type::Char8 => Ok(RuntimeValue::Char(bits as u8)),
            Type::Int32 => Ok(RuntimeValue::Int(bits as i32)),
            other => Err(format!("{op} can't produce {other}")),
        }
    };

    match (op, value) {
        (CastOp::SiToFp, RuntimeValue::Char(x)) => Ok(RuntimeValue::Float(f32::from(x as i8))),
        (CastOp::SiToFp, RuntimeValue::Int(x)) => Ok(RuntimeValue::Float(x as f32)),
        (CastOp::SiToFp | CastOp::UiToFp, RuntimeValue::Bool(x)) => {
            Ok(RuntimeValue::Float(if x { 1.0 } else { 0.0 }))
        }
        (CastOp::UiToFp, RuntimeValue::Char(x)) => Ok(RuntimeValue::Float(f32::from(x))),
        (CastOp::UiToFp, RuntimeValue::Int(x)) => Ok(RuntimeValue::Float(x as u32 as f32)),
        (CastOp::FpToSi, RuntimeValue::Float(x)) => from_int(x as i64),
        (CastOp::FpToUi, RuntimeValue::Float(x)) => from_int(x as u64 as i64),
        (CastOp::ZExt | CastOp::Trunc, value) => match value.as_int_bits() {
            Some(bits) => from_int(bits),
            None => Err(format!("{op} on a float")),
        },
        (op, value) => Err(format!("invalid cast {op} of {value:?}")),
    }
}
