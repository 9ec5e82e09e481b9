use std::collections::HashMap;

use typed_generational_arena::{SmallSlab, SmallSlabIndex};

mod display;
pub mod eval;
pub mod lowering;
pub mod verify;

pub type LocalIndex = usize;
pub type BlockIndex = usize;
pub type GlobalIndex = usize;
/// Names the result of an instruction, unique within its function.
pub type ValueId = usize;

pub type FnIndex = SmallSlabIndex<Function>;
pub type Functions = SmallSlab<Function>;

/// Holds all the IR of a translation unit.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    /// The functions defined or declared in this module.
    pub functions: Functions,
    /// The flat function registry, maps a function name to its entry.
    pub function_names: HashMap<String, FnIndex>,
    /// File scope variables, in declaration order.
    pub globals: Vec<Global>,
    pub global_names: HashMap<String, GlobalIndex>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Functions::new(),
            function_names: HashMap::new(),
            globals: Vec::new(),
            global_names: HashMap::new(),
        }
    }

    pub fn get_function(&self, name: &str) -> Option<FnIndex> {
        self.function_names.get(name).copied()
    }

    pub fn function(&self, idx: FnIndex) -> &Function {
        &self.functions[idx]
    }

    pub fn function_mut(&mut self, idx: FnIndex) -> &mut Function {
        &mut self.functions[idx]
    }

    /// Adds a function without a body and registers its name.
    pub fn add_function(&mut self, name: &str, signature: FunctionType) -> FnIndex {
        let idx = self.functions.insert(Function::new(name, signature));
        self.function_names.insert(name.to_string(), idx);
        idx
    }

    pub fn add_global(&mut self, global: Global) -> GlobalIndex {
        let idx = self.globals.len();
        self.global_names.insert(global.name.clone(), idx);
        self.globals.push(global);
        idx
    }

    /// Functions in the order they were first declared.
    pub fn iter_functions(&self) -> impl Iterator<Item = (FnIndex, &Function)> {
        self.functions.iter()
    }
}

/// A file scope variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub init: ConstValue,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub signature: FunctionType,
    /// Parameter names of the definition, empty until the body is lowered.
    pub param_names: Vec<String>,
    /// Stack slots.
    pub locals: Vec<Local>,
    /// Every block created for this function, attached or not.
    pub blocks: Vec<BasicBlock>,
    /// The blocks that are part of the function body, in order. The first one is the entry.
    pub layout: Vec<BlockIndex>,
    pub next_value: ValueId,
}

impl Function {
    pub fn new(name: &str, signature: FunctionType) -> Self {
        Self {
            name: name.to_string(),
            signature,
            param_names: Vec::new(),
            locals: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
            next_value: 0,
        }
    }

    pub fn has_body(&self) -> bool {
        !self.layout.is_empty()
    }

    pub fn entry(&self) -> Option<BlockIndex> {
        self.layout.first().copied()
    }

    pub fn is_attached(&self, block: BlockIndex) -> bool {
        self.layout.contains(&block)
    }

    pub fn fn_type(&self) -> Type {
        Type::Function(self.signature.clone())
    }

    /// Attached blocks whose terminator can jump to `block`.
    pub fn predecessors(&self, block: BlockIndex) -> Vec<BlockIndex> {
        self.layout
            .iter()
            .copied()
            .filter(|x| {
                self.blocks[*x]
                    .terminator
                    .as_ref()
                    .is_some_and(|t| t.successors().contains(&block))
            })
            .collect()
    }

    /// The result types of every instruction in the function.
    pub fn value_types(&self) -> HashMap<ValueId, Type> {
        self.blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .filter_map(|i| i.result.map(|id| (id, i.ty.clone())))
            .collect()
    }

    /// Gets the type of an operand used inside this function, None if it refers to something
    /// that doesn't exist.
    pub fn operand_type(
        &self,
        module: &Module,
        value_types: &HashMap<ValueId, Type>,
        operand: &Operand,
    ) -> Option<Type> {
        match operand {
            Operand::Const(value) => Some(value.ty()),
            Operand::Arg(idx) => self.signature.params.get(*idx).cloned(),
            Operand::Temp(id) => value_types.get(id).cloned(),
            Operand::Local(idx) => self.locals.get(*idx).map(|x| Type::ptr_to(x.ty.clone())),
            Operand::Global(idx) => module.globals.get(*idx).map(|x| Type::ptr_to(x.ty.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub name: String,
    pub instructions: Vec<Instruction>,
    /// None while the block is still open.
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
            terminator: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub result: Option<ValueId>,
    /// The type of the result, `Void` for instructions without one.
    pub ty: Type,
    pub kind: InstKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// Reads the value stored at `ptr`.
    Load { ptr: Operand },
    /// Writes `value` to `ptr`.
    Store { ptr: Operand, value: Operand },
    Cast { op: CastOp, value: Operand },
    FCmp {
        pred: FCmpPred,
        lhs: Operand,
        rhs: Operand,
    },
    Call { func: FnIndex, args: Vec<Operand> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    /// Signed integer to float.
    SiToFp,
    /// Unsigned integer to float.
    UiToFp,
    FpToSi,
    FpToUi,
    ZExt,
    Trunc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FCmpPred {
    /// Ordered and not equal.
    One,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br {
        target: BlockIndex,
    },
    CondBr {
        cond: Operand,
        then_block: BlockIndex,
        else_block: BlockIndex,
    },
    Return(Option<Operand>),
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockIndex> {
        match self {
            Terminator::Br { target } => vec![*target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}

/// A stack slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    /// A name exists for user-defined variables.
    pub debug_name: Option<String>,
    /// The type of the stored value.
    pub ty: Type,
    pub kind: LocalKind,
}

impl Local {
    pub fn new(debug_name: Option<String>, ty: Type, kind: LocalKind) -> Self {
        Self {
            debug_name,
            ty,
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    /// User-declared variable.
    Var,
    /// Holds a copy of the function argument with the given position.
    Arg(usize),
}

/// An operand is either constant data, an argument, the result of an instruction or the
/// address of some storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(ConstValue),
    Arg(usize),
    Temp(ValueId),
    Local(LocalIndex),
    Global(GlobalIndex),
}

/// A typed handle to something the generator emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub operand: Operand,
    pub ty: Type,
}

impl Value {
    pub fn new(operand: Operand, ty: Type) -> Self {
        Self { operand, ty }
    }

    pub fn constant(value: ConstValue) -> Self {
        let ty = value.ty();
        Self {
            operand: Operand::Const(value),
            ty,
        }
    }

    pub fn is_address(&self) -> bool {
        matches!(self.ty, Type::Ptr(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Char(u8),
    I32(i32),
    F32(f32),
}

impl ConstValue {
    pub fn ty(&self) -> Type {
        match self {
            ConstValue::Bool(_) => Type::Bool,
            ConstValue::Char(_) => Type::Char8,
            ConstValue::I32(_) => Type::Int32,
            ConstValue::F32(_) => Type::Float32,
        }
    }

    /// The zero value of an arithmetic type.
    pub fn zero(ty: &Type) -> Option<Self> {
        match ty {
            Type::Bool => Some(ConstValue::Bool(false)),
            Type::Char8 => Some(ConstValue::Char(0)),
            Type::Int32 => Some(ConstValue::I32(0)),
            Type::Float32 => Some(ConstValue::F32(0.0)),
            Type::Void | Type::Ptr(_) | Type::Function(_) => None,
        }
    }
}

/// A IR type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// The result of a comparison, not nameable in source.
    Bool,
    /// 8-bit unsigned.
    Char8,
    Int32,
    Float32,
    /// The address of storage holding the inner type.
    Ptr(Box<Type>),
    Function(FunctionType),
}

impl Type {
    pub fn ptr_to(ty: Type) -> Self {
        Type::Ptr(Box::new(ty))
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Type::Char8 | Type::Int32 | Type::Float32)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float32)
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }
}

/// A function signature. Two signatures are equal when their parameter lists and return types
/// are pairwise equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

impl FunctionType {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self {
            params,
            ret: Box::new(ret),
        }
    }
}
