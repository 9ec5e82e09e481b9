use tracing::trace;

use crate::ir::{
    BasicBlock, BlockIndex, CastOp, FCmpPred, FnIndex, Function, InstKind, Instruction, Local,
    LocalKind, Module, Operand, Terminator, Type, Value,
};

use super::{
    errors::LoweringError,
    scope::{ScopeChain, ScopeIndex},
};

/// The block new instructions are appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertPoint {
    pub func: FnIndex,
    pub block: BlockIndex,
}

/// Context to help build the IR of one translation unit.
#[derive(Debug, Clone)]
pub struct IRBuilder {
    pub module: Module,
    pub scopes: ScopeChain,
    insert_point: Option<InsertPoint>,
}

impl IRBuilder {
    pub fn new(module_name: &str) -> Self {
        Self {
            module: Module::new(module_name),
            scopes: ScopeChain::new(),
            insert_point: None,
        }
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    pub fn insert_point(&self) -> Option<InsertPoint> {
        self.insert_point
    }

    /// Moves the cursor, returning where it was.
    pub fn set_insert_point(&mut self, point: Option<InsertPoint>) -> Option<InsertPoint> {
        std::mem::replace(&mut self.insert_point, point)
    }

    /// Gives `func` an entry block and moves the cursor there, returning where it was.
    pub fn enter_function(&mut self, func: FnIndex, entry_name: &str) -> Option<InsertPoint> {
        let function = self.module.function_mut(func);
        function.blocks.push(BasicBlock::new(entry_name));
        let block = function.blocks.len() - 1;
        function.layout.push(block);
        self.set_insert_point(Some(InsertPoint { func, block }))
    }

    /// Moves the cursor to `block` of the current function.
    pub fn position_at_end(&mut self, block: BlockIndex) -> Result<(), LoweringError> {
        let point = self.current()?;
        self.insert_point = Some(InsertPoint {
            func: point.func,
            block,
        });
        Ok(())
    }

    pub fn current_function(&self) -> Option<FnIndex> {
        self.insert_point.map(|x| x.func)
    }

    fn current(&self) -> Result<InsertPoint, LoweringError> {
        self.insert_point.ok_or_else(|| {
            LoweringError::structural(None, "statement outside of a function body")
        })
    }

    fn func_mut(&mut self) -> Result<&mut Function, LoweringError> {
        let point = self.current()?;
        Ok(self.module.function_mut(point.func))
    }

    /// Creates a block that is not yet part of the function body.
    pub fn create_block(&mut self, name: &str) -> Result<BlockIndex, LoweringError> {
        let func = self.func_mut()?;
        func.blocks.push(BasicBlock::new(name));
        Ok(func.blocks.len() - 1)
    }

    /// Places a block at the end of the function body, if it isn't there already.
    pub fn attach_block(&mut self, block: BlockIndex) -> Result<(), LoweringError> {
        let func = self.func_mut()?;
        if !func.layout.contains(&block) {
            func.layout.push(block);
        }
        Ok(())
    }

    pub fn append_block(&mut self, name: &str) -> Result<BlockIndex, LoweringError> {
        let block = self.create_block(name)?;
        self.attach_block(block)?;
        Ok(block)
    }

    /// Adds a stack slot to the current function, returning its address.
    pub fn add_local(
        &mut self,
        debug_name: Option<&str>,
        ty: Type,
        kind: LocalKind,
    ) -> Result<Value, LoweringError> {
        let func = self.func_mut()?;
        let idx = func.locals.len();
        func.locals
            .push(Local::new(debug_name.map(String::from), ty.clone(), kind));
        Ok(Value::new(Operand::Local(idx), Type::ptr_to(ty)))
    }

    /// Whether the block under the cursor already ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        self.insert_point.is_some_and(|point| {
            self.module
                .function(point.func)
                .blocks
                .get(point.block)
                .is_some_and(|x| x.terminator.is_some())
        })
    }

    /// Makes sure the cursor is on an open block. Code following a terminator is unreachable and
    /// gets its own block.
    fn ensure_open_block(&mut self) -> Result<InsertPoint, LoweringError> {
        if self.is_terminated() {
            let block = self.append_block("dead")?;
            self.position_at_end(block)?;
        }
        self.current()
    }

    fn push_instruction(&mut self, ty: Type, kind: InstKind) -> Result<Option<Operand>, LoweringError> {
        let point = self.ensure_open_block()?;
        let func = self.module.function_mut(point.func);

        let result = if ty == Type::Void {
            None
        } else {
            func.next_value += 1;
            Some(func.next_value - 1)
        };

        trace!(?kind, "push instruction");
        func.blocks[point.block].instructions.push(Instruction { result, ty, kind });
        Ok(result.map(Operand::Temp))
    }

    fn terminate(&mut self, terminator: Terminator) -> Result<(), LoweringError> {
        let point = self.ensure_open_block()?;
        trace!(?terminator, "terminate block");
        self.module.function_mut(point.func).blocks[point.block].terminator = Some(terminator);
        Ok(())
    }

    fn temp(result: Option<Operand>, ty: Type) -> Result<Value, LoweringError> {
        result
            .map(|operand| Value::new(operand, ty))
            .ok_or_else(|| LoweringError::structural(None, "instruction without result"))
    }

    pub fn build_load(&mut self, ptr: &Value) -> Result<Value, LoweringError> {
        let ty = ptr.ty.pointee().cloned().ok_or_else(|| {
            LoweringError::structural(None, format!("load through non address of type {}", ptr.ty))
        })?;
        let result = self.push_instruction(
            ty.clone(),
            InstKind::Load {
                ptr: ptr.operand.clone(),
            },
        )?;
        Self::temp(result, ty)
    }

    pub fn build_store(&mut self, ptr: &Value, value: &Value) -> Result<(), LoweringError> {
        self.push_instruction(
            Type::Void,
            InstKind::Store {
                ptr: ptr.operand.clone(),
                value: value.operand.clone(),
            },
        )?;
        Ok(())
    }

    pub fn build_cast(&mut self, op: CastOp, value: &Value, to: Type) -> Result<Value, LoweringError> {
        let result = self.push_instruction(
            to.clone(),
            InstKind::Cast {
                op,
                value: value.operand.clone(),
            },
        )?;
        Self::temp(result, to)
    }

    pub fn build_fcmp(
        &mut self,
        pred: FCmpPred,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<Value, LoweringError> {
        let result = self.push_instruction(
            Type::Bool,
            InstKind::FCmp {
                pred,
                lhs: lhs.operand.clone(),
                rhs: rhs.operand.clone(),
            },
        )?;
        Self::temp(result, Type::Bool)
    }

    /// Emits a call, yielding no value for void functions.
    pub fn build_call(
        &mut self,
        func: FnIndex,
        args: Vec<Operand>,
    ) -> Result<Option<Value>, LoweringError> {
        let ret = self.module.function(func).signature.ret.as_ref().clone();
        let result = self.push_instruction(ret.clone(), InstKind::Call { func, args })?;
        Ok(result.map(|operand| Value::new(operand, ret)))
    }

    pub fn build_br(&mut self, target: BlockIndex) -> Result<(), LoweringError> {
        self.terminate(Terminator::Br { target })
    }

    pub fn build_cond_br(
        &mut self,
        cond: &Value,
        then_block: BlockIndex,
        else_block: BlockIndex,
    ) -> Result<(), LoweringError> {
        self.terminate(Terminator::CondBr {
            cond: cond.operand.clone(),
            then_block,
            else_block,
        })
    }

    pub fn build_ret(&mut self, value: Option<&Value>) -> Result<(), LoweringError> {
        self.terminate(Terminator::Return(value.map(|x| x.operand.clone())))
    }

    pub fn build_unreachable(&mut self) -> Result<(), LoweringError> {
        self.terminate(Terminator::Unreachable)
    }

    /// Runs `f` in a new scope nested in `parent`. The scope is dropped afterwards, even if `f`
    /// fails.
    pub fn with_child_scope<T>(
        &mut self,
        parent: ScopeIndex,
        f: impl FnOnce(&mut Self, ScopeIndex) -> Result<T, LoweringError>,
    ) -> Result<T, LoweringError> {
        let scope = self.scopes.push(Some(parent));
        let result = f(self, scope);
        self.scopes.pop(scope);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, FunctionType};

    fn builder_in_function() -> IRBuilder {
        let mut builder = IRBuilder::new("test");
        let func = builder
            .module
            .add_function("f", FunctionType::new(vec![], Type::Void));
        assert_eq!(builder.enter_function(func, "f_block"), None);
        builder
    }

    #[test]
    fn code_after_terminator_goes_to_a_new_block() {
        let mut builder = builder_in_function();
        builder.build_ret(None).unwrap();
        assert!(builder.is_terminated());

        let slot = builder.add_local(Some("x"), Type::Int32, LocalKind::Var).unwrap();
        builder
            .build_store(&slot, &Value::constant(ConstValue::I32(1)))
            .unwrap();

        let func = builder.module.iter_functions().next().unwrap().1;
        assert_eq!(func.layout, vec![0, 1]);
        assert_eq!(func.blocks[1].name, "dead");
        assert_eq!(builder.insert_point().unwrap().block, 1);
    }

    #[test]
    fn detached_blocks_are_attached_once() {
        let mut builder = builder_in_function();
        let block = builder.create_block("merge").unwrap();
        {
            let func = builder.module.iter_functions().next().unwrap().1;
            assert!(!func.is_attached(block));
        }
        builder.attach_block(block).unwrap();
        builder.attach_block(block).unwrap();
        let func = builder.module.iter_functions().next().unwrap().1;
        assert_eq!(func.layout, vec![0, 1]);
    }

    #[test]
    fn instructions_need_a_function() {
        let mut builder = IRBuilder::new("test");
        assert!(matches!(
            builder.build_ret(None),
            Err(LoweringError::StructuralPrecondition { .. })
        ));
    }
}
