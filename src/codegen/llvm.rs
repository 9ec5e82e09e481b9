use std::{
    collections::HashMap,
    ffi::{CStr, CString, c_char},
    mem::MaybeUninit,
    path::PathBuf,
    ptr::null_mut,
    sync::OnceLock,
};

use llvm_sys::{
    LLVMRealPredicate,
    analysis::{LLVMVerifierFailureAction, LLVMVerifyModule},
    core::{
        LLVMAddFunction, LLVMAddGlobal, LLVMAppendBasicBlockInContext, LLVMBuildAlloca,
        LLVMBuildBr, LLVMBuildCall2, LLVMBuildCondBr, LLVMBuildFCmp, LLVMBuildFPToSI,
        LLVMBuildFPToUI, LLVMBuildLoad2, LLVMBuildRet, LLVMBuildRetVoid, LLVMBuildSIToFP,
        LLVMBuildStore, LLVMBuildTrunc, LLVMBuildUIToFP, LLVMBuildUnreachable, LLVMBuildZExt,
        LLVMConstInt, LLVMConstReal, LLVMContextCreate, LLVMContextDispose,
        LLVMCreateBuilderInContext, LLVMDisposeBuilder, LLVMDisposeMessage, LLVMDisposeModule,
        LLVMFloatTypeInContext, LLVMFunctionType, LLVMGetParam, LLVMInt1TypeInContext,
        LLVMInt8TypeInContext, LLVMInt32TypeInContext, LLVMModuleCreateWithNameInContext,
        LLVMPointerTypeInContext, LLVMPositionBuilderAtEnd, LLVMPrintModuleToFile,
        LLVMSetInitializer, LLVMSetModuleDataLayout, LLVMSetTarget, LLVMVoidTypeInContext,
    },
    error::{LLVMDisposeErrorMessage, LLVMGetErrorMessage},
    prelude::{LLVMBasicBlockRef, LLVMBuilderRef, LLVMContextRef, LLVMModuleRef, LLVMTypeRef, LLVMValueRef},
    target::{
        LLVM_InitializeAllAsmPrinters, LLVM_InitializeAllTargetInfos, LLVM_InitializeAllTargetMCs,
        LLVM_InitializeAllTargets, LLVMDisposeTargetData,
    },
    target_machine::{
        LLVMCodeGenFileType, LLVMCodeGenOptLevel, LLVMCodeModel, LLVMCreateTargetDataLayout,
        LLVMCreateTargetMachine, LLVMDisposeTargetMachine, LLVMGetDefaultTargetTriple,
        LLVMGetTargetFromTriple, LLVMRelocMode, LLVMTargetMachineEmitToFile, LLVMTargetRef,
    },
    transforms::pass_builder::{
        LLVMCreatePassBuilderOptions, LLVMDisposePassBuilderOptions, LLVMRunPasses,
    },
};
use tracing::{debug, error};

use crate::{
    compile_unit_info::{CompileUnitInfo, OptLevel},
    ir::{
        CastOp, ConstValue, FCmpPred, Function, InstKind, Module, Operand, Terminator, Type,
        ValueId,
    },
};

use super::CodegenError;

fn cstring(value: &str) -> Result<CString, CodegenError> {
    CString::new(value).map_err(|e| CodegenError::Llvm(e.to_string()))
}

/// Reads and frees a message returned by LLVM.
///
/// # Safety
/// `message` must be null or a string allocated by LLVM.
unsafe fn take_message(message: *mut c_char) -> String {
    if message.is_null() {
        return String::new();
    }
    unsafe {
        let text = CStr::from_ptr(message).to_string_lossy().into_owned();
        LLVMDisposeMessage(message);
        text
    }
}

/// Converts a module to an object file and returns its path.
pub fn compile_to_object(info: &CompileUnitInfo, module: &Module) -> Result<PathBuf, CodegenError> {
    static INITIALIZED: OnceLock<()> = OnceLock::new();
    INITIALIZED.get_or_init(|| unsafe {
        LLVM_InitializeAllTargets();
        LLVM_InitializeAllTargetInfos();
        LLVM_InitializeAllTargetMCs();
        LLVM_InitializeAllAsmPrinters();
        debug!("initialized llvm targets");
    });

    let target_file = info.output_file.clone();
    debug!("Target file: {:?}", target_file);

    // Opening the file first tells file errors apart from emission errors.
    std::fs::File::create(&target_file).map_err(|e| CodegenError::FileOpen {
        path: target_file.clone(),
        message: e.to_string(),
    })?;

    // Fallible work happens before the context exists, past this point nothing returns early.
    let name = cstring(&module.name)?;

    unsafe {
        let context = LLVMContextCreate();
        let llvm_module = LLVMModuleCreateWithNameInContext(name.as_ptr(), context);

        let result = ModuleLowering::new(context, llvm_module)
            .lower(module)
            .and_then(|_| emit(info, llvm_module, &target_file));

        LLVMDisposeModule(llvm_module);
        LLVMContextDispose(context);

        result.map(|_| target_file)
    }
}

/// Runs the optimization pipeline and writes the object file.
///
/// # Safety
/// `llvm_module` must be a valid module.
unsafe fn emit(
    info: &CompileUnitInfo,
    llvm_module: LLVMModuleRef,
    target_file: &std::path::Path,
) -> Result<(), CodegenError> {
    unsafe {
        let triple = match &info.target.triple {
            Some(triple) => triple.clone(),
            None => take_message(LLVMGetDefaultTargetTriple()),
        };
        debug!("Target triple: {:?}", triple);
        let c_triple = cstring(&triple)?;
        let cpu = cstring(&info.target.cpu)?;
        let features = cstring(&info.target.features)?;

        let mut error_buffer = null_mut();
        let mut target: MaybeUninit<LLVMTargetRef> = MaybeUninit::uninit();
        if LLVMGetTargetFromTriple(c_triple.as_ptr(), target.as_mut_ptr(), &mut error_buffer) != 0
        {
            let message = take_message(error_buffer);
            error!("error getting target triple: {}", message);
            return Err(CodegenError::TargetLookup { triple, message });
        }
        take_message(error_buffer);
        let target = target.assume_init();

        let machine = LLVMCreateTargetMachine(
            target,
            c_triple.as_ptr(),
            cpu.as_ptr(),
            features.as_ptr(),
            match info.optlevel {
                OptLevel::None => LLVMCodeGenOptLevel::LLVMCodeGenLevelNone,
                OptLevel::Less => LLVMCodeGenOptLevel::LLVMCodeGenLevelLess,
                OptLevel::Default => LLVMCodeGenOptLevel::LLVMCodeGenLevelDefault,
                OptLevel::Aggressive => LLVMCodeGenOptLevel::LLVMCodeGenLevelAggressive,
            },
            LLVMRelocMode::LLVMRelocDefault,
            LLVMCodeModel::LLVMCodeModelDefault,
        );

        let data_layout = LLVMCreateTargetDataLayout(machine);
        LLVMSetModuleDataLayout(llvm_module, data_layout);
        LLVMSetTarget(llvm_module, c_triple.as_ptr());
        LLVMDisposeTargetData(data_layout);

        let result = run_passes(info, llvm_module, machine).and_then(|_| {
            if info.output_ir {
                let filename = cstring(&target_file.with_extension("ll").to_string_lossy())?;
                let mut error_buffer = null_mut();
                if LLVMPrintModuleToFile(llvm_module, filename.as_ptr(), &mut error_buffer) != 0 {
                    let message = take_message(error_buffer);
                    error!("error outputing ll file: {}", message);
                    return Err(CodegenError::FileOpen {
                        path: target_file.with_extension("ll"),
                        message,
                    });
                }
                take_message(error_buffer);
            }

            let filename = cstring(&target_file.to_string_lossy())?;
            debug!("filename to llvm: {:?}", filename);
            let mut error_buffer = null_mut();
            let failed = LLVMTargetMachineEmitToFile(
                machine,
                llvm_module,
                filename.as_ptr().cast_mut(),
                LLVMCodeGenFileType::LLVMObjectFile,
                &mut error_buffer,
            );
            let message = take_message(error_buffer);
            if failed != 0 {
                error!("error emitting to file: {:?}", message);
                return Err(CodegenError::CannotEmitFileType(message));
            }
            Ok(())
        });

        LLVMDisposeTargetMachine(machine);
        result
    }
}

unsafe fn run_passes(
    info: &CompileUnitInfo,
    llvm_module: LLVMModuleRef,
    machine: llvm_sys::target_machine::LLVMTargetMachineRef,
) -> Result<(), CodegenError> {
    unsafe {
        let opt = match info.optlevel {
            OptLevel::None => 0,
            OptLevel::Less => 1,
            OptLevel::Default => 2,
            OptLevel::Aggressive => 3,
        };
        let passes = cstring(&format!("default<O{opt}>"))?;
        let opts = LLVMCreatePassBuilderOptions();
        let error = LLVMRunPasses(llvm_module, passes.as_ptr(), machine, opts);
        LLVMDisposePassBuilderOptions(opts);

        if !error.is_null() {
            let message = LLVMGetErrorMessage(error);
            let text = CStr::from_ptr(message).to_string_lossy().into_owned();
            LLVMDisposeErrorMessage(message);
            return Err(CodegenError::Llvm(text));
        }
        Ok(())
    }
}

/// Translates the IR into an LLVM module.
struct ModuleLowering {
    context: LLVMContextRef,
    module: LLVMModuleRef,
    builder: LLVMBuilderRef,
    functions: HashMap<String, (LLVMValueRef, LLVMTypeRef)>,
    globals: Vec<LLVMValueRef>,
}

impl Drop for ModuleLowering {
    fn drop(&mut self) {
        unsafe { LLVMDisposeBuilder(self.builder) }
    }
}

/// The LLVM values of one function being translated.
struct FunctionValues {
    locals: Vec<LLVMValueRef>,
    temps: HashMap<ValueId, LLVMValueRef>,
    blocks: HashMap<usize, LLVMBasicBlockRef>,
}

impl ModuleLowering {
    unsafe fn new(context: LLVMContextRef, module: LLVMModuleRef) -> Self {
        Self {
            context,
            module,
            builder: unsafe { LLVMCreateBuilderInContext(context) },
            functions: HashMap::new(),
            globals: Vec::new(),
        }
    }

    unsafe fn lower_type(&self, ty: &Type) -> LLVMTypeRef {
        unsafe {
            match ty {
                Type::Void => LLVMVoidTypeInContext(self.context),
                Type::Bool => LLVMInt1TypeInContext(self.context),
                Type::Char8 => LLVMInt8TypeInContext(self.context),
                Type::Int32 => LLVMInt32TypeInContext(self.context),
                Type::Float32 => LLVMFloatTypeInContext(self.context),
                Type::Ptr(_) | Type::Function(_) => LLVMPointerTypeInContext(self.context, 0),
            }
        }
    }

    unsafe fn lower_const(&self, value: &ConstValue) -> LLVMValueRef {
        unsafe {
            let ty = self.lower_type(&value.ty());
            match value {
                ConstValue::Bool(x) => LLVMConstInt(ty, u64::from(*x), 0),
                ConstValue::Char(x) => LLVMConstInt(ty, u64::from(*x), 0),
                ConstValue::I32(x) => LLVMConstInt(ty, *x as u64, 1),
                ConstValue::F32(x) => LLVMConstReal(ty, f64::from(*x)),
            }
        }
    }

    unsafe fn lower(mut self, module: &Module) -> Result<(), CodegenError> {
        unsafe {
            for global in &module.globals {
                let name = cstring(&global.name)?;
                let value = LLVMAddGlobal(self.module, self.lower_type(&global.ty), name.as_ptr());
                LLVMSetInitializer(value, self.lower_const(&global.init));
                self.globals.push(value);
            }

            for (_, func) in module.iter_functions() {
                let mut params: Vec<_> = func
                    .signature
                    .params
                    .iter()
                    .map(|x| self.lower_type(x))
                    .collect();
                let fn_type = LLVMFunctionType(
                    self.lower_type(&func.signature.ret),
                    params.as_mut_ptr(),
                    params.len() as u32,
                    0,
                );
                let name = cstring(&func.name)?;
                let value = LLVMAddFunction(self.module, name.as_ptr(), fn_type);
                self.functions.insert(func.name.clone(), (value, fn_type));
            }

            for (_, func) in module.iter_functions() {
                if func.has_body() {
                    self.lower_body(module, func)?;
                }
            }

            let mut message = null_mut();
            if LLVMVerifyModule(
                self.module,
                LLVMVerifierFailureAction::LLVMReturnStatusAction,
                &mut message,
            ) != 0
            {
                return Err(CodegenError::Llvm(take_message(message)));
            }
            take_message(message);
            Ok(())
        }
    }

    unsafe fn lower_body(&self, module: &Module, func: &Function) -> Result<(), CodegenError> {
        unsafe {
            let (fn_value, _) = self.functions[&func.name];
            let mut values = FunctionValues {
                locals: Vec::new(),
                temps: HashMap::new(),
                blocks: HashMap::new(),
            };

            for idx in &func.layout {
                let name = cstring(&func.blocks[*idx].name)?;
                let block = LLVMAppendBasicBlockInContext(self.context, fn_value, name.as_ptr());
                values.blocks.insert(*idx, block);
            }

            let Some(entry) = func.entry() else {
                return Ok(());
            };
            LLVMPositionBuilderAtEnd(self.builder, values.blocks[&entry]);
            for local in &func.locals {
                let name = cstring(local.debug_name.as_deref().unwrap_or_default())?;
                values.locals.push(LLVMBuildAlloca(
                    self.builder,
                    self.lower_type(&local.ty),
                    name.as_ptr(),
                ));
            }

            for idx in &func.layout {
                let block = &func.blocks[*idx];
                LLVMPositionBuilderAtEnd(self.builder, values.blocks[idx]);

                for inst in &block.instructions {
                    let result = self.lower_instruction(module, fn_value, &values, inst)?;
                    if let Some(id) = inst.result {
                        values.temps.insert(id, result);
                    }
                }

                let operand = |x: &Operand| self.lower_operand(fn_value, &values, x);
                let target = |x: &usize| {
                    values.blocks.get(x).copied().ok_or_else(|| {
                        CodegenError::Llvm(format!("branch to detached block {x}"))
                    })
                };
                match &block.terminator {
                    Some(Terminator::Br { target: x }) => {
                        LLVMBuildBr(self.builder, target(x)?);
                    }
                    Some(Terminator::CondBr {
                        cond,
                        then_block,
                        else_block,
                    }) => {
                        LLVMBuildCondBr(
                            self.builder,
                            operand(cond)?,
                            target(then_block)?,
                            target(else_block)?,
                        );
                    }
                    Some(Terminator::Return(Some(x))) => {
                        LLVMBuildRet(self.builder, operand(x)?);
                    }
                    Some(Terminator::Return(None)) => {
                        LLVMBuildRetVoid(self.builder);
                    }
                    Some(Terminator::Unreachable) => {
                        LLVMBuildUnreachable(self.builder);
                    }
                    None => {
                        return Err(CodegenError::Llvm(format!(
                            "block {} of {:?} has no terminator",
                            block.name, func.name
                        )));
                    }
                }
            }

            Ok(())
        }
    }

    unsafe fn lower_operand(
        &self,
        fn_value: LLVMValueRef,
        values: &FunctionValues,
        operand: &Operand,
    ) -> Result<LLVMValueRef, CodegenError> {
        unsafe {
            let value = match operand {
                Operand::Const(x) => Some(self.lower_const(x)),
                Operand::Arg(idx) => Some(LLVMGetParam(fn_value, *idx as u32)),
                Operand::Temp(id) => values.temps.get(id).copied(),
                Operand::Local(idx) => values.locals.get(*idx).copied(),
                Operand::Global(idx) => self.globals.get(*idx).copied(),
            };
            value.ok_or_else(|| CodegenError::Llvm(format!("invalid operand {operand:?}")))
        }
    }

    unsafe fn lower_instruction(
        &self,
        module: &Module,
        fn_value: LLVMValueRef,
        values: &FunctionValues,
        inst: &crate::ir::Instruction,
    ) -> Result<LLVMValueRef, CodegenError> {
        unsafe {
            let b = self.builder;
            let ty = self.lower_type(&inst.ty);
            let operand = |x: &Operand| self.lower_operand(fn_value, values, x);
            let unnamed = c"".as_ptr();

            Ok(match &inst.kind {
                InstKind::Load { ptr } => LLVMBuildLoad2(b, ty, operand(ptr)?, unnamed),
                InstKind::Store { ptr, value } => LLVMBuildStore(b, operand(value)?, operand(ptr)?),
                InstKind::Cast { op, value } => {
                    let value = operand(value)?;
                    match op {
                        CastOp::SiToFp => LLVMBuildSIToFP(b, value, ty, unnamed),
                        CastOp::UiToFp => LLVMBuildUIToFP(b, value, ty, unnamed),
                        CastOp::FpToSi => LLVMBuildFPToSI(b, value, ty, unnamed),
                        CastOp::FpToUi => LLVMBuildFPToUI(b, value, ty, unnamed),
                        CastOp::ZExt => LLVMBuildZExt(b, value, ty, unnamed),
                        CastOp::Trunc => LLVMBuildTrunc(b, value, ty, unnamed),
                    }
                }
                InstKind::FCmp { pred, lhs, rhs } => {
                    let pred = match pred {
                        FCmpPred::One => LLVMRealPredicate::LLVMRealONE,
                    };
                    LLVMBuildFCmp(b, pred, operand(lhs)?, operand(rhs)?, unnamed)
                }
                InstKind::Call { func, args } => {
                    let callee = &module.function(*func).name;
                    let (callee, fn_type) = self.functions[callee];
                    let mut args = args.iter().map(operand).collect::<Result<Vec<_>, _>>()?;
                    LLVMBuildCall2(b, fn_type, callee, args.as_mut_ptr(), args.len() as u32, unnamed)
                }
            })
        }
    }
}
