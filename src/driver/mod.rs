use std::{path::PathBuf, time::Instant};

use anyhow::{Context, bail};
use ariadne::Source;
use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use crate::{
    ast::SyntaxNode,
    check::lowering_error_to_report,
    codegen,
    compile_unit_info::{CompileUnitInfo, OptLevel},
    ir::{eval, lowering::Generator},
};

pub mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CompilerArgs {
    /// The syntax tree to compile, in TOML.
    input: PathBuf,

    /// The source file the tree was parsed from, used to point at errors.
    #[arg(long)]
    source: Option<PathBuf>,

    /// A config file with target and output settings.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The output object file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the generated IR next to the output.
    #[arg(long, default_value_t = false)]
    emit_ir: bool,

    /// Interpret the given function after generating, printing its result.
    #[arg(long)]
    run: Option<String>,

    /// Emit an object file.
    #[arg(long, default_value_t = false)]
    object: bool,

    /// Optimization level, 0 to 3.
    #[arg(long)]
    opt_level: Option<u8>,
}

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = CompilerArgs::parse();
    run(args)
}

/// Builds the settings of this run, CLI flags take precedence over the config file.
pub fn compile_unit_info(args: &CompilerArgs) -> anyhow::Result<CompileUnitInfo> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let mut info = CompileUnitInfo::new(args.input.clone());
    info.target = config.target;
    info.optlevel = OptLevel::from(args.opt_level.unwrap_or(config.output.opt_level));
    info.output_ir = args.emit_ir || config.output.emit_ir;
    info.output_object = args.object || args.output.is_some() || config.output.object.is_some();
    if let Some(output) = args.output.clone().or(config.output.object) {
        info.output_file = output;
    }

    if let Some(path) = &args.source {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading source {}", path.display()))?;
        info.source = Some((path.display().to_string(), Source::from(source)));
    }

    Ok(info)
}

pub fn run(args: CompilerArgs) -> anyhow::Result<()> {
    let start_time = Instant::now();
    let info = compile_unit_info(&args)?;
    tracing::debug!("Compiling with: {:#?}", info);

    let text = std::fs::read_to_string(&info.input)
        .with_context(|| format!("reading tree {}", info.input.display()))?;
    let tree = SyntaxNode::from_toml_str(&text)
        .with_context(|| format!("parsing tree {}", info.input.display()))?;

    let module = match Generator::new(info.module_name()).generate(&tree) {
        Ok(module) => module,
        Err(err) => {
            match &info.source {
                Some((path, source)) => {
                    lowering_error_to_report(&err.error, path)
                        .eprint((path.clone(), source.clone()))?;
                }
                None => eprintln!("{} {}", "error:".red().bold(), err),
            }
            tracing::debug!("partial module:\n{}", err.module);
            bail!("generation of {} failed", info.input.display());
        }
    };

    if info.output_ir {
        let ir_path = info.output_file.with_extension("ir");
        std::fs::write(&ir_path, module.to_string())
            .with_context(|| format!("writing {}", ir_path.display()))?;
        println!("{} {}", "Wrote".green().bold(), ir_path.display());
    }

    if let Some(name) = &args.run {
        match eval::run_function(&module, name, &[])? {
            Some(value) => println!("{} {name} returned {value:?}", "Ran".green().bold()),
            None => println!("{} {name}", "Ran".green().bold()),
        }
    }

    if info.output_object {
        let object = codegen::compile_to_object(&info, &module)?;
        println!("{} {}", "Compiled".green().bold(), object.display());
    }

    tracing::debug!("Done in {:?}", start_time.elapsed());
    Ok(())
}
