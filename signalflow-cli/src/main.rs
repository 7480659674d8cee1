//! `signalflow` — run a model JSON through the interpreter or emit its C99
//! rendition.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use signalflow_model::params::BlockParams;
use signalflow_model::value::SignalValue;
use signalflow_model::{BlockKind, Model};

#[derive(Parser)]
#[command(name = "signalflow", about = "Block-diagram simulation engine and C code generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate a model and write the results as JSON.
    Run {
        /// Path to the model JSON file.
        model: PathBuf,
        /// Optional JSON object mapping input port names to values.
        #[arg(long)]
        inputs: Option<PathBuf>,
        /// Where to write the results (stdout when omitted).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Emit the C99 header/source pair (and optionally a main harness).
    Codegen {
        /// Path to the model JSON file.
        model: PathBuf,
        /// Directory the .h/.c files are written into.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Also emit a main.c harness that prints every output per step.
        #[arg(long)]
        main: bool,
    },
}

fn load_model(path: &PathBuf) -> Result<Model> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading model file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing model {}", path.display()))
}

/// Parses the `--inputs` file against the model's declared input ports so
/// values take the right base type.
fn load_inputs(model: &Model, path: &PathBuf) -> Result<HashMap<String, SignalValue>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading inputs file {}", path.display()))?;
    let raw: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&text).with_context(|| format!("parsing inputs {}", path.display()))?;

    let mut declared = HashMap::new();
    for sheet in &model.sheets {
        for block in &sheet.blocks {
            if block.kind == BlockKind::InputPort {
                if let Ok(BlockParams::InputPort(p)) =
                    BlockParams::build(block.kind, &block.parameters)
                {
                    declared.insert(p.port_name.clone(), p.data_type);
                }
            }
        }
    }

    let mut out = HashMap::new();
    for (name, json) in raw {
        let base = declared
            .get(&name)
            .map(|t| t.base())
            .unwrap_or(signalflow_model::BaseType::Double);
        let value = SignalValue::from_json(&json, base)
            .with_context(|| format!("input `{name}` is not a valid signal literal"))?;
        out.insert(name, value);
    }
    Ok(out)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            model,
            inputs,
            output,
        } => {
            let model = load_model(&model)?;
            let external = match &inputs {
                Some(path) => load_inputs(&model, path)?,
                None => HashMap::new(),
            };
            let results = signalflow_engine::run(&model, &external)?;
            for diagnostic in &results.diagnostics {
                eprintln!(
                    "{:?}: {} ({})",
                    diagnostic.severity,
                    diagnostic.message,
                    diagnostic.block.as_deref().unwrap_or("model")
                );
            }
            let rendered = serde_json::to_string_pretty(&results)?;
            match output {
                Some(path) => fs::write(&path, rendered)
                    .with_context(|| format!("writing results to {}", path.display()))?,
                None => println!("{rendered}"),
            }
        }
        Command::Codegen {
            model,
            out_dir,
            main,
        } => {
            let model = load_model(&model)?;
            let code = signalflow_codegen::generate(&model, main)?;
            fs::create_dir_all(&out_dir)
                .with_context(|| format!("creating {}", out_dir.display()))?;
            fs::write(out_dir.join(&code.header_name), &code.header)?;
            fs::write(out_dir.join(&code.source_name), &code.source)?;
            println!("wrote {} and {}", code.header_name, code.source_name);
            if let Some(harness) = &code.main {
                fs::write(out_dir.join("main.c"), harness)?;
                println!("wrote main.c");
            }
        }
    }
    Ok(())
}
