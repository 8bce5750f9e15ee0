use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rexi::backend::backend_by_name;
use rexi::backend::ir::{CodeGenerator, Machine, listing};
use rexi::{Report, lexer, parser};

/// Run or compile a Rexi program.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Which backend executes the program.
    #[arg(
        short,
        long,
        default_value = "interpreter",
        value_parser = ["interpreter", "ir", "ir-vm"]
    )]
    backend: String,

    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Only lex the input and report every illegal character.
    #[arg(long)]
    check: bool,

    /// Source file. Reads stdin when omitted.
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let source = read_source(cli.file.as_ref())?;
    debug!(bytes = source.len(), backend = %cli.backend, "loaded source");

    if cli.check {
        return Ok(check(&source));
    }

    match cli.format {
        Format::Text => {
            run_text(&cli.backend, &source)?;
            Ok(ExitCode::SUCCESS)
        }
        Format::Json => run_json(&cli.backend, &source),
    }
}

fn read_source(path: Option<&PathBuf>) -> Result<String> {
    if let Some(path) = path {
        return fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()));
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Reading stdin")?;
    Ok(buffer)
}

fn check(source: &str) -> ExitCode {
    let (tokens, errors) = lexer::scan(source);
    for error in &errors {
        eprintln!("{error}");
    }
    if errors.is_empty() {
        info!(tokens = tokens.len(), "no lexical errors");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_text(backend_name: &str, source: &str) -> Result<()> {
    let output = if backend_name == "ir" {
        listing(&rexi::compile(source)?)
    } else {
        let program = parser::parse(source)?;
        let backend = backend_by_name(backend_name)
            .ok_or_else(|| anyhow!("Unknown backend '{backend_name}'"))?;
        backend.run(&program)?
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn run_json(backend_name: &str, source: &str) -> Result<ExitCode> {
    match backend_name {
        "interpreter" => {
            let report = Report::from(rexi::interpret(source));
            let failed = matches!(report, Report::Failure { .. });
            emit(&report)?;
            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        "ir" => match rexi::compile(source) {
            Ok(instructions) => emit(&instructions).map(|()| ExitCode::SUCCESS),
            Err(error) => emit_error(&error),
        },
        "ir-vm" => {
            let program = match parser::parse(source) {
                Ok(program) => program,
                Err(error) => return emit_error(&error),
            };
            let unit = CodeGenerator::new().generate_unit(&program);
            match Machine::new(&unit).run() {
                Ok(execution) => emit(&execution).map(|()| ExitCode::SUCCESS),
                Err(error) => emit_error(&error),
            }
        }
        other => Err(anyhow!("Unknown backend '{other}'")),
    }
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Serializing result")?;
    println!("{json}");
    Ok(())
}

fn emit_error(error: &dyn std::error::Error) -> Result<ExitCode> {
    emit(&serde_json::json!({ "error": error.to_string() }))?;
    Ok(ExitCode::FAILURE)
}
