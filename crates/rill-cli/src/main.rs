use ariadne::{Config, Label, Report, ReportKind, Source};
use clap::{Parser as ClapParser, Subcommand};
use rill::expr::{ExprError, parse_expression};
use rill::{Snapshot, Value, compile};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(ClapParser)]
#[command(name = "rill")]
#[command(about = "Rill expression tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that an expression file parses
    Check {
        /// Path to a file containing one expression
        file: PathBuf,
    },
    /// Compile an expression and print its dependencies and client source
    Compile {
        /// The expression to compile
        expression: String,
    },
    /// Evaluate an expression against named inputs
    Eval {
        /// The expression to evaluate
        expression: String,
        /// Input values as name=json, e.g. --input count=3 --input user='{"age":30}'
        #[arg(long = "input")]
        inputs: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file } => match fs::read_to_string(&file) {
            Ok(source) => {
                let filename = file.display().to_string();
                check_expression(source.trim(), &filename);
            }
            Err(e) => {
                eprintln!("Error reading file: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Compile { expression } => {
            compile_expression(&expression);
        }
        Commands::Eval { expression, inputs } => {
            eval_expression(&expression, &inputs);
        }
    }
}

fn check_expression(source: &str, filename: &str) {
    match parse_expression(source) {
        Ok(_) => {
            eprintln!("{filename}: ok");
        }
        Err(errors) => {
            report_errors(&errors, filename, source);
            std::process::exit(1);
        }
    }
}

fn compile_expression(source: &str) {
    let compiled = match compile(source) {
        Ok(compiled) => compiled,
        Err(errors) => {
            report_errors(&errors, "<expression>", source);
            std::process::exit(1);
        }
    };
    let client = match compiled.client_source() {
        Ok(client) => serde_json::json!({ "source": client }),
        Err(error) => serde_json::json!({
            "serverOnly": error.construct.as_ref(),
            "reason": error.reason.as_ref(),
            "marker": compiled.client_source_or_marker(),
        }),
    };
    let dependencies: Vec<&str> = compiled
        .dependencies()
        .iter()
        .map(|name| name.as_ref())
        .collect();
    let output = serde_json::json!({
        "source": compiled.source(),
        "dependencies": dependencies,
        "client": client,
    });
    println!("{}", serde_json::to_string_pretty(&output).unwrap());
}

fn eval_expression(source: &str, inputs: &[String]) {
    let mut snapshot = Snapshot::new();
    for input in inputs {
        let Some((name, json)) = input.split_once('=') else {
            eprintln!("Invalid input '{input}': expected name=json");
            std::process::exit(1);
        };
        let value: Value = match serde_json::from_str(json) {
            Ok(value) => value,
            Err(e) => {
                eprintln!("Invalid value for '{name}': {e}");
                std::process::exit(1);
            }
        };
        snapshot.insert(Arc::from(name), value);
    }

    let compiled = match compile(source) {
        Ok(compiled) => compiled,
        Err(errors) => {
            report_errors(&errors, "<expression>", source);
            std::process::exit(1);
        }
    };
    for dependency in compiled.dependencies() {
        if !snapshot.contains_key(dependency.as_ref()) {
            eprintln!("Missing input: {dependency}");
            std::process::exit(1);
        }
    }
    match compiled.evaluate(&snapshot) {
        Ok(value) => {
            println!("{}", serde_json::to_string(&value).unwrap());
        }
        Err(message) => {
            eprintln!("Evaluation failed: {message}");
            std::process::exit(1);
        }
    }
}

fn report_errors(errors: &[ExprError], filename: &str, source: &str) {
    for error in errors {
        Report::build(ReportKind::Error, (filename, error.span.clone()))
            .with_config(Config::default().with_color(false))
            .with_message(&error.message)
            .with_label(Label::new((filename, error.span.clone())).with_message(&error.message))
            .finish()
            .eprint((filename, Source::from(source)))
            .unwrap();
    }
}
