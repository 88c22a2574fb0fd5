// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cellml_gen::datamodel::Model;
use cellml_gen::{Error, ErrorCode, ErrorKind, Generator, ModelType, Profile, Result, cellml};

const EXIT_FAILURE: i32 = 1;

#[macro_export]
macro_rules! die(
    ($($arg:tt)*) => { {
        use std;
        eprintln!($($arg)*);
        std::process::exit(EXIT_FAILURE)
    } }
);

#[derive(Parser, Debug)]
#[command(name = "cellml-gen", version)]
#[command(about = "Generate simulation code from CellML models")]
struct Args {
    /// Target language: `c`, `python`, or the path to a JSON profile
    #[arg(long, global = true, default_value = "c")]
    profile: String,

    /// Input is a JSON-serialized model rather than CellML
    #[arg(long, global = true)]
    json: bool,

    /// Path to write output to instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the generated code for a model
    Generate {
        /// Model to read, or stdin when omitted
        path: Option<PathBuf>,
    },
    /// Report the model's type, sizes and errors without generating code
    Analyse {
        /// Model to read, or stdin when omitted
        path: Option<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_profile(name: &str) -> Result<Profile> {
    if let Some(profile) = Profile::builtin(name) {
        return Ok(profile);
    }
    match fs::read_to_string(name) {
        Ok(source) => Profile::from_json(&source),
        Err(err) => Err(Error::new(
            ErrorKind::Import,
            ErrorCode::BadProfile,
            Some(format!("{name}: {err}")),
        )),
    }
}

fn open_json(reader: &mut dyn BufRead) -> Result<Model> {
    serde_json::from_reader(reader).map_err(|err| {
        Error::new(
            ErrorKind::Import,
            ErrorCode::XmlDeserialization,
            Some(err.to_string()),
        )
    })
}

fn open_model(path: Option<&Path>, is_json: bool) -> Result<Model> {
    let mut reader: Box<dyn BufRead> = match path {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(err) => die!("unable to open '{}': {}", path.display(), err),
        },
        None => Box::new(BufReader::new(io::stdin())),
    };

    if is_json {
        open_json(&mut reader)
    } else {
        cellml::model_from_reader(&mut reader)
    }
}

fn section(out: &mut String, profile: &Profile, title: &str, code: &str) {
    if code.is_empty() {
        return;
    }
    out.push_str(&profile.comment_line(title));
    out.push('\n');
    out.push_str(code);
    out.push('\n');
}

fn generate(generator: &Generator) -> String {
    let profile = generator.profile();
    let mut out = String::new();
    section(
        &mut out,
        profile,
        "Math helpers",
        &generator.needed_math_methods(),
    );
    section(
        &mut out,
        profile,
        "Initialise variables",
        &generator.initialize_variables(),
    );
    section(
        &mut out,
        profile,
        "Compute constant equations",
        &generator.compute_constant_equations(),
    );
    section(
        &mut out,
        profile,
        "Compute rate equations",
        &generator.compute_rate_equations(),
    );
    section(
        &mut out,
        profile,
        "Compute algebraic equations",
        &generator.compute_algebraic_equations(),
    );
    out
}

fn analyse(generator: &Generator) -> String {
    let model_type = match generator.model_type() {
        ModelType::Unknown => "unknown",
        ModelType::Algebraic => "algebraic",
        ModelType::Ode => "ode",
    };

    let mut out = format!("type: {model_type}\n");
    if let Some(voi) = generator.variable_of_integration() {
        out.push_str(&format!("variable of integration: {voi}\n"));
    }
    out.push_str(&format!("states: {}\n", generator.state_count()));
    out.push_str(&format!("variables: {}\n", generator.variable_count()));
    out.push_str(&format!("equations: {}\n", generator.equation_count()));
    out.push_str(&format!("errors: {}\n", generator.error_count()));
    for err in generator.errors().iter() {
        out.push_str(&format!("  {}\n", err.description()));
    }
    out
}

fn main() {
    init_logging();
    let args = Args::parse();

    let profile = match load_profile(&args.profile) {
        Ok(profile) => profile,
        Err(err) => die!("error: {}", err),
    };

    let (path, is_generate) = match args.command {
        Command::Generate { ref path } => (path.as_deref(), true),
        Command::Analyse { ref path } => (path.as_deref(), false),
    };

    let model = match open_model(path, args.json) {
        Ok(model) => model,
        Err(err) => die!("model error: {}", err),
    };
    info!(model = %model.name, components = model.components.len(), "read model");

    let mut generator = Generator::new(profile);
    generator.process_model(&model);
    debug!(errors = generator.error_count(), "processed model");

    let output = if is_generate {
        if generator.error_count() > 0 {
            for err in generator.errors().iter() {
                eprintln!("error: {}", err.description());
            }
            std::process::exit(EXIT_FAILURE);
        }
        generate(&generator)
    } else {
        analyse(&generator)
    };

    let written = match args.output {
        Some(ref path) => fs::write(path, output.as_bytes()),
        None => io::stdout().lock().write_all(output.as_bytes()),
    };
    if let Err(err) = written {
        die!("unable to write output: {}", err);
    }
}
