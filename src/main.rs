use std::{path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use secdc::{
    CompileOptions, Stage,
    backend::emit::EmitFormat,
    frontend::{SourceFile, SourceFileOrigin},
};
use tracing::info;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Source file to compile
    input: PathBuf,

    /// Where to write the result instead of standard output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after the given pass and print its result
    #[arg(long, value_enum)]
    stage: Option<Stage>,

    /// Output format of the compiled program
    #[arg(long, value_enum, default_value_t = EmitFormat::Assembly)]
    format: EmitFormat,

    /// Disable colored diagnostics
    #[arg(long)]
    no_color: bool,
}

fn main() -> ExitCode {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }

    if !args.input.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Input path '{}' is not a file!", args.input.display()),
            )
            .exit()
    }

    let contents = match std::fs::read_to_string(&args.input) {
        Ok(contents) => contents,
        Err(error) => Args::command()
            .error(
                ErrorKind::Io,
                format!("Failed to read '{}': {error}", args.input.display()),
            )
            .exit(),
    };

    let source = SourceFile {
        contents,
        origin: SourceFileOrigin::File(args.input.clone()),
    };

    let options = CompileOptions {
        stop_after: args.stage,
        format: args.format,
    };

    let output = match secdc::compile(&source, &options) {
        Ok(output) => output,
        Err(error) => {
            eprint!("{}", error.render(&source));
            return ExitCode::FAILURE;
        }
    };

    match &args.output {
        Some(path) => {
            let text = strip_ansi_escapes::strip_str(output.text());
            if let Err(error) = std::fs::write(path, text) {
                eprintln!("Failed to write '{}': {error}", path.display());
                return ExitCode::FAILURE;
            }
            info!(path = %path.display(), "wrote output");
        }
        None => print!("{}", output.text()),
    }

    ExitCode::SUCCESS
}
