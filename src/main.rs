use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

use stackpuzzle::bytecode::disasm::listing;
use stackpuzzle::frontend::token_dumper::TokenDumper;
use stackpuzzle::{
    Assembly, BytecodeImage, Diagnostic, Lexer, Puzzle, RunInput, SourceMap, VmBc, VmBcConfig,
    assemble, validate,
};

#[derive(Parser, Debug)]
#[command(
    name = "stackpuzzle",
    version,
    about = "Assembler and virtual machine for stack machine puzzles"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble and execute a program once
    Run {
        file: PathBuf,
        /// Comma-separated input queue
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        input: Vec<i8>,
        /// Comma-separated expected output; checked as the program runs
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        expect: Option<Vec<i8>>,
        /// Print a listing of the bytecode before running
        #[arg(long)]
        decompile: bool,
        /// Seed for RNG
        #[arg(long)]
        seed: Option<u64>,
        /// Stop with an error after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
        /// FILE is an image written by `build` rather than source
        #[arg(long)]
        image: bool,
    },
    /// Assemble once and execute every run of a puzzle
    Validate {
        file: PathBuf,
        puzzle: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        /// Cycle budget for runs that do not set their own
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Assemble into an image file
    Build {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show the tokens of a source file
    Tokens {
        file: PathBuf,
        #[arg(long)]
        no_color: bool,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            file,
            input,
            expect,
            decompile,
            seed,
            max_cycles,
            image,
        } => {
            let assembly = if image {
                load_image(&file)
            } else {
                assemble_file(&file)
            };
            if decompile {
                print!("{}", listing(&assembly.image));
            }
            let run = RunInput {
                input,
                expected_output: expect,
                initial_stack: Vec::new(),
            };
            run_program(assembly, run, VmBcConfig { max_cycles, seed });
        }
        Command::Validate {
            file,
            puzzle,
            seed,
            max_cycles,
        } => {
            let assembly = assemble_file(&file);
            let puzzle = Puzzle::load(&puzzle).unwrap_or_else(|e| fail(&e.to_string()));
            validate_program(&assembly, &puzzle, VmBcConfig { max_cycles, seed });
        }
        Command::Build { file, output } => {
            let assembly = assemble_file(&file);
            let bytes = assembly
                .image
                .to_postcard()
                .unwrap_or_else(|e| fail(&e.to_string()));
            if let Err(e) = fs::write(&output, bytes) {
                fail(&format!("Failed to write '{}': {}", output.display(), e));
            }
            println!(
                "wrote {} ({} code bytes)",
                output.display(),
                assembly.image.code_len()
            );
        }
        Command::Tokens { file, no_color } => {
            let source = read_source(&file);
            let tokens = Lexer::new(&source).tokenize().unwrap_or_else(|e| {
                let map = SourceMap::new(source.as_str());
                fail(&Diagnostic::lexer(&e, &map).to_string())
            });
            let mut dumper = TokenDumper::new();
            if no_color {
                dumper = dumper.no_color();
            }
            dumper.dump(&tokens, &SourceMap::new(source.as_str()));
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

fn read_source(path: &Path) -> String {
    fs::read_to_string(path)
        .unwrap_or_else(|e| fail(&format!("Failed to read '{}': {}", path.display(), e)))
}

fn assemble_file(path: &Path) -> Assembly {
    let source = read_source(path);
    match assemble(&source) {
        Ok(assembly) => assembly,
        Err(e) => {
            for diag in e.diagnostics(&source) {
                eprintln!("{}", diag);
            }
            std::process::exit(1);
        }
    }
}

/// Images carry no source, so runtime errors from them are unpositioned.
fn load_image(path: &Path) -> Assembly {
    let bytes = fs::read(path)
        .unwrap_or_else(|e| fail(&format!("Failed to read '{}': {}", path.display(), e)));
    let image = BytecodeImage::from_postcard(&bytes).unwrap_or_else(|e| fail(&e.to_string()));
    Assembly {
        image,
        source_map: SourceMap::default(),
    }
}

fn run_program(assembly: Assembly, run: RunInput, config: VmBcConfig) {
    let budget = config.max_cycles;
    let mut vm = VmBc::with_config(assembly.image, run, config);
    let result = vm.run_to_end(budget);
    debug!(cycles = vm.cycles(), "run finished");

    println!("{:?}", vm.output());
    if let Err(e) = result {
        fail(&Diagnostic::runtime(&e, &assembly.source_map).to_string());
    }
}

fn validate_program(assembly: &Assembly, puzzle: &Puzzle, config: VmBcConfig) {
    let report = validate(puzzle, assembly, &config);

    println!("{}", report.puzzle);
    for run in &report.runs {
        let status = if run.passed { "PASS" } else { "FAIL" };
        println!("  run {}: {} ({} cycles)", run.index + 1, status, run.cycles);
        if let Some(diagnostic) = &run.diagnostic {
            for line in diagnostic.lines() {
                println!("    {}", line);
            }
        }
    }
    println!(
        "{}/{} runs passed, size {} (goal {}), {} total cycles",
        report.passed_count(),
        report.runs.len(),
        report.size,
        report.size_goal,
        report.total_cycles()
    );

    if !report.passed() {
        std::process::exit(1);
    }
}
