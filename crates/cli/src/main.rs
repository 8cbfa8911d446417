//! Monkey CLI - run a program file, dump its bytecode, or start the
//! interactive REPL.

use std::env;
use std::fs;
use std::process::ExitCode;

use monkey_compiler::Compiler;
use monkey_repl::Session;
use monkey_syntax::{eprint_errors, parse, Program};
use monkey_vm::{builtins, disassemble, Value, VM};

const USAGE: &str = "\
Usage: monkey [options] [<filename>] [args...]

Options:
  -v           display version information
  -d           enable debug mode (trace executed instructions)
  -c           compile input and dump bytecode instead of running it
  -i           enable interactive mode (REPL)
  -e <engine>  engine to use (this build ships `vm`)
  -h, --help   show this help message";

struct Options {
    version: bool,
    debug: bool,
    compile_only: bool,
    interactive: bool,
    engine: String,
    filename: Option<String>,
    args: Vec<String>,
}

fn parse_options(mut args: env::Args) -> Result<Options, String> {
    let mut options = Options {
        version: false,
        debug: false,
        compile_only: false,
        interactive: false,
        engine: "vm".to_string(),
        filename: None,
        args: Vec::new(),
    };

    args.next(); // program name

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-v" => options.version = true,
            "-d" => options.debug = true,
            "-c" => options.compile_only = true,
            "-i" => options.interactive = true,
            "-e" => {
                options.engine = args
                    .next()
                    .ok_or_else(|| "option -e requires an argument".to_string())?;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => {
                return Err(format!("unknown option: {}", flag));
            }
            _ => {
                options.filename = Some(arg);
                // Everything after the filename belongs to the program.
                options.args = args.by_ref().collect();
            }
        }
    }

    if options.engine != "vm" {
        return Err(format!(
            "unsupported engine: {} (this build ships `vm`)",
            options.engine
        ));
    }

    Ok(options)
}

fn load_program(filename: &str) -> Result<(String, Program), ExitCode> {
    let source = match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {}: {}", filename, err);
            return Err(ExitCode::FAILURE);
        }
    };

    let (program, errors) = parse(&source);
    if !errors.is_empty() {
        eprint_errors(&errors, filename, &source);
        return Err(ExitCode::FAILURE);
    }
    match program {
        Some(program) => Ok((source, program)),
        None => {
            eprintln!("error parsing {}", filename);
            Err(ExitCode::FAILURE)
        }
    }
}

/// Indent a block of text with an indent string.
fn indent(text: &str, indent: &str) -> String {
    text.trim_end_matches('\n')
        .lines()
        .map(|line| format!("{}{}\n", indent, line))
        .collect()
}

fn dump_bytecode(filename: &str) -> Result<(), ExitCode> {
    let (source, program) = load_program(filename)?;

    let mut compiler = Compiler::new();
    if let Err(err) = compiler.compile(&program) {
        err.to_source_error().eprint(filename, &source);
        return Err(ExitCode::FAILURE);
    }

    let bytecode = compiler.bytecode();
    println!("Main:\n{}", disassemble(&bytecode.instructions));

    println!("Constants:");
    for (i, constant) in bytecode.constants.iter().enumerate() {
        println!("{:04} {}", i, constant.inspect());
        if let Value::Function(func) = constant {
            print!("{}", indent(&disassemble(&func.instructions), "     "));
        }
    }

    Ok(())
}

fn run_file(filename: &str, debug: bool) -> Result<(), ExitCode> {
    let (source, program) = load_program(filename)?;

    let mut compiler = Compiler::new();
    if let Err(err) = compiler.compile(&program) {
        err.to_source_error().eprint(filename, &source);
        return Err(ExitCode::FAILURE);
    }

    let mut vm = VM::new(compiler.bytecode());
    vm.debug = debug;
    if let Err(err) = vm.run() {
        eprintln!("runtime error: {}", err);
        return Err(ExitCode::FAILURE);
    }

    Ok(())
}

fn main() -> ExitCode {
    let options = match parse_options(env::args()) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{}\n\n{}", err, USAGE);
            return ExitCode::FAILURE;
        }
    };

    if options.version {
        println!("monkey {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let mut program_args = options.args.clone();
    if let Some(filename) = &options.filename {
        program_args.insert(0, filename.clone());
    }
    builtins::set_arguments(program_args);

    if options.compile_only {
        return match &options.filename {
            Some(filename) => match dump_bytecode(filename) {
                Ok(()) => ExitCode::SUCCESS,
                Err(code) => code,
            },
            None => {
                eprintln!("no source file given to compile\n\n{}", USAGE);
                ExitCode::FAILURE
            }
        };
    }

    if let Some(filename) = &options.filename {
        if let Err(code) = run_file(filename, options.debug) {
            return code;
        }
        if !options.interactive {
            return ExitCode::SUCCESS;
        }
    }

    let mut session = Session::new();
    session.debug = options.debug;
    monkey_repl::run(&mut session);

    ExitCode::SUCCESS
}
