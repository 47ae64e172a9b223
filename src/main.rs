use clap::{value_parser, Arg, ArgAction, Command};
use std::fs;
use std::path::Path;
use std::process;

use lark::evaluator::{EvaluatorConfig, DEFAULT_MAX_DEPTH};
use lark::{logging, repl, runner};

fn main() {
    let matches = Command::new("lark")
        .about("A small dynamically-typed scripting language with scoped defers")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("file")
                .help("The script file to execute; without one the REPL starts")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .help("Maximum scope nesting depth before evaluation aborts [default: 512]")
                .value_name("N")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log evaluator activity to stderr (RUST_LOG overrides)")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if let Err(error) = logging::init(matches.get_flag("verbose")) {
        eprintln!("Warning: logging disabled: {}", error);
    }

    let config = EvaluatorConfig {
        max_depth: matches
            .get_one::<usize>("max-depth")
            .copied()
            .unwrap_or(DEFAULT_MAX_DEPTH),
    };

    let status = match matches.get_one::<String>("file") {
        Some(file_path) => run_file(file_path, &config),
        None => repl::start(&config),
    };
    process::exit(status);
}

fn run_file(path: &str, config: &EvaluatorConfig) -> i32 {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        return 1;
    }

    match fs::read_to_string(path) {
        Ok(source) => {
            let filename = path.display().to_string();
            runner::run(&source, Some(&filename), config)
        }
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            1
        }
    }
}
