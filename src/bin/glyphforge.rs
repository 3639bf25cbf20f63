//! glyphforge CLI
//!
//! Builds pipeline targets by name. Each positional argument is a target id
//! (a task name like `ttf`, or an output path); with no arguments the
//! release target `start` is built.

use std::path::PathBuf;

use glyphforge::engine::{BuildEngine, EngineConfig};
use glyphforge::journal::Journal;
use glyphforge::pipeline::{Pipeline, DEFAULT_PREFIX};

/// CLI configuration
struct Config {
    /// Targets to build, in order
    targets: Vec<String>,
    /// External process ceiling override
    jobs: Option<usize>,
    /// Journal file location
    journal: PathBuf,
    /// Project root to build in
    root: Option<PathBuf>,
    /// Output name prefix
    prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            jobs: None,
            journal: PathBuf::from("build/.glyphforge-journal"),
            root: None,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--jobs" | "-j" => {
                if i + 1 < args.len() {
                    let jobs: usize = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("error: invalid job count: {}", args[i + 1]);
                        std::process::exit(1);
                    });
                    config.jobs = Some(jobs);
                    i += 2;
                } else {
                    eprintln!("error: --jobs requires a value");
                    std::process::exit(1);
                }
            }
            "--journal" => {
                if i + 1 < args.len() {
                    config.journal = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    eprintln!("error: --journal requires a value");
                    std::process::exit(1);
                }
            }
            "--root" => {
                if i + 1 < args.len() {
                    config.root = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --root requires a value");
                    std::process::exit(1);
                }
            }
            "--prefix" => {
                if i + 1 < args.len() {
                    config.prefix = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("error: --prefix requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                println!("glyphforge - incremental font pipeline builder");
                println!();
                println!("USAGE:");
                println!("    glyphforge [OPTIONS] [TARGET...]");
                println!();
                println!("ARGS:");
                println!("    TARGET...    Targets to build [default: start]");
                println!();
                println!("OPTIONS:");
                println!("    -j, --jobs <N>        Max concurrent external processes [default: CPU count]");
                println!("        --journal <PATH>  Journal file [default: build/.glyphforge-journal]");
                println!("        --root <DIR>      Project root to build in [default: .]");
                println!("        --prefix <NAME>   Output name prefix [default: sarasa]");
                println!("    -h, --help            Print help information");
                std::process::exit(0);
            }
            arg if arg.starts_with('-') => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
            target => {
                config.targets.push(target.to_string());
                i += 1;
            }
        }
    }

    config
}

fn main() {
    let config = parse_args();

    if let Some(root) = &config.root {
        if let Err(e) = std::env::set_current_dir(root) {
            eprintln!("error: cannot enter '{}': {e}", root.display());
            std::process::exit(1);
        }
    }

    let registry = match Pipeline::new(config.prefix.clone()).build_registry() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("error: broken rule table: {e}");
            std::process::exit(1);
        }
    };

    let journal = match Journal::open(&config.journal) {
        Ok(journal) => journal,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let mut engine_config = EngineConfig::default();
    if let Some(jobs) = config.jobs {
        engine_config.jobs = jobs;
    }
    let engine = BuildEngine::new(registry, journal, engine_config);

    let targets = if config.targets.is_empty() {
        vec!["start".to_string()]
    } else {
        config.targets.clone()
    };
    let refs: Vec<&str> = targets.iter().map(String::as_str).collect();

    match engine.build_all(&refs) {
        Ok(_) => {
            if let Err(e) = engine.journal().compact() {
                eprintln!("warning: {e}");
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
