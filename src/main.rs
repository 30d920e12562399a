use anyhow::{Context, Result};
use std::io::Read;
use std::path::PathBuf;
use tracing::{error, info};

use clepho_search::catalog::Catalog;
use clepho_search::{logging, CancellationToken, Config, SearchEngine};

#[derive(Default)]
struct Args {
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    stats: bool,
    /// Request file; `-` or absent reads stdin.
    request: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("clepho-search {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" | "--db" => {
                if i + 1 < args.len() {
                    let path = PathBuf::from(&args[i + 1]);
                    if args[i] == "--db" {
                        parsed.db_path = Some(path);
                    } else {
                        parsed.config_path = Some(path);
                    }
                    i += 1;
                } else {
                    eprintln!("Error: {} requires a path argument", args[i]);
                    std::process::exit(1);
                }
            }
            "--stats" => parsed.stats = true,
            "-" => parsed.request = None,
            arg if !arg.starts_with('-') && parsed.request.is_none() => {
                parsed.request = Some(PathBuf::from(arg));
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"clepho-search - faceted search over a clepho photo catalog

USAGE:
    clepho-search [OPTIONS] [REQUEST.json | -]

Reads a JSON search request from the given file (or stdin) and prints the
JSON response. On failure the JSON error body is printed and the exit code
is 1.

OPTIONS:
    --config, -c PATH   Path to config file
    --db PATH           Catalog database (overrides db_path in the config)
    --stats             Print index statistics instead of searching
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    CLEPHO_SEARCH_CONFIG  Path to config file (overrides default location)
    CLEPHO_SEARCH_LOG     Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/clepho/search.toml"#
    );
}

fn read_request(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request {:?}", path)),
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read request from stdin")?;
            Ok(body)
        }
    }
}

fn main() -> Result<()> {
    let args = parse_args();

    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let mut config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }

    let catalog = Catalog::open(&config.db_path)?;
    catalog.initialize()?;
    let index = catalog.load_index(&config.index)?;
    info!(
        "Catalog {:?} indexed: {} of {} photos",
        config.db_path,
        index.len(),
        catalog.photo_count()?
    );

    if args.stats {
        println!("{}", serde_json::to_string_pretty(&index.stats())?);
        return Ok(());
    }

    let body = read_request(args.request.as_ref())?;
    let engine = SearchEngine::new(index, &config);
    match engine.search_json(&body, &CancellationToken::new()) {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            error!("Search failed: {}", e);
            println!("{}", serde_json::to_string_pretty(&e.to_body())?);
            std::process::exit(1);
        }
    }
}
