use clap::{Parser, Subcommand};
use n1qlite::cli as prog_cli;
use n1qlite::config::ContextConfig;
use n1qlite::n1ql::NamingConvention;
use std::path::PathBuf;

fn load_config(cli: &Cli) -> Result<ContextConfig, Box<dyn std::error::Error>> {
    // Precedence: CLI > env > config file > defaults
    let mut paths: Vec<PathBuf> = vec![];
    if let Some(p) = &cli.config {
        paths.push(p.clone());
    }
    if let Ok(p) = std::env::var("N1QLITE_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join("n1qlite.toml"));
    }
    let mut cfg = ContextConfig::default();
    if let Some(p) = paths.into_iter().find(|p| p.exists()) {
        cfg = ContextConfig::load(&p)?;
    } else if let Some(p) = &cli.config {
        return Err(format!("config file not found: {}", p.display()).into());
    }
    cfg.apply_env();
    if let Some(b) = &cli.bucket {
        cfg.bucket.clone_from(b);
    }
    if let Some(n) = &cli.naming {
        cfg.naming = n.parse::<NamingConvention>()?;
    }
    Ok(cfg)
}

#[derive(Parser, Debug)]
#[command(name = "n1qlite", version, about = "Compile query models to N1QL", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). If omitted, ./n1qlite.toml or defaults are used.")]
    config: Option<PathBuf>,
    #[arg(long, help = "Override the default bucket. Takes precedence over config/env.")]
    bucket: Option<String>,
    #[arg(long, help = "Naming convention: as-is|camelCase|snake_case")]
    naming: Option<String>,
    #[arg(long, help = "Print machine-readable JSON")]
    json: bool,
    #[arg(long, help = "Print terse key=value output")]
    plain: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Compile a JSON query model and print the statement")]
    Compile {
        #[arg(help = "Path to the query model JSON")]
        model: PathBuf,
    },
    #[command(about = "Compile a query model with an EXPLAIN prefix")]
    Explain {
        #[arg(help = "Path to the query model JSON")]
        model: PathBuf,
    },
    #[command(about = "Execute a query model against a canned store response")]
    Run {
        #[arg(help = "Path to the query model JSON")]
        model: PathBuf,
        #[arg(help = "Path to a query response JSON ({status, rows, errors})")]
        response: PathBuf,
        #[arg(long, help = "Return change-tracked documents with their keys")]
        tracked: bool,
    },
    #[command(about = "Print the effective configuration")]
    Config,
}

fn main() {
    let cli = Cli::parse();
    if std::env::var_os("N1QLITE_LOG_DIR").is_some()
        && let Err(e) = n1qlite::utils::logger::configure_from_env()
    {
        eprintln!("warning: logging not configured: {e}");
    }
    let cfg = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    let mode = if cli.json {
        prog_cli::OutputMode::Json
    } else if cli.plain {
        prog_cli::OutputMode::Plain
    } else {
        prog_cli::OutputMode::Human
    };
    let cmd = match cli.command {
        Commands::Compile { model } => prog_cli::Command::Compile { model },
        Commands::Explain { model } => prog_cli::Command::Explain { model },
        Commands::Run { model, response, tracked } => prog_cli::Command::Run { model, response, tracked },
        Commands::Config => prog_cli::Command::Config,
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = prog_cli::run_with_format(&cfg, cmd, mode, &mut out) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
