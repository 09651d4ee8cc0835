use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod console;
mod pages;
mod shell;

use console::{load_console, ConsoleFile};
use shell::{parse_line, DiscardPolicy, Shell};

#[derive(Parser)]
#[command(name = "reviewdesk", version, about = "Headless review console router")]
struct Cli {
    #[arg(
        long,
        default_value = "console.yaml",
        help = "Console definition (router settings, session, translations, routes)"
    )]
    console: PathBuf,

    #[arg(long, help = "Also write daily-rotated logs into this directory")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Validate the console definition")]
    Validate,
    #[command(about = "List registered routes and their guards")]
    Routes,
    #[command(about = "Drive the router from a script or stdin, one command per line")]
    Run {
        #[arg(long, help = "Read commands from this file instead of stdin")]
        script: Option<PathBuf>,
        #[arg(long, default_value = "", help = "Initial location fragment, e.g. '#/dashboard'")]
        start: String,
        #[arg(long, value_enum, default_value = "no", help = "How to answer discard prompts")]
        discard: DiscardPolicy,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref())?;

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate => {
            let console = load_console(&cli.console)?;
            println!(
                "Console valid. {} routes, {} translations, login at {}.",
                console.routes.len(),
                console.translations.len(),
                console.router.login_path
            );
        }
        Commands::Routes => {
            let console = load_console(&cli.console)?;
            print_routes(&console);
        }
        Commands::Run {
            script,
            start,
            discard,
        } => {
            let console = load_console(&cli.console)?;
            run(&console, script.as_deref(), &start, discard).await?;
        }
    }

    Ok(())
}

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log dir: {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, "reviewdesk.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn print_routes(console: &ConsoleFile) {
    for route in &console.routes {
        let access = match &route.allowed_roles {
            Some(roles) => roles
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(","),
            None if route.auth_required => "signed-in".to_string(),
            None => "public".to_string(),
        };
        println!("{:<28} {:<24} {access}", route.path, route.title);
    }
}

async fn run(
    console: &ConsoleFile,
    script: Option<&Path>,
    start: &str,
    discard: DiscardPolicy,
) -> Result<()> {
    let shell = Shell::start(console, discard, start)?;
    let mut out = std::io::stdout();
    shell.boot(&mut out).await?;

    match script {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read script: {}", path.display()))?;
            for line in content.lines() {
                run_line(&shell, line, &mut out).await?;
            }
        }
        None => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                run_line(&shell, &line, &mut out).await?;
            }
        }
    }

    tracing::debug!(route = ?shell.handle().current_route(), "input exhausted");
    shell.shutdown().await
}

/// Bad commands are reported and skipped; a stuck router aborts the run.
async fn run_line(shell: &Shell, line: &str, out: &mut std::io::Stdout) -> Result<()> {
    match parse_line(line) {
        None => Ok(()),
        Some(Err(err)) => {
            eprintln!("error: {err}");
            Ok(())
        }
        Some(Ok(command)) => shell.execute(command, out).await,
    }
}
