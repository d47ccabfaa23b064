use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use pixel_fiddle::config::FiddleConfig;
use pixel_fiddle::dsl::builtins::{self, BuiltinFn};
use pixel_fiddle::protocol::{RunId, RunRequest, RunResponse, WireRequest, WireResponse};
use pixel_fiddle::raster;
use pixel_fiddle::sandbox::{self, Sandbox};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "pixel-fiddle", about = "Per-pixel expression renderer", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a program to a PNG
    Render {
        /// Program file
        program: PathBuf,
        /// Grid size in pixels (defaults to the configured size)
        #[arg(long)]
        size: Option<i64>,
        /// Output PNG path
        #[arg(long, default_value = "out.png")]
        out: PathBuf,
    },
    /// Compile a program and report diagnostics
    Check {
        /// Program file
        program: PathBuf,
    },
    /// Answer JSON-line run requests on stdin through the sandbox
    Serve,
    /// List the builtin namespaces
    Builtins,
}

// ── Commands ─────────────────────────────────────────────────────

fn read_program(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn render(config: &FiddleConfig, program: &Path, size: Option<i64>, out: &Path, json: bool) -> anyhow::Result<()> {
    let request = RunRequest {
        program: read_program(program)?,
        grid_size: size.unwrap_or_else(|| i64::from(config.default_grid_size)),
    };
    let buffer = match sandbox::execute_request(config, &request) {
        Ok(buffer) => buffer,
        Err(e) => {
            eprintln!("{}", e.user_message());
            process::exit(1);
        }
    };
    let grid_size = buffer.grid_size();
    let image = buffer
        .into_image()
        .context("pixel buffer does not match its grid size")?;
    image
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;

    if json {
        let summary = serde_json::json!({ "gridSize": grid_size, "out": out });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Rendered {grid_size}x{grid_size} to {}", out.display());
    }
    Ok(())
}

fn check(program: &Path, json: bool) -> anyhow::Result<()> {
    let source = read_program(program)?;
    let result = raster::compile(&source);
    if json {
        let summary = match &result {
            Ok(_) => serde_json::json!({ "ok": true }),
            Err(e) => serde_json::json!({ "ok": false, "error": e }),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if let Err(e) = &result {
        println!("{e}");
    } else {
        println!("OK");
    }
    if result.is_err() {
        process::exit(1);
    }
    Ok(())
}

fn builtin_json(ns: &str, f: &BuiltinFn) -> serde_json::Value {
    serde_json::json!({
        "name": format!("{ns}.{}", f.name),
        "params": f.params,
        "variadic": f.variadic,
        "description": f.description,
    })
}

fn print_builtins(json: bool) -> anyhow::Result<()> {
    if !json {
        print!("{}", builtins::reference());
        return Ok(());
    }
    let mut entries: Vec<serde_json::Value> = builtins::MATH_CONSTANTS
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": format!("math.{}", c.name),
                "value": c.value,
                "description": c.description,
            })
        })
        .collect();
    entries.extend(builtins::MATH.iter().map(|f| builtin_json("math", f)));
    entries.extend(builtins::QUERY.iter().map(|f| builtin_json("query", f)));
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

/// One request per stdin line, one response per stdout line. Requests are
/// submitted as they arrive, so `latest` scheduling can drop stale ones.
async fn serve(config: FiddleConfig) -> anyhow::Result<()> {
    let sandbox = Arc::new(Sandbox::spawn(config).context("starting sandbox worker")?);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WireResponse>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = out_rx.recv().await {
            let mut line = serde_json::to_vec(&response)?;
            line.push(b'\n');
            stdout.write_all(&line).await?;
            stdout.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = tokio::task::JoinSet::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: WireRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                let _ = out_tx.send(WireResponse::Error {
                    id: RunId(0),
                    message: format!("Error: malformed request: {e}"),
                });
                continue;
            }
        };
        let (id, request) = request.into_parts();
        let sandbox = Arc::clone(&sandbox);
        let out_tx = out_tx.clone();
        tasks.spawn(async move {
            let response = match sandbox.run(id, request).await {
                Ok(response) => response,
                Err(e) => RunResponse::Error {
                    message: format!("Error: {e}"),
                },
            };
            let _ = out_tx.send(WireResponse::new(id, response));
        });
    }

    while tasks.join_next().await.is_some() {}
    drop(out_tx);
    writer.await??;

    if let Ok(sandbox) = Arc::try_unwrap(sandbox) {
        sandbox.shutdown();
    }
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match FiddleConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => FiddleConfig::default(),
    };

    let result = match cli.command {
        Commands::Render { program, size, out } => render(&config, &program, size, &out, cli.json),
        Commands::Check { program } => check(&program, cli.json),
        Commands::Serve => serve(config).await,
        Commands::Builtins => print_builtins(cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
