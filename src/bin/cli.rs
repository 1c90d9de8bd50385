//! Sandbox Engine CLI
//!
//! Run snippets in the sandbox, check the daemon, build the chart image and
//! inspect the effective configuration.

use clap::{Parser, Subcommand};
use console::style;
use sandbox_engine::config::{config_path, validate_config, Config};
use sandbox_engine::sandbox::{ExecutionRequest, LanguageKind, MimeKind, SandboxEngine};
use sandbox_engine::{Error, Result, VERSION};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sandbox-engine",
    author = "Sandbox Engine Contributors",
    version = VERSION,
    about = "Run untrusted code in resource-bounded, network-isolated containers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute code in the sandbox
    Run {
        /// Language kind (python, python-with-charts, node)
        language: String,
        /// Code to execute
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        code: Option<String>,
        /// Read the code from a file instead
        #[arg(long, short)]
        file: Option<PathBuf>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether the container daemon is reachable
    Health,

    /// Build the locally built chart image
    BuildImage,

    /// Show the effective configuration and any validation issues
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sandbox_engine=info".parse().map_err(|e| {
                    Error::Config(format!("Invalid log directive: {}", e))
                })?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            language,
            code,
            file,
            json,
        }) => run_code(&language, code, file, json).await,
        Some(Commands::Health) => check_health().await,
        Some(Commands::BuildImage) => build_image().await,
        Some(Commands::Config) => show_config(),
        None => check_health().await,
    }
}

/// Load the configuration and refuse to continue when it is invalid
fn load_config() -> Result<Config> {
    let config = Config::from_env()?;
    let validation = validate_config(&config).ensure_valid()?;
    for issue in &validation.warnings {
        eprintln!("   {} {}", style("!").yellow(), issue);
    }
    Ok(config)
}

async fn run_code(
    language: &str,
    code: Option<String>,
    file: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let language: LanguageKind = language.parse()?;
    let code = match (code, file) {
        (_, Some(path)) => tokio::fs::read_to_string(&path).await?,
        (Some(code), None) => code,
        (None, None) => return Err(Error::InvalidInput("No code given".to_string())),
    };

    let config = load_config()?;
    let engine = SandboxEngine::connect(config.sandbox)?;

    if !json {
        println!("{}", style(format!("Executing {} code...", language)).dim());
    }

    let result = engine.execute(ExecutionRequest::new(code, language)).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if !result.output.is_empty() {
            println!("\n{}", style("Output:").bold());
            print!("{}", result.output);
            if !result.output.ends_with('\n') {
                println!();
            }
        }
        if let Some(error) = &result.error {
            println!("\n{} {}", style("✗").red(), style("Execution failed:").red().bold());
            println!("{}", error);
        }
        for file in &result.files {
            let kind = match file.kind {
                MimeKind::Image => "image",
                MimeKind::Text => "text",
            };
            println!(
                "   {} {} ({}, {})",
                style("•").cyan(),
                file.name,
                file.mime_type,
                kind
            );
        }
        println!(
            "\n{}",
            style(format!("Time: {}ms", result.execution_time_millis)).dim()
        );
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn check_health() -> Result<()> {
    let config = load_config()?;
    let engine = SandboxEngine::connect(config.sandbox)?;
    let report = engine.health().report().await;

    if report.docker {
        println!("   {} {}", style("✓").green(), report.info);
    } else {
        println!("   {} {}", style("✗").red(), report.info);
        std::process::exit(1);
    }
    Ok(())
}

async fn build_image() -> Result<()> {
    let config = load_config()?;
    let engine = SandboxEngine::connect(config.sandbox)?;

    if !engine.health().probe().await {
        return Err(Error::DaemonUnavailable(
            "Docker is not running. Please start Docker.".to_string(),
        ));
    }

    println!("{}", style("Building sandbox image (this can take a few minutes)...").dim());
    let tag = engine.images().build_local_image().await?;
    println!("   {} Built {}", style("✓").green(), style(tag).cyan());
    Ok(())
}

fn show_config() -> Result<()> {
    let config = Config::from_env()?;
    let path = config_path();

    println!("{}", style("Sandbox Engine Configuration").cyan().bold());
    println!(
        "{}",
        style(format!("  file: {}", path.display())).dim()
    );
    println!("{}", serde_json::to_string_pretty(&config)?);

    let validation = validate_config(&config);
    for issue in &validation.errors {
        println!("   {} {}", style("✗").red(), issue);
    }
    for issue in &validation.warnings {
        println!("   {} {}", style("!").yellow(), issue);
    }
    if validation.valid {
        println!("   {} Configuration is valid", style("✓").green());
    }
    Ok(())
}
