//! Blog rendering E2E runner - entry point
//!
//! Exit status: 0 when every selected case passes, 1 when any fails,
//! 2 when the harness itself cannot run.

use std::path::PathBuf;
use std::process::ExitCode;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use blog_render_e2e::playwright::Browser;
use blog_render_e2e::{CaseFilter, E2eResult, RunnerConfig, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "blog-render-e2e")]
#[command(about = "Checks KaTeX and Mermaid rendering on the blog in a real browser")]
#[command(version)]
struct Args {
    /// Configuration file (TOML); defaults apply when it does not exist
    #[arg(short, long, default_value = "e2e.toml")]
    config: PathBuf,

    /// Base URL of the running site
    #[arg(long, env = "E2E_BASE_URL")]
    base_url: Option<String>,

    /// Serve this built site directory locally instead of using --base-url
    #[arg(long)]
    serve_dir: Option<PathBuf>,

    /// Port for --serve-dir (0 = auto)
    #[arg(long)]
    port: Option<u16>,

    /// Load YAML suites from this directory instead of the built-in ones
    #[arg(short, long)]
    specs: Option<PathBuf>,

    /// Run only tests carrying this tag (`desktop` or `@desktop`)
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only tests whose "Suite › name" title matches this regex
    #[arg(short, long)]
    grep: Option<String>,

    /// Number of tests run in parallel
    #[arg(short, long)]
    workers: Option<usize>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Output directory for results and failure screenshots
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List the selected tests and exit
    #[arg(long)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let json = matches!(args.log_format, LogFormat::Json);
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            return ExitCode::from(2);
        }
    };

    let outcome = rt.block_on(async_main(args));
    if let Err(e) = &outcome {
        error!("{}", e);
    }
    ExitCode::from(exit_status(&outcome))
}

/// 0 all passed, 1 some case failed, 2 the run itself failed
fn exit_status(outcome: &E2eResult<bool>) -> u8 {
    match outcome {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(_) => 2,
    }
}

fn build_config(args: &Args) -> E2eResult<RunnerConfig> {
    let mut config = RunnerConfig::load(&args.config)?;

    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(dir) = &args.serve_dir {
        config.server.serve_dir = Some(dir.clone());
    }
    if let Some(port) = args.port {
        config.server.port = (port != 0).then_some(port);
    }
    if let Some(specs) = &args.specs {
        config.specs_dir = Some(specs.clone());
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(browser) = &args.browser {
        config.playwright.browser = browser.parse::<Browser>()?;
    }
    if args.headed {
        config.playwright.headless = false;
    }
    if let Some(output) = &args.output {
        config = config.with_output_dir(output.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let config = build_config(&args)?;
    let filter = CaseFilter::new(args.tag.clone(), args.grep.as_deref())?;
    let mut runner = TestRunner::with_config(config);

    if args.list {
        let (cases, skipped) = filter.select(runner.load_cases()?);
        for case in &cases {
            println!("{}  [{}]", case.title(), case.tags.join(", "));
        }
        info!("{} test(s) selected, {} skipped", cases.len(), skipped);
        return Ok(true);
    }

    let results = runner.run_filtered(&filter).await?;
    runner.write_results(&results)?;

    for failed in results.results.iter().filter(|r| !r.success) {
        println!(
            "FAILED {}: {}",
            failed.name,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!(
        "{} passed, {} failed, {} skipped ({} ms)",
        results.passed, results.failed, results.skipped, results.duration_ms
    );

    Ok(results.success())
}
