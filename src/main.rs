//! remote-test - run test classes and report them to a remote server
//!
//! ## Usage
//!
//! ```bash
//! # Print every event runners send to port 7000
//! remote-test serve --port 7000 --loop
//!
//! # Run test classes against that server
//! remote-test run -classnames demo.Arithmetic demo.Assertions -port 7000
//!
//! # Load runner settings from a file, then override the port
//! remote-test run -file runner.properties -port 7001
//!
//! # List the built-in test classes
//! remote-test list
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, info};

use remote_test::cli::{self, Args, ClientArgs};
use remote_test::config::{env::print_env_help, ClientConfig, EnvConfig};
use remote_test::demo;
use remote_test::engine::{Test, TestFactory};
use remote_test::executor::TestRunner;
use remote_test::output::{ConsoleListener, OutputFormat};
use remote_test::server::Server;
use remote_test::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        cli::Command::Serve(serve_args) => {
            init_logger(LogLevel::for_verbosity(args.verbose));
            serve(serve_args).await?;
        }
        cli::Command::Run(run_args) => {
            let successful = run(run_args, args.verbose).await?;
            if !successful {
                std::process::exit(1);
            }
        }
        cli::Command::List => {
            list_classes();
        }
    }

    Ok(())
}

async fn serve(args: cli::ServeArgs) -> Result<()> {
    let format = OutputFormat::from_str(&args.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format: {}", args.format))?;

    let server = Arc::new(Server::new(args.port));
    server
        .dispatcher()
        .add_listener(Arc::new(ConsoleListener::stdout(format)));
    let addr = server.bind().await.context("Failed to start server")?;
    info!("Waiting for test runners on port {}", addr.port());

    let mut running = {
        let server = server.clone();
        let looping = args.looping;
        tokio::spawn(async move { server.start(looping).await })
    };

    let mut cancel_sent = false;
    loop {
        tokio::select! {
            result = &mut running => {
                server.shutdown().await;
                result.context("Server task failed")??;
                return Ok(());
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                if cancel_sent || !server.is_running() {
                    info!("Shutting down");
                    break;
                }
                info!("Asking the runner to stop, press Ctrl-C again to quit");
                server.cancel().await;
                cancel_sent = true;
            }
        }
    }

    server.shutdown().await;
    running.await.context("Server task failed")??;
    Ok(())
}

/// Returns whether every test passed
async fn run(args: cli::RunArgs, verbose: bool) -> Result<bool> {
    let env = EnvConfig::load();
    let mut base = ClientConfig::default();
    env.apply(&mut base);
    let config = ClientArgs::parse(&args.args, base).context("Invalid runner arguments")?;

    init_logger(LogLevel::for_verbosity(verbose || config.debug));
    if env.has_any() {
        debug!("Applied environment overrides: {:?}", env);
    }

    let runner = TestRunner::new(config, Arc::new(demo::registry()));
    let report = runner.run().await?;

    println!("\n{}", report.summary);
    println!("Success rate: {:.1}%", report.summary.success_rate());
    if report.stopped {
        println!("Run {} was stopped by the server", report.correlation_id);
    }
    Ok(report.summary.is_successful() && !report.stopped)
}

fn list_classes() {
    let registry = demo::registry();

    println!("\nTest classes ({} total)\n", registry.len());
    println!("──────────────────────────────────────────────────────────────────────");
    for name in registry.names() {
        let count = registry
            .create(name)
            .map(|test| test.count_test_cases())
            .unwrap_or_default();
        println!("  {name:24} {count} tests");
    }
    println!("──────────────────────────────────────────────────────────────────────\n");

    print_env_help();
}
