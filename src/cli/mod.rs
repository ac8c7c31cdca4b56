//! CLI argument parsing
//!
//! Defines command-line interface using clap.

mod client_args;

pub use client_args::{ArgsError, ClientArgs};

use clap::{Parser, Subcommand};

/// Port the server listens on when none is given
pub const DEFAULT_SERVER_PORT: u16 = 7000;

/// Remote test execution with live event reporting
#[derive(Parser, Debug)]
#[command(name = "remote-test")]
#[command(author = "hephaex@gmail.com")]
#[command(version = "0.1.0")]
#[command(about = "Run test classes in-process and stream their events to a remote server")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive and print events from test runners
    Serve(ServeArgs),

    /// Run test classes and report to a server
    Run(RunArgs),

    /// List the test classes this binary can run
    List,
}

/// Arguments for serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
    pub port: u16,

    /// Keep accepting runners after the first one disconnects
    #[arg(long = "loop")]
    pub looping: bool,

    /// Output format (plain, json)
    #[arg(short, long, default_value = "plain")]
    pub format: String,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Runner arguments: -classnames <name>... -port <n> -host <name> -debug -file <path>
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let args = Args::parse_from(["remote-test", "serve"]);
        match args.command {
            Command::Serve(serve) => {
                assert_eq!(serve.port, DEFAULT_SERVER_PORT);
                assert!(!serve.looping);
                assert_eq!(serve.format, "plain");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_serve_loop() {
        let args = Args::parse_from(["remote-test", "-v", "serve", "--port", "7100", "--loop"]);
        assert!(args.verbose);
        match args.command {
            Command::Serve(serve) => {
                assert_eq!(serve.port, 7100);
                assert!(serve.looping);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_keeps_raw_arguments() {
        let args = Args::parse_from([
            "remote-test",
            "run",
            "-classnames",
            "demo.Arithmetic",
            "-port",
            "7000",
        ]);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.args, ["-classnames", "demo.Arithmetic", "-port", "7000"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
