//! Runner argument parsing
//!
//! Runner flags are applied in command-line order, so a settings file loaded
//! with `-file` overrides the flags before it and is overridden by the flags
//! after it. Both `-flag` and `--flag` spellings are accepted.

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::config::{ClientConfig, ConfigError, FileSettings};

const FLAGS: [&str; 5] = ["classnames", "port", "host", "debug", "file"];

#[derive(Error, Debug)]
pub enum ArgsError {
    #[error(transparent)]
    Parse(#[from] clap::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One setting at its position on the command line
#[derive(Debug, PartialEq, Eq)]
enum Setting {
    ClassName(String),
    Port(u16),
    Host(String),
    File(PathBuf),
}

pub struct ClientArgs;

impl ClientArgs {
    /// Apply `args` on top of `base`
    pub fn parse<I, S>(args: I, base: ClientConfig) -> Result<ClientConfig, ArgsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args
            .into_iter()
            .filter_map(|arg| normalize(arg.as_ref()))
            .collect();
        let matches = command().try_get_matches_from(drop_empty_classnames(args))?;
        if let Some(ignored) = matches.get_many::<String>("ignored") {
            for arg in ignored {
                debug!("Ignoring argument {:?}", arg);
            }
        }

        let mut config = base;
        for setting in ordered_settings(&matches) {
            match setting {
                Setting::ClassName(name) => config.class_names.push(name),
                Setting::Port(port) => config.port = Some(port),
                Setting::Host(host) => config.host = host,
                Setting::File(path) => config.apply_file(FileSettings::load(&path)?),
            }
        }
        if matches.get_flag("debug") {
            config.debug = true;
        }
        Ok(config)
    }
}

fn command() -> Command {
    Command::new("run")
        .no_binary_name(true)
        .disable_help_flag(true)
        .arg(
            Arg::new("classnames")
                .long("classnames")
                .num_args(1..)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_parser(value_parser!(u16))
                .action(ArgAction::Append),
        )
        .arg(Arg::new("host").long("host").action(ArgAction::Append))
        .arg(Arg::new("debug").long("debug").action(ArgAction::SetTrue))
        .arg(
            Arg::new("file")
                .long("file")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append),
        )
        .arg(Arg::new("ignored").num_args(0..).action(ArgAction::Append))
}

/// Rewrite `-Flag` and `--Flag` to `--flag` for the known flags. Other
/// flags are dropped; plain values are kept as they are.
fn normalize(arg: &str) -> Option<String> {
    let name = arg.trim_start_matches('-');
    let dashes = arg.len() - name.len();
    if dashes == 0 {
        return Some(arg.to_string());
    }

    let lower = name.to_lowercase();
    if dashes <= 2 && FLAGS.contains(&lower.as_str()) {
        Some(format!("--{lower}"))
    } else {
        debug!("Ignoring unknown flag {:?}", arg);
        None
    }
}

/// Drop a `--classnames` with no names after it, so it neither fails the
/// parse nor takes an index that belongs to a later occurrence.
fn drop_empty_classnames(args: Vec<String>) -> Vec<String> {
    let mut kept = Vec::with_capacity(args.len());
    let mut args = args.into_iter().peekable();
    while let Some(arg) = args.next() {
        let empty = arg == "--classnames"
            && args.peek().map_or(true, |next| next.starts_with("--"));
        if !empty {
            kept.push(arg);
        }
    }
    kept
}

fn ordered_settings(matches: &ArgMatches) -> Vec<Setting> {
    let mut settings: Vec<(usize, Setting)> = Vec::new();
    collect::<String>(matches, "classnames", &mut settings, Setting::ClassName);
    collect::<u16>(matches, "port", &mut settings, Setting::Port);
    collect::<String>(matches, "host", &mut settings, Setting::Host);
    collect::<PathBuf>(matches, "file", &mut settings, Setting::File);

    settings.sort_by_key(|(index, _)| *index);
    settings.into_iter().map(|(_, setting)| setting).collect()
}

fn collect<T>(
    matches: &ArgMatches,
    id: &str,
    settings: &mut Vec<(usize, Setting)>,
    wrap: fn(T) -> Setting,
) where
    T: Clone + Send + Sync + 'static,
{
    let (Some(indices), Some(values)) = (matches.indices_of(id), matches.get_many::<T>(id)) else {
        return;
    };
    settings.extend(indices.zip(values.cloned().map(wrap)));
}
