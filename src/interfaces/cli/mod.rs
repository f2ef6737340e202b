//! Command-line interface and logger set-up for the `hksym` binary.

use std::path::{Path, PathBuf};

use anyhow::{self, format_err};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::io::format::hksym_output;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

/// Logs a nicely formatted HkSym heading to the `hksym-output` logger.
pub fn log_heading() {
    let version = if let Some(ver) = VERSION {
        format!("v{ver}")
    } else {
        "v unknown".to_string()
    };
    hksym_output!("╭─────────────────────────────────────────────────────────────╮");
    hksym_output!("│  HH   HH  KK  KK   SSSSS  YY   YY  MM    MM                 │");
    hksym_output!("│  HH   HH  KK KK   SS       YY YY   MMM  MMM                 │");
    hksym_output!("│  HHHHHHH  KKKK     SSSS     YYY    MM MM MM                 │");
    hksym_output!("│  HH   HH  KK KK       SS    YY     MM    MM                 │");
    hksym_output!("│  HH   HH  KK  KK  SSSSS     YY     MM    MM   {version:>13} │");
    hksym_output!("│                                                             │");
    hksym_output!("│ Symmetry expansion of tight-binding Hamiltonians in k-space │");
    hksym_output!("╰─────────────────────────────────────────────────────────────╯");
    hksym_output!("");
}

/// Command-line arguments of the `hksym` binary.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// The YAML input file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Optional file for the run output. If absent, the run output goes to standard output.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Prints diagnostics. May be given twice for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Initialises `log4rs` for a run.
///
/// The `hksym-output` target goes to `output` (or standard output) without decoration.
/// Diagnostics go to standard error at `warn`, `debug` or `trace` level depending on
/// `verbose`.
///
/// # Errors
///
/// Errors if the output file cannot be created or a logger is already set.
pub fn setup_logger(output: Option<&Path>, verbose: u8) -> Result<(), anyhow::Error> {
    let output_appender: Box<dyn Append> = match output {
        Some(path) => Box::new(
            FileAppender::builder()
                .encoder(Box::new(PatternEncoder::new("{m}{n}")))
                .append(false)
                .build(path)?,
        ),
        None => Box::new(
            ConsoleAppender::builder()
                .encoder(Box::new(PatternEncoder::new("{m}{n}")))
                .build(),
        ),
    };
    let diagnostics = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} {t} - {m}{n}",
        )))
        .build();
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let config = Config::builder()
        .appender(Appender::builder().build("output", output_appender))
        .appender(Appender::builder().build("diagnostics", Box::new(diagnostics)))
        .logger(
            Logger::builder()
                .appender("output")
                .additive(false)
                .build("hksym-output", LevelFilter::Info),
        )
        .build(Root::builder().appender("diagnostics").build(level))
        .map_err(|err| format_err!(err))?;
    log4rs::init_config(config).map_err(|err| format_err!(err))?;
    Ok(())
}
