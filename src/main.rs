use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use version_code::codec::{self, MAX_VERSION_CODE, VersionCode};
use version_code::config::{self, Config, EnvProvider};
use version_code::secrets;

/// Environment variable holding the log filter
const LOG_ENV: &str = "VERSION_CODE_LOG";

/// Set to "json" for structured log lines
const LOG_FORMAT_ENV: &str = "VERSION_CODE_LOG_FORMAT";

#[derive(Parser)]
#[command(name = "version-code")]
#[command(version, about = "Turn version names into Android version codes")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/version-code/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the normalized major.minor.build form of a version name
    Normalize { raw: String },
    /// Print the version code; reads the version from the environment if omitted
    Code { raw: Option<String> },
    /// Print the components carried by a version code
    Decode {
        #[arg(value_parser = clap::value_parser!(VersionCode).range(..=i64::from(MAX_VERSION_CODE)))]
        code: VersionCode,
    },
    /// Run a command with the release keystore materialized on disk
    WithKeystore {
        /// Directory for the keystore file
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_logging();

    match cli.command {
        Command::Normalize { raw } => {
            println!("{}", codec::normalize_version_string(&raw));
            Ok(ExitCode::SUCCESS)
        }
        Command::Code { raw } => {
            let raw = match raw {
                Some(raw) => raw,
                None => {
                    let config = Config::load_or_default(cli.config.as_deref())?;
                    config::resolve_raw_version(&EnvProvider, &config.version)?
                }
            };
            let code = codec::compute_version_code(&raw)
                .with_context(|| format!("Cannot compute version code for '{}'", raw))?;
            println!("{}", code);
            Ok(ExitCode::SUCCESS)
        }
        Command::Decode { code } => {
            println!("{}", codec::decode(code));
            Ok(ExitCode::SUCCESS)
        }
        Command::WithKeystore { dir, command } => {
            let config = Config::load_or_default(cli.config.as_deref())?;
            let status = secrets::run_with_keystore(&EnvProvider, &config.signing, &dir, &command)
                .context("Failed to run command with keystore")?;
            Ok(status
                .code()
                .and_then(|code| u8::try_from(code).ok())
                .map(ExitCode::from)
                .unwrap_or(ExitCode::FAILURE))
        }
    }
}

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false);

    if std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
    guard
}
