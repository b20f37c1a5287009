use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clap::builder::PossibleValuesParser;
use log::debug;
use skelly::commands::{CommandRegistry, EXIT_SUCCESS, EXIT_USAGE, GlobalOptions, report_error};
use skelly::config::ConfigLoader;
use skelly::config::loader::default_home;
use skelly::config::settings::{LOG_LEVEL, LOG_LEVELS};
use skelly::runtime::RealRuntime;

/// skelly - project scaffolding from template packages
///
/// Resolves a template by name (and optionally an exact version), fetches it
/// into the local cache, unpacks it and runs its post-install script.
///
/// Examples:
///   skelly create app my-app          # Latest version of "app" into ./my-app
///   skelly create app 1.2.0 my-app    # An exact version
///   skelly info app                   # Published and cached versions
///   skelly config set options.offline true
#[derive(Parser, Debug)]
#[command(name = "skelly", version = env!("SKELLY_VERSION"), about)]
struct Cli {
    /// Log at info level
    #[arg(long)]
    info: bool,

    /// Log level (overrides --verbose, --info and --quiet)
    #[arg(long = "log-level", value_name = "LEVEL", value_parser = PossibleValuesParser::new(LOG_LEVELS.iter().copied()))]
    log_level: Option<String>,

    /// Only log errors
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Print the full cause chain of errors
    #[arg(short = 's', long)]
    stacktrace: bool,

    /// Log at debug level
    #[arg(short = 'v', long)]
    verbose: bool,

    /// skelly home directory holding config.toml (defaults to ~/.skelly)
    #[arg(long, env = "SKELLY_HOME", value_name = "PATH")]
    home: Option<PathBuf>,

    /// Never contact a repository; use the local cache only
    #[arg(long)]
    offline: bool,

    /// The command to run followed by its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

impl Cli {
    fn global_options(&self) -> GlobalOptions {
        GlobalOptions {
            info: self.info,
            log_level: self.log_level.clone(),
            quiet: self.quiet,
            stacktrace: self.stacktrace,
            verbose: self.verbose,
            home: self.home.clone(),
            offline: self.offline,
        }
    }
}

fn init_logger(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

async fn run(cli: Cli) -> i32 {
    let runtime = Arc::new(RealRuntime);
    let registry = CommandRegistry::with_defaults(runtime.clone());
    let mut options = cli.global_options();
    let overrides = options.config_overrides();

    let home = match options.home.clone() {
        Some(home) => Ok(home),
        None => default_home(runtime.as_ref()),
    };
    let loaded = home.and_then(|home| {
        options.home = Some(home.clone());
        ConfigLoader::new(runtime.as_ref(), home).load(&overrides)
    });

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            let level = overrides
                .iter()
                .find(|(key, _)| key == LOG_LEVEL)
                .map(|(_, level)| level.as_str())
                .unwrap_or("warn");
            init_logger(level);
            return report_error(&e, &options);
        }
    };
    init_logger(&options.effective_log_level(&config));
    debug!("Using skelly home {:?}", options.home);

    let Some((name, args)) = cli.command.split_first() else {
        eprintln!("{}", registry.summary());
        eprintln!("Run 'skelly --help' for global options.");
        return EXIT_USAGE;
    };

    if name == "help" {
        return match args.first() {
            Some(topic) => match registry.get(topic) {
                Some(command) => {
                    print!("{}", command.help(None));
                    EXIT_SUCCESS
                }
                None => {
                    eprintln!("Error: unknown command '{}'\n\n{}", topic, registry.summary());
                    EXIT_USAGE
                }
            },
            None => {
                print!("{}", registry.summary());
                EXIT_SUCCESS
            }
        };
    }

    registry.dispatch(name, args, &options, &config).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}
