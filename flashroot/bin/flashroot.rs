use std::{env, path::PathBuf, process::ExitCode};

use clap::Parser;
use flashroot::{
    cli::FlashrootArgs,
    config::FlashrootConfig,
    mounts::SystemMounts,
    registry::{Context, Invocation, Registry},
    reset::StdinConfirmation,
    volume::MtdVolumes,
    FlashrootError, FlashrootResult,
};
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

fn main() -> ExitCode {
    let argv: Vec<String> = env::args().collect();
    let program = argv.first().cloned().unwrap_or_default();

    // Installed as one of the legacy tool names, the binary takes no flags of its own.
    let rest = argv.get(1..).unwrap_or_default();
    let (invocation, verbose, config_path) = match Invocation::from_program(&program, rest) {
        Some(invocation) => (invocation, false, None),
        None => {
            let args = FlashrootArgs::parse();
            (args.subcommand.invocation(), args.verbose, args.config)
        }
    };

    if let Err(e) = init_tracing(verbose) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(&invocation, config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{} failed: {e}", invocation.command);
            ExitCode::FAILURE
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

fn init_tracing(verbose: bool) -> FlashrootResult<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| FlashrootError::custom(anyhow::anyhow!("failed to install logger: {e}")))
}

fn run(invocation: &Invocation, config_path: Option<PathBuf>) -> FlashrootResult<()> {
    let config = FlashrootConfig::load(config_path.as_deref())?;
    tracing::debug!("configuration: {config:?}");

    let volumes = MtdVolumes::new();
    let mounts = SystemMounts::new(config.layout.clone());
    let context = Context {
        volumes: &volumes,
        mounts: &mounts,
        gate: &StdinConfirmation,
        config: &config,
    };

    Registry::standard().dispatch(&context, invocation)
}
