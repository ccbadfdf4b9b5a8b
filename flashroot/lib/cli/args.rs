use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::registry::{Invocation, MARK, MOUNT, RESET, SWITCH};

use super::styles;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// `flashroot` mounts the root overlay and moves it between RAM and flash
#[derive(Debug, Parser)]
#[command(name = "flashroot", author, about, version, styles=styles::styles())]
pub struct FlashrootArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: FlashrootSubcommand,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum FlashrootSubcommand {
    /// Mount the root overlay at boot
    #[command(name = "mount")]
    Mount,

    /// Move the running system from the RAM overlay onto flash
    #[command(name = "switch")]
    Switch,

    /// Erase all settings and installed packages
    #[command(name = "reset")]
    Reset {
        /// Do not ask for confirmation
        #[arg(short = 'y', long = "yes")]
        force: bool,
    },

    /// Force the flash overlay to be reformatted on the next switch
    #[command(name = "mark")]
    Mark {
        /// Do not ask for confirmation
        #[arg(short = 'y', long = "yes")]
        force: bool,
    },
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FlashrootSubcommand {
    /// Returns the registry invocation for this subcommand.
    pub fn invocation(&self) -> Invocation {
        match self {
            FlashrootSubcommand::Mount => Invocation::new(MOUNT, false),
            FlashrootSubcommand::Switch => Invocation::new(SWITCH, false),
            FlashrootSubcommand::Reset { force } => Invocation::new(RESET, *force),
            FlashrootSubcommand::Mark { force } => Invocation::new(MARK, *force),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
