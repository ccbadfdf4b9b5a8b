//! The command table.
//!
//! Every entry point of the binary is a named handler in a [`Registry`]. The binary can also be
//! installed under the names of the tools it replaces; [`Invocation::from_program`] maps those
//! names onto registry entries.

use std::{collections::BTreeMap, path::Path};

use crate::{
    boot::BootPolicy,
    config::FlashrootConfig,
    mark::MarkerWriter,
    mounts::MountOps,
    reset::{confirm_destructive, ConfirmationGate, Eraser},
    switch::SwitchOrchestrator,
    volume::VolumeManager,
    FlashrootError, FlashrootResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Boot-time mount of the root overlay.
pub const MOUNT: &str = "mount";

/// Switch from the RAM overlay to the persistent overlay.
pub const SWITCH: &str = "switch";

/// Erase the persistent overlay.
pub const RESET: &str = "reset";

/// Force a reformat on the next switch.
pub const MARK: &str = "mark";

/// Program names the binary answers to, with the command each one maps to.
pub const PROGRAM_ALIASES: [(&str, &str); 3] = [
    ("mount_root", MOUNT),
    ("jffs2reset", RESET),
    ("jffs2mark", MARK),
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A command handler.
pub type Handler = fn(&Context<'_>, &Invocation) -> FlashrootResult<()>;

/// Everything a handler works with.
pub struct Context<'a> {
    /// The persistent volumes.
    pub volumes: &'a dyn VolumeManager,

    /// The mount operations.
    pub mounts: &'a dyn MountOps,

    /// Approves destructive commands.
    pub gate: &'a dyn ConfirmationGate,

    /// The loaded configuration.
    pub config: &'a FlashrootConfig,
}

/// A resolved request to run one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// The registry entry to run.
    pub command: String,

    /// Skip the confirmation of destructive commands.
    pub force: bool,
}

/// Maps command names to handlers.
#[derive(Clone)]
pub struct Registry {
    handlers: BTreeMap<&'static str, Handler>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Creates a registry holding every built-in command.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(MOUNT, run_mount);
        registry.register(SWITCH, run_switch);
        registry.register(RESET, run_reset);
        registry.register(MARK, run_mark);
        registry
    }

    /// Adds or replaces a handler.
    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    /// Returns the registered command names.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// Looks up the handler for `name`.
    pub fn resolve(&self, name: &str) -> FlashrootResult<Handler> {
        self.handlers
            .get(name)
            .copied()
            .ok_or_else(|| FlashrootError::Lookup(format!("unknown command {name}")))
    }

    /// Runs the handler named by `invocation`.
    pub fn dispatch(&self, context: &Context<'_>, invocation: &Invocation) -> FlashrootResult<()> {
        let handler = self.resolve(&invocation.command)?;
        tracing::debug!("running {}", invocation.command);
        handler(context, invocation)
    }
}

impl Invocation {
    /// Creates an invocation of `command`.
    pub fn new(command: impl Into<String>, force: bool) -> Self {
        Self {
            command: command.into(),
            force,
        }
    }

    /// Maps a program name and its arguments onto a command, if the name is one of
    /// [`PROGRAM_ALIASES`].
    ///
    /// `mount_root done` is the switch. `-y` skips confirmation.
    pub fn from_program(program: &str, args: &[String]) -> Option<Self> {
        let name = Path::new(program).file_name()?.to_str()?;
        let (_, command) = PROGRAM_ALIASES.iter().find(|(alias, _)| *alias == name)?;

        let command = match (*command, args.first().map(String::as_str)) {
            (MOUNT, Some("done")) => SWITCH,
            (command, _) => command,
        };
        let force = args.iter().any(|arg| arg == "-y");

        Some(Self::new(command, force))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn run_mount(context: &Context<'_>, _: &Invocation) -> FlashrootResult<()> {
    let config = context.config;
    let outcome = BootPolicy::new(context.volumes, context.mounts, &config.layout, &config.boot)
        .mount()?;
    tracing::info!("root overlay: {outcome}");
    Ok(())
}

fn run_switch(context: &Context<'_>, _: &Invocation) -> FlashrootResult<()> {
    let config = context.config;
    SwitchOrchestrator::new(
        context.volumes,
        context.mounts,
        &config.layout,
        &config.switch,
    )
    .switch_to_persistent_overlay()
}

fn run_reset(context: &Context<'_>, invocation: &Invocation) -> FlashrootResult<()> {
    Eraser::new(
        context.volumes,
        context.mounts,
        &context.config.layout,
        context.gate,
    )
    .reset(invocation.force)
}

fn run_mark(context: &Context<'_>, invocation: &Invocation) -> FlashrootResult<()> {
    confirm_destructive(invocation.force, context.gate)?;
    MarkerWriter::new(context.volumes, &context.config.layout).mark()
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
