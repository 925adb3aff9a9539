//! Command dispatch: bridges CLI args -> engine calls -> output formatting.

pub mod config_cmd;
pub mod registers;
pub mod run;
pub mod status;
pub mod sync;
pub mod util;

use std::sync::Arc;

use plcsync_config::Config;
use plcsync_core::{CalendarSource, JsonCalendar, StatusStore, Synchronizer};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Loaded configuration plus the global flags, shared by every handler.
pub struct Context {
    pub config: Config,
    pub global: GlobalOpts,
}

impl Context {
    pub fn color(&self) -> bool {
        crate::output::should_color(&self.global.color)
    }

    pub fn store(&self) -> StatusStore {
        StatusStore::new(self.config.data_dir())
    }

    pub fn calendar(&self) -> Arc<dyn CalendarSource> {
        Arc::new(JsonCalendar::new(self.config.calendar_file()))
    }

    /// A standalone synchronizer for one-shot commands.
    pub fn synchronizer(&self, key: &str) -> Result<Synchronizer, CliError> {
        let target = self.config.target_config(key)?;
        Ok(Synchronizer::new(target, self.calendar(), self.store())?)
    }
}

/// Dispatch a config-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(args, ctx).await,
        Command::Sync(args) => sync::sync(&args.target, ctx).await,
        Command::Clear(args) => sync::clear(&args.target, ctx).await,
        Command::Probe(args) => sync::probe(&args.target, ctx).await,
        Command::Status(args) => status::status(args.target.as_deref(), ctx),
        Command::Targets => status::targets(ctx),
        Command::Read(args) => registers::read(&args.target, ctx).await,
        Command::Plan(args) => registers::plan(&args, ctx),
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
