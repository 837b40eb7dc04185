//! Process-wide context object (§9): bundles configuration, the process
//! runner, and the one sanctioned cache behind a single handle constructed
//! once in `main` and threaded by reference, rather than reached for as
//! ambient global state.

use crate::config::Config;
use crate::panes::PaneSetCache;
use crate::process::ProcessRunner;

pub struct World<'a> {
    pub config: Config,
    pub runner: &'a dyn ProcessRunner,
    pub panes: PaneSetCache,
}

impl<'a> World<'a> {
    pub fn new(config: Config, runner: &'a dyn ProcessRunner) -> Self {
        World {
            config,
            runner,
            panes: PaneSetCache::new(),
        }
    }
}
