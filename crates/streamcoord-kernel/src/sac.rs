//! Single-Active-Consumer sub-machine embedding seam (spec §9).
//!
//! The coordinator owns `sac` as an opaque field and dispatches two kinds of
//! event to it (`apply` for `Command::Sac`, `handle_down` for monitored
//! pids tagged `MonitorPurpose::Sac`). SAC's own consumer-selection logic is
//! out of scope (spec §1) — this is the seam, not an implementation.

use serde::{Deserialize, Serialize};
use streamcoord_types::Pid;

use crate::effects::Effect;

/// Opaque embedded SAC state. `Default` is the empty sub-machine installed
/// by the v2→v3 migration (spec §9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SacState {
    _opaque: (),
}

/// A command addressed to the SAC sub-machine, opaque to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SacCommand {
    pub payload: Vec<u8>,
}

pub trait SacMachine {
    fn apply(self, cmd: &SacCommand) -> (Self, Vec<Effect>)
    where
        Self: Sized;

    fn handle_down(self, pid: &Pid) -> (Self, Vec<Effect>)
    where
        Self: Sized;
}

impl SacMachine for SacState {
    fn apply(self, _cmd: &SacCommand) -> (Self, Vec<Effect>) {
        (self, Vec::new())
    }

    fn handle_down(self, _pid: &Pid) -> (Self, Vec<Effect>) {
        (self, Vec::new())
    }
}
