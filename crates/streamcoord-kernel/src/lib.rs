//! The pure, deterministic core of the Stream Coordinator: a replicated
//! state machine that elects writers, places replicas, and drives an
//! out-of-band aux worker for append-only log queues.
//!
//! Everything in this crate is a function of `(meta, command, state)` — no
//! IO, no clocks, no randomness, no threads. `kernel::apply` is the single
//! entry point; `runtime` holds reference (non-production) implementations
//! of the traits a concrete Raft runtime plugs into.

pub mod command;
pub mod effects;
pub mod election;
pub mod error;
pub mod evaluator;
pub mod kernel;
pub mod listeners;
pub mod monitors;
pub mod runtime;
pub mod sac;
pub mod state;
pub mod state_hash;
pub mod stream_fsm;
pub mod traits;
pub mod upgrade;

pub use command::{Command, DownReason, Meta};
pub use effects::{
    AuxAction, AuxActionKind, AuxMeta, Effect, MonitorTarget, Notification, NotificationKind, ReleaseCursor, Reply,
};
pub use error::{CoordinatorError, DisallowedReason};
pub use kernel::{apply, local_pid, members, streams_on_node, writer_pid, RELEASE_CURSOR_INTERVAL};
pub use sac::{SacCommand, SacMachine, SacState};
pub use state::{
    ActionTag, CatalogState, CatalogStatus, Conf, Current, ListenerKind, ListenerPayload, Member, MemberState,
    MemberTarget, MonitorPurpose, ReplyTo, Role, RoleKind, State, Stream, StreamTarget,
};
pub use stream_fsm::StreamTransition;
pub use traits::{Aux, BootstrapCoordinator, Clock, CommandSink};

#[cfg(test)]
mod tests_assertions;
#[cfg(test)]
mod property_tests;
