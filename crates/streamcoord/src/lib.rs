//! # Stream Coordinator
//!
//! A replicated, deterministic state machine that coordinates the lifecycle
//! of append-only log ("stream") queues across a cluster: electing a writer
//! per stream, placing replicas, driving per-node log-process start/stop
//! across epoch changes, and notifying listeners of endpoint changes.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                           streamcoord                               │
//! │  ┌──────────┐   ┌───────────────┐   ┌──────────┐   ┌───────────┐ │
//! │  │  config  │ → │  coordinator  │ → │  kernel  │ → │    aux    │ │
//! │  │ (toml)   │   │   (facade)    │   │(pure FSM)│   │(out-of-   │ │
//! │  └──────────┘   └───────────────┘   └──────────┘   │  band)    │ │
//! │                                                      └───────────┘ │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `streamcoord-kernel` is the deterministic core: a pure function of
//! `(meta, command, state) → (state', reply, effects)` with no IO, clocks,
//! or threads. This crate is the embeddable shell around it — an
//! `Aux`/`CommandSink` implementation plugs in the out-of-band worker and
//! the command-reinjection path a concrete Raft runtime integration
//! supplies; `streamcoord-config` supplies the handful of tunables spec.md
//! leaves open (release-cursor interval, quorum rule, freshness-gate skew).
//!
//! The client-facing thin request API in front of this facade, and the Raft
//! runtime itself, are out of scope (spec §1) — [`StreamCoordinator`] is the
//! seam an embedder builds those on top of, not a finished server.

mod coordinator;
mod error;
mod freshness;
mod resize;

pub use coordinator::{ObservedOffset, StreamCoordinator, CURRENT_MACHINE_VERSION};
pub use error::{Result, StreamCoordError};
pub use freshness::{check_freshness, ReplicaFreshness};
pub use resize::{diff_membership, MembershipChange, ResizeGate};

// Re-export the pure core and its types for downstream crates that only
// need the deterministic machine (e.g. a simulation harness) without the
// facade above it.
pub use streamcoord_config::CoordinatorConfig;
pub use streamcoord_kernel::{
    apply, local_pid, members, writer_pid, Command, DownReason, Effect, Meta, Reply, State,
};
pub use streamcoord_types::{Epoch, Node, Pid, StreamId, Tail};
