//! The embeddable facade: wires `streamcoord-config`'s tunables and the pure
//! `streamcoord-kernel::apply` entry point together with a caller-supplied
//! [`Aux`] and [`CommandSink`]. This is *not* the thin client-facing request
//! API (spec §1 non-goal) — it is the in-process object a Raft runtime
//! integration embeds: it owns one replica's copy of `State`, advances the
//! command index, and dispatches the `Aux` effects `apply` returns.

use std::collections::BTreeSet;

use streamcoord_config::CoordinatorConfig;
use streamcoord_kernel::{Aux, Command, CommandSink, Effect, Meta, Reply, State};
use streamcoord_types::{Index, Node, Offset, Pid, StreamId};

use crate::error::Result;
use crate::resize::{diff_membership, MembershipChange, ResizeGate};

/// The current on-disk schema version this build writes (spec §9: "three
/// machine versions exist"). A coordinator opening state persisted by an
/// older build submits `Command::MachineVersion` itself before resuming
/// normal traffic.
pub const CURRENT_MACHINE_VERSION: u32 = 3;

/// One replica's in-process view of the coordinator: state plus the
/// bookkeeping that is deliberately *not* part of the deterministic machine
/// (the command-index counter, the resize gate, the `Aux`/sink handles).
pub struct StreamCoordinator<A: Aux, S: CommandSink> {
    state: State,
    config: CoordinatorConfig,
    next_index: u64,
    machine_version: u32,
    aux: A,
    sink: S,
    resize_gate: ResizeGate,
}

impl<A: Aux, S: CommandSink> StreamCoordinator<A, S> {
    pub fn new(config: CoordinatorConfig, aux: A, sink: S) -> Self {
        Self {
            state: State::default(),
            config,
            next_index: 1,
            machine_version: CURRENT_MACHINE_VERSION,
            aux,
            sink,
            resize_gate: ResizeGate::new(),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Applies one command, advancing the coordinator's own command index
    /// (spec §4.1's `meta.index`, here owned by the embedder rather than a
    /// real Raft log since that log is out of scope — spec §1). Dispatches
    /// any `Effect::Aux` the kernel emits to the configured `Aux` worker and
    /// returns the leftover effects (monitor/notify/release-cursor) for the
    /// caller's runtime integration to execute.
    pub fn submit(&mut self, command: Command, system_time_ms: u64) -> (Reply, Vec<Effect>) {
        let meta = Meta { index: Index::new(self.next_index), system_time_ms, machine_version: self.machine_version };
        self.next_index += 1;

        let (state, reply, effects) = streamcoord_kernel::apply(meta, command, std::mem::take(&mut self.state));
        self.state = state;

        let mut leftover = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                Effect::Aux(action) => self.aux.submit(action, &self.sink),
                other => leftover.push(other),
            }
        }

        (reply, leftover)
    }

    /// Leader-change robustness (spec §4.6): fails every aux action still
    /// alive on this node for a stream not in `exclude`, turning stranded
    /// in-flight work into `action_failed` commands the next `submit` calls
    /// will see.
    pub fn fail_active_actions(&self, exclude: &BTreeSet<StreamId>) {
        self.aux.fail_active_actions(exclude, &self.sink);
    }

    pub fn writer_pid(&self, stream_id: &StreamId) -> Result<Pid> {
        Ok(streamcoord_kernel::writer_pid(&self.state, stream_id)?)
    }

    pub fn local_pid(&self, stream_id: &StreamId, node: &Node) -> Result<Option<Pid>> {
        Ok(streamcoord_kernel::local_pid(&self.state, stream_id, node)?)
    }

    pub fn members(&self, stream_id: &StreamId) -> Result<Vec<(Node, Option<Pid>, bool)>> {
        Ok(streamcoord_kernel::members(&self.state, stream_id)?)
    }

    /// The `tick`-driven cluster-resize task (spec §6.5): compares `roster`
    /// (from node discovery, out of scope) against the nodes already hosting
    /// at least one stream member, gated to one in-flight resizer.
    /// Returns `None` if a resize is already running; call
    /// [`Self::finish_resize`] once the caller's RPCs complete or fail.
    pub fn maybe_resize(&mut self, roster: &BTreeSet<Node>) -> Option<Vec<MembershipChange>> {
        if !self.resize_gate.try_start() {
            return None;
        }
        let current: BTreeSet<Node> =
            self.state.streams.values().flat_map(|stream| stream.members.keys().cloned()).collect();
        Some(diff_membership(&current, roster))
    }

    pub fn finish_resize(&mut self) {
        self.resize_gate.finish();
    }

    /// Whether `index` lands on the release-cursor boundary this
    /// coordinator's config specifies (spec §4.1, §6.4) — exposed so an
    /// embedder using its own command index (e.g. the Raft log offset
    /// rather than this facade's counter) can apply the same policy.
    pub fn is_release_cursor_boundary(&self, index: u64) -> bool {
        Index::new(index).is_release_cursor_boundary(self.config.coordinator.release_cursor_interval)
    }
}

/// A replica's write offset as observed at a point in time, for the
/// (caller-side, non-replicated) `add_replica` freshness gate.
#[derive(Debug, Clone, Copy)]
pub struct ObservedOffset {
    pub offset: Offset,
    pub observed_at_ms: u64,
}
