//! Antithesis-style `always!`/`sometimes!`/`never!` property annotations.
//!
//! These macros let the coordinator's invariants (spec §8) live next to the
//! code that must uphold them, instead of only in a separate test file.
//! `always!`/`never!` always assert, in every build — these are correctness
//! properties, not coverage markers, so a violation must never be compiled
//! away. `sometimes!` is a no-op outside `sim`. With `sim` enabled, every
//! evaluation is additionally recorded in a process-wide registry so a
//! deterministic simulation run can report, at the end, which properties
//! were checked and whether any `sometimes!` site was never actually
//! exercised.

#[cfg(feature = "sim")]
use std::collections::HashMap;
#[cfg(feature = "sim")]
use std::sync::Mutex;

/// Outcome recorded for a single named property across a simulation run.
#[cfg(feature = "sim")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyCounters {
    pub passes: u64,
    pub failures: u64,
}

#[cfg(feature = "sim")]
static REGISTRY: Mutex<Option<HashMap<&'static str, PropertyCounters>>> = Mutex::new(None);

#[cfg(feature = "sim")]
#[doc(hidden)]
pub fn record(name: &'static str, held: bool) {
    let mut guard = REGISTRY.lock().expect("property registry poisoned");
    let map = guard.get_or_insert_with(HashMap::new);
    let counters = map.entry(name).or_default();
    if held {
        counters.passes += 1;
    } else {
        counters.failures += 1;
    }
}

/// Snapshot of every property recorded so far. Empty unless the `sim`
/// feature is enabled.
#[cfg(feature = "sim")]
pub fn snapshot() -> HashMap<&'static str, PropertyCounters> {
    REGISTRY
        .lock()
        .expect("property registry poisoned")
        .clone()
        .unwrap_or_default()
}

/// Names of every `sometimes!` site that has never once observed a `true`
/// condition. A non-empty result at the end of a simulation run means a
/// code path the properties were meant to exercise was never reached.
#[cfg(feature = "sim")]
pub fn unreached_sometimes() -> Vec<&'static str> {
    REGISTRY
        .lock()
        .expect("property registry poisoned")
        .as_ref()
        .map(|map| {
            map.iter()
                .filter(|(_, c)| c.passes == 0)
                .map(|(name, _)| *name)
                .collect()
        })
        .unwrap_or_default()
}

/// Clears the registry. Intended for use between independent simulation
/// runs within the same test binary.
#[cfg(feature = "sim")]
pub fn reset() {
    *REGISTRY.lock().expect("property registry poisoned") = None;
}

/// Asserts a condition that must hold on every evaluation (e.g. invariant 1:
/// "at most one writer in `ready`/`running` per epoch"). Violations always
/// panic, even outside `sim` — these are correctness bugs, not coverage
/// gaps.
#[macro_export]
macro_rules! always {
    ($cond:expr, $name:expr, $msg:expr) => {{
        let held = $cond;
        #[cfg(feature = "sim")]
        $crate::record($name, held);
        assert!(held, "always! violated: {} — {}", $name, $msg);
    }};
}

/// Asserts a condition that must never hold (the complement of `always!`).
#[macro_export]
macro_rules! never {
    ($cond:expr, $name:expr, $msg:expr) => {{
        let violated = $cond;
        #[cfg(feature = "sim")]
        $crate::record($name, !violated);
        assert!(!violated, "never! violated: {} — {}", $name, $msg);
    }};
}

/// Records that a condition was observed to be true at least once, without
/// asserting anything. Used to confirm interesting states (e.g. "an
/// election actually happened", "a stale `member_started` was ignored")
/// were reached during a simulation run. A no-op without the `sim` feature.
#[macro_export]
macro_rules! sometimes {
    ($cond:expr, $name:expr, $msg:expr) => {{
        #[cfg(feature = "sim")]
        {
            let _ = $msg;
            $crate::record($name, $cond);
        }
        #[cfg(not(feature = "sim"))]
        {
            let _ = (&$cond, &$name, &$msg);
        }
    }};
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;

    #[test]
    fn always_records_pass() {
        reset();
        always!(1 + 1 == 2, "arithmetic_sane", "addition must work");
        let snap = snapshot();
        assert_eq!(snap["arithmetic_sane"].passes, 1);
        assert_eq!(snap["arithmetic_sane"].failures, 0);
    }

    #[test]
    #[should_panic(expected = "always! violated")]
    fn always_panics_on_violation() {
        always!(1 + 1 == 3, "arithmetic_broken", "this must never hold");
    }

    #[test]
    fn sometimes_tracks_unreached_sites() {
        reset();
        sometimes!(false, "rare_path_a", "exercised rarely");
        sometimes!(true, "rare_path_b", "exercised at least once");
        let unreached = unreached_sometimes();
        assert!(unreached.contains(&"rare_path_a"));
        assert!(!unreached.contains(&"rare_path_b"));
    }
}
