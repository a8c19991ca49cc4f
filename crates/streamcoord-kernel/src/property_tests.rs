//! Property-based tests over the election comparator and persisted-state
//! (de)serialization (spec §6.4: "the machine's full state is snapshotted by
//! the runtime... must be schema-versioned"). Grounded on the teacher's own
//! `proptest!` blocks in `kimberlite-kernel/src/tests.rs`.

use proptest::prelude::*;
use streamcoord_types::{Epoch, Node, Offset, Tail};

use crate::election::select_leader;
use crate::state::{Conf, State};
use crate::stream_fsm::{update_stream, StreamTransition};

fn arb_tail() -> impl Strategy<Value = Tail> {
    prop_oneof![
        Just(Tail::Empty),
        (0u64..50, 0u64..10_000).prop_map(|(e, o)| Tail::At(Epoch::new(e), Offset::new(o))),
    ]
}

fn arb_candidates() -> impl Strategy<Value = Vec<(Node, Tail)>> {
    prop::collection::vec(arb_tail(), 1..8).prop_map(|tails| {
        tails.into_iter().enumerate().map(|(i, tail)| (Node::from(format!("n{i}")), tail)).collect()
    })
}

proptest! {
    /// `select_leader` always names a node that was actually a candidate,
    /// and is a pure function of its input (spec invariant 5: determinism).
    #[test]
    fn select_leader_picks_a_candidate_and_is_deterministic(candidates in arb_candidates()) {
        let first = select_leader(&candidates, 3);
        let second = select_leader(&candidates, 3);
        prop_assert_eq!(first.clone(), second);
        if let Some(winner) = first {
            prop_assert!(candidates.iter().any(|(node, _)| *node == winner));
        }
    }

    /// The corrected comparator never prefers a strictly lower epoch over a
    /// strictly higher one, regardless of offsets (spec §4.2 tie-breaking:
    /// "sort candidates by (epoch DESC, offset DESC)").
    #[test]
    fn higher_epoch_always_wins_regardless_of_offset(
        low_epoch in 0u64..20,
        low_offset in 0u64..10_000,
        high_offset in 0u64..10_000,
    ) {
        let high_epoch = low_epoch + 1;
        let candidates = vec![
            (Node::from("low"), Tail::At(Epoch::new(low_epoch), Offset::new(low_offset))),
            (Node::from("high"), Tail::At(Epoch::new(high_epoch), Offset::new(high_offset))),
        ];
        prop_assert_eq!(select_leader(&candidates, 3), Some(Node::from("high")));
    }

    /// A machine's persisted `State` survives a JSON round trip unchanged,
    /// the shape a snapshot taken at a release-cursor boundary relies on.
    #[test]
    fn state_round_trips_through_json(node_count in 1usize..6) {
        let nodes: Vec<Node> = (0..node_count).map(|i| Node::from(format!("n{i}"))).collect();
        let leader = nodes[0].clone();
        let conf = Conf::new(leader.clone(), nodes[1..].to_vec(), 3600);
        let transition = StreamTransition::New {
            stream_id: streamcoord_types::StreamId::from("roundtrip"),
            leader,
            nodes,
            conf,
            reply_to: None,
        };
        let stream = update_stream(&transition, None, 3).expect("new_stream always produces a stream");
        let state = State::default().with_stream(stream);

        let json = serde_json::to_string(&state).expect("state must serialize");
        let back: State = serde_json::from_str(&json).expect("state must deserialize");
        prop_assert_eq!(state.compute_state_hash(), back.compute_state_hash());
        prop_assert_eq!(state, back);
    }
}
