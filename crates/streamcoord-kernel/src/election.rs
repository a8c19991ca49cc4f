//! Leader election tie-breaking (spec §4.2 "Tie-breaking in election",
//! §9 "Election comparator versioning").

use std::cmp::Ordering;

use streamcoord_types::{Node, Tail};

/// Picks the next writer from `candidates` (every member reporting
/// `stopped(stream.epoch, tail)`), using the comparator selected by
/// `machine_version`.
///
/// Candidates are sorted by `(epoch DESC, offset DESC)`; an `empty` tail
/// sorts last. The first candidate after sorting wins. Returns `None` if
/// `candidates` is empty.
pub fn select_leader(candidates: &[(Node, Tail)], machine_version: u32) -> Option<Node> {
    let mut sorted: Vec<&(Node, Tail)> = candidates.iter().collect();
    let cmp: fn(&Tail, &Tail) -> Ordering =
        if machine_version == 0 { compare_tail_v0 } else { compare_tail_corrected };
    sorted.sort_by(|a, b| cmp(&b.1, &a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.first().map(|(node, _)| node.clone())
}

/// Corrected comparator: `(epoch DESC, offset DESC)`, empty last.
fn compare_tail_corrected(a: &Tail, b: &Tail) -> Ordering {
    match (a, b) {
        (Tail::Empty, Tail::Empty) => Ordering::Equal,
        (Tail::Empty, Tail::At(..)) => Ordering::Less,
        (Tail::At(..), Tail::Empty) => Ordering::Greater,
        (Tail::At(ea, oa), Tail::At(eb, ob)) => ea.cmp(eb).then_with(|| oa.cmp(ob)),
    }
}

/// Machine version 0's comparator: compares only `offset`, ignoring
/// `epoch`. This is a known defect in the original v0 logic — preserved so
/// replaying a pre-v1 log reproduces the exact same election outcome it did
/// at the time (spec §9). Never used for state created at machine version
/// ≥ 1.
fn compare_tail_v0(a: &Tail, b: &Tail) -> Ordering {
    match (a, b) {
        (Tail::Empty, Tail::Empty) => Ordering::Equal,
        (Tail::Empty, Tail::At(..)) => Ordering::Less,
        (Tail::At(..), Tail::Empty) => Ordering::Greater,
        (Tail::At(_, oa), Tail::At(_, ob)) => oa.cmp(ob),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamcoord_types::{Epoch, Offset};
    use test_case::test_case;

    fn node(name: &str) -> Node {
        Node::from(name)
    }

    #[test_case(Epoch::new(3), Offset::new(10), Epoch::new(3), Offset::new(5), Ordering::Greater; "same epoch higher offset wins")]
    #[test_case(Epoch::new(2), Offset::new(999), Epoch::new(3), Offset::new(0), Ordering::Less; "higher epoch wins regardless of offset")]
    #[test_case(Epoch::new(1), Offset::new(1), Epoch::new(1), Offset::new(1), Ordering::Equal; "identical tails compare equal")]
    fn compare_tail_corrected_orders_by_epoch_then_offset(
        ea: Epoch,
        oa: Offset,
        eb: Epoch,
        ob: Offset,
        expected: Ordering,
    ) {
        assert_eq!(compare_tail_corrected(&Tail::At(ea, oa), &Tail::At(eb, ob)), expected);
    }

    #[test]
    fn picks_highest_epoch_then_offset() {
        let candidates = vec![
            (node("n1"), Tail::At(Epoch::new(1), Offset::new(100))),
            (node("n2"), Tail::At(Epoch::new(2), Offset::new(0))),
            (node("n3"), Tail::At(Epoch::new(1), Offset::new(120))),
        ];
        assert_eq!(select_leader(&candidates, 3), Some(node("n2")));
    }

    #[test]
    fn empty_tail_sorts_last() {
        let candidates = vec![
            (node("n1"), Tail::Empty),
            (node("n2"), Tail::At(Epoch::new(1), Offset::new(0))),
        ];
        assert_eq!(select_leader(&candidates, 3), Some(node("n2")));
    }

    #[test]
    fn v0_comparator_ignores_epoch() {
        let candidates = vec![
            (node("n1"), Tail::At(Epoch::new(5), Offset::new(10))),
            (node("n2"), Tail::At(Epoch::new(1), Offset::new(200))),
        ];
        assert_eq!(select_leader(&candidates, 0), Some(node("n2")));
        assert_eq!(select_leader(&candidates, 3), Some(node("n1")));
    }

    #[test]
    fn no_candidates_returns_none() {
        assert_eq!(select_leader(&[], 3), None);
    }
}
