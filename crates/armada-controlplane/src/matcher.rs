//! Scored bipartite pairing.
//!
//! Pairs items from two collections under a combined compatibility
//! predicate and tie-break score. The machine diff is built on this, but
//! nothing here knows about machines.

/// Outcome of [`pair`].
#[derive(Debug)]
pub struct Pairing<L, R> {
    pub pairs: Vec<(L, R)>,
    pub unmatched_left: Vec<L>,
    pub unmatched_right: Vec<R>,
}

/// Pair up items from `left` and `right`.
///
/// `score` returns `None` when a pair is incompatible, and otherwise a
/// rank where lower is better. The assignment is greedy over ascending
/// scores, with input order breaking ties, so identical inputs always
/// produce identical pairings. Greedy is sufficient here: the hard
/// predicate narrows the candidate set sharply before scores ever compete.
pub fn pair<L, R, F>(left: Vec<L>, right: Vec<R>, score: F) -> Pairing<L, R>
where
    F: Fn(&L, &R) -> Option<i32>,
{
    let mut candidates = Vec::new();
    for (li, l) in left.iter().enumerate() {
        for (ri, r) in right.iter().enumerate() {
            if let Some(s) = score(l, r) {
                candidates.push((s, li, ri));
            }
        }
    }
    candidates.sort_unstable();

    let mut left: Vec<Option<L>> = left.into_iter().map(Some).collect();
    let mut right: Vec<Option<R>> = right.into_iter().map(Some).collect();
    let mut pairs = Vec::new();
    for (_, li, ri) in candidates {
        if left[li].is_none() || right[ri].is_none() {
            continue;
        }
        if let (Some(l), Some(r)) = (left[li].take(), right[ri].take()) {
            pairs.push((l, r));
        }
    }

    Pairing {
        pairs,
        unmatched_left: left.into_iter().flatten().collect(),
        unmatched_right: right.into_iter().flatten().collect(),
    }
}
