use std::collections::HashSet;
use std::hash::Hash;

/// Synchronize a live set against freshly polled ground truth.
///
/// Entries whose key is missing from `fresh` are removed (in reverse index
/// order, before any insertion, so the set never transiently holds two
/// entries with the same key) and returned to the caller for entity-specific
/// teardown. Entries whose key survives are mutated in place via `update`,
/// preserving their identity and any attached sub-state. New keys are
/// appended via `create`.
///
/// After the call the live key set equals the fresh key set exactly, and the
/// routine is idempotent for a fixed fresh list.
pub fn reconcile<L, F, K, LK, FK, U, C>(
    live: &mut Vec<L>,
    fresh: &[F],
    mut live_key: LK,
    mut fresh_key: FK,
    mut update: U,
    mut create: C,
) -> Vec<L>
where
    K: Eq + Hash,
    LK: FnMut(&L) -> K,
    FK: FnMut(&F) -> K,
    U: FnMut(&mut L, &F),
    C: FnMut(&F) -> L,
{
    let fresh_keys: HashSet<K> = fresh.iter().map(&mut fresh_key).collect();

    let mut evicted = Vec::new();
    for i in (0..live.len()).rev() {
        if !fresh_keys.contains(&live_key(&live[i])) {
            evicted.push(live.remove(i));
        }
    }

    for item in fresh {
        let key = fresh_key(item);
        if let Some(existing) = live.iter_mut().find(|entry| live_key(entry) == key) {
            update(existing, item);
        } else {
            live.push(create(item));
        }
    }

    evicted
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod reconcile_test;
