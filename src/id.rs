use std::sync::{Mutex, OnceLock};
use uuid::Uuid;

/// Generate a new item identifier.
///
/// Identifiers are UUIDv7 values rendered as 32 lowercase hex characters.
/// The leading 48 bits are a millisecond timestamp and the rendering is fixed
/// width, so lexicographic order equals creation order. Within this process
/// every call returns a value strictly greater than the previous one, even
/// when the clock stalls or steps backwards.
pub fn generate_id() -> String {
    next_after(last_issued(), Uuid::now_v7())
        .simple()
        .to_string()
}

fn last_issued() -> &'static Mutex<u128> {
    static LAST: OnceLock<Mutex<u128>> = OnceLock::new();
    LAST.get_or_init(|| Mutex::new(0))
}

fn next_after(last: &Mutex<u128>, candidate: Uuid) -> Uuid {
    let mut last = last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let candidate = candidate.as_u128();
    let next = if candidate > *last {
        candidate
    } else {
        last.wrapping_add(1)
    };
    *last = next;
    Uuid::from_u128(next)
}

/// Whether `id` has the shape of an identifier produced by [`generate_id`].
pub fn is_well_formed(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn ids_are_fixed_width_lowercase_hex() {
        let id = generate_id();
        assert!(is_well_formed(&id), "{id}");
        assert!(!is_well_formed("01J0-not-an-id"));
    }

    #[test]
    fn stalled_clock_still_increases() {
        let last = Mutex::new(0);
        let candidate = Uuid::from_u128(1_000);
        let first = next_after(&last, candidate);
        let second = next_after(&last, candidate);
        let earlier = next_after(&last, Uuid::from_u128(10));
        assert!(first < second);
        assert!(second < earlier);
        assert_eq!(earlier.as_u128(), 1_002);
    }

    #[test]
    fn sequential_ids_sort_by_creation() {
        let ids: Vec<String> = (0..1000).map(|_| generate_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn concurrent_ids_are_unique() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (0..500).map(|_| generate_id()).collect::<Vec<_>>()))
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id");
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
