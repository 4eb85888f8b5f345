//! Bounded comment retention.

/// Most recent messages kept in the comment list.
pub const MAX_RETAIN: usize = 100;

/// Result of appending a batch to the retained list.
#[derive(Debug, Clone, PartialEq)]
pub struct Retained<T> {
    pub retained: Vec<T>,
    /// Oldest messages pushed out, in arrival order.
    pub overflow: Vec<T>,
}

/// Append `batch` to `current` and keep at most `max` messages.
///
/// `overflow ++ retained` is `current ++ batch`.
pub fn retain<T: Clone>(current: &[T], batch: &[T], max: usize) -> Retained<T> {
    let total = current.len() + batch.len();
    let cut = total.saturating_sub(max);

    let mut all = current.iter().chain(batch.iter()).cloned();
    let overflow = all.by_ref().take(cut).collect();
    let retained = all.collect();
    Retained { retained, overflow }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_cap_keeps_everything() {
        let out = retain(&[1, 2], &[3], MAX_RETAIN);
        assert_eq!(out.retained, vec![1, 2, 3]);
        assert!(out.overflow.is_empty());
    }

    #[test]
    fn test_overflow_moves_oldest_in_order() {
        let current: Vec<u32> = (0..99).collect();
        let batch: Vec<u32> = (99..103).collect();
        let out = retain(&current, &batch, MAX_RETAIN);

        assert_eq!(out.retained.len(), MAX_RETAIN);
        assert_eq!(out.retained[0], 3);
        assert_eq!(out.overflow, vec![0, 1, 2]);

        let mut history = out.overflow.clone();
        history.extend(out.retained);
        assert_eq!(history, (0..103).collect::<Vec<_>>());
    }

    #[test]
    fn test_batch_larger_than_cap() {
        let batch: Vec<u32> = (0..5).collect();
        let out = retain(&[], &batch, 2);
        assert_eq!(out.retained, vec![3, 4]);
        assert_eq!(out.overflow, vec![0, 1, 2]);
    }
}
