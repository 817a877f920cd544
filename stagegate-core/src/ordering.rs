//! Build-order shifts
//!
//! Stages of a pipeline are numbered `1..=N` without gaps. Moving or removing
//! a stage displaces a contiguous block of its neighbours by one position;
//! [`OrderShift`] describes that block so the store can apply it as a single
//! ranged update.

/// Shift of every build order in `first..=last` by `delta`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderShift {
    pub first: i32,
    pub last: i32,
    pub delta: i32,
}

impl OrderShift {
    /// Shift making room for a stage moving from `old` to `new`.
    ///
    /// Moving earlier pushes `[new, old)` down by one, moving later pulls
    /// `(old, new]` up by one. Returns `None` when nothing moves.
    pub fn for_move(old: i32, new: i32) -> Option<Self> {
        if new < old {
            Some(Self {
                first: new,
                last: old - 1,
                delta: 1,
            })
        } else if new > old {
            Some(Self {
                first: old + 1,
                last: new,
                delta: -1,
            })
        } else {
            None
        }
    }

    /// Shift closing the gap left by removing the stage at `removed` from a
    /// pipeline that had `count` stages.
    pub fn for_removal(removed: i32, count: i32) -> Option<Self> {
        if removed >= count {
            return None;
        }
        Some(Self {
            first: removed + 1,
            last: count,
            delta: -1,
        })
    }

    pub fn contains(&self, build_order: i32) -> bool {
        (self.first..=self.last).contains(&build_order)
    }

    /// Position of `build_order` after the shift
    pub fn apply(&self, build_order: i32) -> i32 {
        if self.contains(build_order) {
            build_order + self.delta
        } else {
            build_order
        }
    }
}

/// Whether `orders` is exactly `{1..=orders.len()}`
pub fn is_dense(orders: &[i32]) -> bool {
    let mut sorted = orders.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .zip(1..)
        .all(|(order, expected)| *order == expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_earlier_pushes_range_down() {
        let shift = OrderShift::for_move(4, 2).unwrap();
        assert_eq!(
            shift,
            OrderShift {
                first: 2,
                last: 3,
                delta: 1
            }
        );
        assert_eq!(shift.apply(1), 1);
        assert_eq!(shift.apply(2), 3);
        assert_eq!(shift.apply(3), 4);
        assert_eq!(shift.apply(5), 5);
    }

    #[test]
    fn test_move_later_pulls_range_up() {
        let shift = OrderShift::for_move(1, 3).unwrap();
        assert_eq!(
            shift,
            OrderShift {
                first: 2,
                last: 3,
                delta: -1
            }
        );
        assert_eq!(shift.apply(2), 1);
        assert_eq!(shift.apply(3), 2);
        assert_eq!(shift.apply(4), 4);
    }

    #[test]
    fn test_move_to_same_position_is_noop() {
        assert_eq!(OrderShift::for_move(3, 3), None);
    }

    #[test]
    fn test_removal_closes_gap() {
        let shift = OrderShift::for_removal(2, 4).unwrap();
        let remaining: Vec<i32> = [1, 3, 4].iter().map(|o| shift.apply(*o)).collect();
        assert_eq!(remaining, vec![1, 2, 3]);
    }

    #[test]
    fn test_removal_of_last_stage_needs_no_shift() {
        assert_eq!(OrderShift::for_removal(4, 4), None);
        assert_eq!(OrderShift::for_removal(1, 1), None);
    }

    #[test]
    fn test_move_keeps_orders_dense() {
        let orders = [1, 2, 3, 4, 5];
        for old in 1..=5 {
            for new in 1..=5 {
                let moved: Vec<i32> = match OrderShift::for_move(old, new) {
                    Some(shift) => orders
                        .iter()
                        .map(|o| if *o == old { new } else { shift.apply(*o) })
                        .collect(),
                    None => orders.to_vec(),
                };
                assert!(is_dense(&moved), "{old} -> {new} gave {moved:?}");
            }
        }
    }

    #[test]
    fn test_is_dense() {
        assert!(is_dense(&[]));
        assert!(is_dense(&[2, 1, 3]));
        assert!(!is_dense(&[1, 1, 2]));
        assert!(!is_dense(&[1, 3]));
        assert!(!is_dense(&[0, 1]));
    }
}
