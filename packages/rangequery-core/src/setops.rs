//! Set algebra over ordered string sequences.
//!
//! Sequences are treated as sets (duplicates ignored) but rendered back
//! as ordered results: first-occurrence order is preserved throughout.

/// Union(A, B): the longer input in order, then elements of the shorter
/// input absent from the longer. Worst case O(|A| * |B|) — acceptable,
/// sequences here are small.
pub fn union(a: &[String], b: &[String]) -> Vec<String> {
    let (longer, shorter) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    let mut result = dedup_into(longer);
    for elem in shorter {
        if !result.iter().any(|e| e == elem) {
            result.push(elem.clone());
        }
    }
    result
}

/// Intersection(A, B): iterate the shorter side, keep elements present
/// in the longer side, in the shorter side's order.
pub fn intersection(a: &[String], b: &[String]) -> Vec<String> {
    let (longer, shorter) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for elem in shorter {
        if longer.iter().any(|e| e == elem) && seen.insert(elem.clone()) {
            result.push(elem.clone());
        }
    }
    result
}

/// Difference(A, B) = { x in A | x not in B }, the conventional
/// left-biased set difference.
///
/// The original Go implementation this engine is derived from computes
/// a size-symmetric difference instead (iterates whichever side is
/// longer). `spec.md` §9 calls that out as a likely bug and recommends
/// the conventional `A \ B`; that is what this function implements.
pub fn difference(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for elem in a {
        if !b.iter().any(|e| e == elem) && seen.insert(elem.clone()) {
            result.push(elem.clone());
        }
    }
    result
}

/// In-place dedup preserving first occurrence.
pub fn dedup(array: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    array.retain(|elem| seen.insert(elem.clone()));
}

fn dedup_into(slice: &[String]) -> Vec<String> {
    let mut result = slice.to_vec();
    dedup(&mut result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn union_is_ordered_first_occurrence() {
        let a = v(&["a", "b", "c"]);
        let b = v(&["c", "d"]);
        assert_eq!(union(&a, &b), v(&["a", "b", "c", "d"]));
    }

    #[test]
    fn union_with_empty_is_dedup() {
        let a = v(&["x", "x", "y"]);
        let empty: Vec<String> = vec![];
        assert_eq!(union(&a, &empty), v(&["x", "y"]));
    }

    #[test]
    fn intersection_preserves_shorter_order() {
        let a = v(&["a", "b", "c", "d"]);
        let b = v(&["d", "b"]);
        assert_eq!(intersection(&a, &b), v(&["d", "b"]));
    }

    #[test]
    fn intersection_of_self_is_dedup() {
        let a = v(&["a", "a", "b"]);
        assert_eq!(intersection(&a, &a), v(&["a", "b"]));
    }

    #[test]
    fn difference_is_left_biased() {
        // A = {1,2,3}, B = {2,3,4} -> A - B = {1}
        let a = v(&["1", "2", "3"]);
        let b = v(&["2", "3", "4"]);
        assert_eq!(difference(&a, &b), v(&["1"]));
    }

    #[test]
    fn difference_of_self_is_empty() {
        let a = v(&["a", "b"]);
        assert_eq!(difference(&a, &a), Vec::<String>::new());
    }

    #[test]
    fn difference_with_larger_right_side_still_left_biased() {
        // Regression for the size-symmetric bug in the original: here
        // B is much larger than A, so the buggy implementation would
        // iterate B and filter by A instead of the other way round.
        let a = v(&["keep"]);
        let b = v(&["a", "b", "c", "d", "e", "keep-not"]);
        assert_eq!(difference(&a, &b), v(&["keep"]));
    }

    #[test]
    fn bounds_hold() {
        let a = v(&["a", "b", "c"]);
        let b = v(&["b", "c", "d", "e"]);
        assert!(union(&a, &b).len() <= a.len() + b.len());
        assert!(intersection(&a, &b).len() <= a.len().min(b.len()));
    }

    #[test]
    fn dedup_is_idempotent() {
        let mut once = v(&["a", "b", "a", "c", "b"]);
        dedup(&mut once);
        let mut twice = once.clone();
        dedup(&mut twice);
        assert_eq!(once, twice);
        assert_eq!(once, v(&["a", "b", "c"]));
    }

    #[test]
    fn empty_inputs_are_fine() {
        let empty: Vec<String> = vec![];
        assert_eq!(union(&empty, &empty), empty);
        assert_eq!(intersection(&empty, &empty), empty);
        assert_eq!(difference(&empty, &empty), empty);
    }
}
