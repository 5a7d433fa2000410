//! Component C: region selector.
//!
//! From the sorted list of untrusted k-mer start positions in a read,
//! compute the read positions that could carry the responsible errors —
//! the intersection of the implicated k-mer windows when one exists
//! (extended to the read edges when a boundary-adjacent k-mer is
//! untrusted), or their union otherwise.

/// Compute the candidate error region for a read of length `l` with
/// k-mer length `k`, given `untrusted` (sorted ascending, the k-mer start
/// positions whose window is not in the trusted set).
///
/// Returns an unsorted list of positions (order is an artifact of the
/// intersection/extension construction); callers sort it by ascending
/// per-base probability before use (see [`sort_by_probability`]).
pub fn select_region(untrusted: &[usize], l: usize, k: usize) -> Vec<usize> {
    let Some(&first) = untrusted.first() else {
        return Vec::new();
    };
    let last = *untrusted.last().unwrap();

    // Intersection of windows [u, u+k-1] over all u in `untrusted`:
    // start = max(u) = last (list is sorted ascending), end = min(u+k-1)
    // = first + k - 1.
    let inter_start = last;
    let inter_end = first + k - 1;

    if inter_start <= inter_end {
        let mut region: Vec<usize> = (inter_start..=inter_end).collect();
        if first <= k - 1 {
            region.extend(0..inter_start);
        }
        if last >= l - k {
            region.extend((inter_end + 1)..l);
        }
        region
    } else {
        let mut positions = std::collections::BTreeSet::new();
        for &u in untrusted {
            let end = (u + k - 1).min(l - 1);
            for pos in u..=end {
                positions.insert(pos);
            }
        }
        positions.into_iter().collect()
    }
}

/// Sort region positions by ascending per-base accuracy probability
/// (least-trusted base first). Ties are broken arbitrarily (stable sort
/// preserves the region's original relative order for equal `p`).
pub fn sort_by_probability(mut region: Vec<usize>, p: &[f64]) -> Vec<usize> {
    region.sort_by(|&a, &b| p[a].partial_cmp(&p[b]).expect("quality probabilities are never NaN"));
    region
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_untrusted_kmer_region_is_its_own_window() {
        // L=10, k=4, untrusted={4}: window [4,7], not edge-adjacent on
        // either side (first=4 > k-1=3, last=4 < L-k=6).
        let region = select_region(&[4], 10, 4);
        let mut sorted = region.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![4, 5, 6, 7]);
    }

    #[test]
    fn left_edge_adjacent_extends_to_read_start() {
        // L=10, k=4, untrusted={1}: first=1 <= k-1=3, so region extends
        // down to 0.
        let region = select_region(&[1], 10, 4);
        let mut sorted = region.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn right_edge_adjacent_extends_to_read_end() {
        // L=10, k=4, untrusted={6}: last=6 >= L-k=6, extends up to L-1=9.
        let region = select_region(&[6], 10, 4);
        let mut sorted = region.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![6, 7, 8, 9]);
    }

    #[test]
    fn disjoint_untrusted_windows_fall_back_to_union() {
        // L=20, k=4, untrusted={0, 10}: windows [0,3] and [10,13] don't
        // intersect (and aren't mutually edge-adjacent in a way that would
        // connect them), so the region is their union.
        let region = select_region(&[0, 10], 20, 4);
        let mut sorted = region.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 10, 11, 12, 13]);
    }

    #[test]
    fn sort_by_probability_orders_lowest_confidence_first() {
        let p = vec![0.999, 0.5, 0.9, 0.6];
        let region = vec![0, 1, 2, 3];
        let sorted = sort_by_probability(region, &p);
        assert_eq!(sorted, vec![1, 3, 2, 0]);
    }
}
