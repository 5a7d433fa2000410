use kcorrect::correct::region::{select_region, sort_by_probability};

#[test]
fn intersection_region_covers_every_implicated_window() {
    // L=30, k=5, untrusted windows starting at 10 and 12: intersection of
    // [10,14] and [12,16] is [12,14], no edge extension either side.
    let region = select_region(&[10, 12], 30, 5);
    let mut sorted = region.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![12, 13, 14]);
}

#[test]
fn single_window_touching_both_edges_keeps_entire_short_read() {
    // L=5, k=5: the only possible window is [0,4], both edge conditions
    // hold, so the whole read is in play.
    let region = select_region(&[0], 5, 5);
    let mut sorted = region.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
}

#[test]
fn sort_by_probability_is_stable_on_ties() {
    let p = vec![0.5, 0.5, 0.9];
    let region = vec![0, 1, 2];
    let sorted = sort_by_probability(region, &p);
    // Both 0 and 1 tie at 0.5; stable sort keeps their relative order.
    assert_eq!(sorted, vec![0, 1, 2]);
}
