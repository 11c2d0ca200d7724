/// Median of a sample set, sorting it in place.
///
/// Odd-length sets yield the central element, even-length sets the mean of the two central
/// elements. No samples are discarded as outliers. Returns `None` for an empty set.
pub fn median(samples: &mut [f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(f64::total_cmp);

    let center = samples.len() / 2;
    if samples.len() % 2 == 0 {
        Some((samples[center - 1] + samples[center]) / 2.0)
    } else {
        Some(samples[center])
    }
}
