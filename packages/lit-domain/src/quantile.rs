/// Quantile with linear interpolation between closest ranks.
///
/// For sorted values `v` and quantile `q`, the position is `q * (n - 1)`; the result
/// interpolates between the two neighbouring values. Returns `None` for an empty input,
/// any non-finite value, or `q` outside `[0, 1]`.
pub fn linear(values: &[f32], q: f32) -> Option<f32> {
	if values.is_empty() || !q.is_finite() || !(0.0..=1.0).contains(&q) {
		return None;
	}
	if values.iter().any(|value| !value.is_finite()) {
		return None;
	}

	let mut sorted = values.to_vec();

	sorted.sort_by(|lhs, rhs| lhs.total_cmp(rhs));

	let position = q as f64 * (sorted.len() - 1) as f64;
	let lower = position.floor() as usize;
	let upper = position.ceil() as usize;
	let fraction = position - lower as f64;
	let low = sorted[lower] as f64;
	let high = sorted[upper] as f64;

	Some((low + (high - low) * fraction) as f32)
}

/// True when a score distribution cannot separate documents: empty, non-finite, or with
/// every value equal.
pub fn is_degenerate(values: &[f32]) -> bool {
	if values.is_empty() || values.iter().any(|value| !value.is_finite()) {
		return true;
	}

	let min = values.iter().copied().fold(f32::INFINITY, f32::min);
	let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);

	max - min <= f32::EPSILON
}
