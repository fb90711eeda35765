use casafind_config::MatchingWeights;
use casafind_domain::RelaxationLevel;

/// Structured/semantic blend weights for one match run. Pure function of the
/// run's observable signals; no hidden state.
///
/// Deeper relaxation shifts trust toward the semantic signal (the hard
/// constraints were not fully satisfiable), sparse profiles shift the same
/// way (little structure to score against), and pool size nudges the blend at
/// the extremes. Without any semantic signal the blend collapses to fully
/// structured.
pub fn match_weights(
	cfg: &MatchingWeights,
	relaxation: RelaxationLevel,
	specified_dimensions: u32,
	pool_size: usize,
	semantic_available: bool,
) -> (f32, f32) {
	if !semantic_available {
		return (1.0, 0.0);
	}

	let mut structured = cfg.structured_base - cfg.relaxation_step * relaxation.depth() as f32;

	if specified_dimensions < cfg.rich_profile_dimensions {
		let missing = (cfg.rich_profile_dimensions - specified_dimensions) as f32;

		structured -= cfg.sparse_profile_shift * missing / cfg.rich_profile_dimensions as f32;
	}

	if pool_size >= cfg.large_pool_size {
		structured -= cfg.pool_shift;
	} else if pool_size <= cfg.small_pool_size {
		structured += cfg.pool_shift;
	}

	let structured = structured.clamp(cfg.min_structured, cfg.max_structured);

	(structured, 1.0 - structured)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cfg() -> MatchingWeights {
		MatchingWeights::default()
	}

	#[test]
	fn weights_sum_to_one() {
		let cfg = cfg();

		for level in RelaxationLevel::ALL {
			for dims in 0..=8 {
				for pool in [1, 10, 200] {
					let (s, v) = match_weights(&cfg, level, dims, pool, true);

					assert!((s + v - 1.0).abs() < 1e-6);
					assert!(s > 0.0 && s < 1.0);
				}
			}
		}
	}

	#[test]
	fn collapses_to_structured_without_semantic_signal() {
		let (s, v) = match_weights(&cfg(), RelaxationLevel::BudgetOnly, 2, 40, false);

		assert_eq!((s, v), (1.0, 0.0));
	}

	#[test]
	fn relaxation_shifts_weight_toward_semantic() {
		let cfg = cfg();
		let (strict, _) = match_weights(&cfg, RelaxationLevel::Strict, 6, 40, true);
		let (relaxed, semantic) = match_weights(&cfg, RelaxationLevel::DropCategory, 6, 40, true);

		assert!((strict - 0.70).abs() < 1e-6);
		assert!((relaxed - 0.45).abs() < 1e-6);
		assert!((semantic - 0.55).abs() < 1e-6);
	}

	#[test]
	fn sparse_profiles_lean_semantic() {
		let cfg = cfg();
		let (rich, _) = match_weights(&cfg, RelaxationLevel::Strict, 6, 40, true);
		let (sparse, _) = match_weights(&cfg, RelaxationLevel::Strict, 1, 40, true);

		assert!(sparse < rich);
	}

	#[test]
	fn pool_size_nudges_the_blend_at_the_extremes() {
		let cfg = cfg();
		let (small, _) = match_weights(&cfg, RelaxationLevel::Strict, 6, 3, true);
		let (medium, _) = match_weights(&cfg, RelaxationLevel::Strict, 6, 40, true);
		let (large, _) = match_weights(&cfg, RelaxationLevel::Strict, 6, 300, true);

		assert!(small > medium);
		assert!(large < medium);
	}

	#[test]
	fn structured_weight_stays_within_bounds() {
		let cfg = cfg();
		let (floor, _) = match_weights(&cfg, RelaxationLevel::BudgetOnly, 0, 500, true);
		let (ceiling, _) = match_weights(&cfg, RelaxationLevel::Strict, 8, 1, true);

		assert!(floor >= cfg.min_structured);
		assert!(ceiling <= cfg.max_structured);
	}
}
