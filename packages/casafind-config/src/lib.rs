mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	BoostScalars, Config, EmbeddingProviderConfig, Matching, MatchingPoints, MatchingWeights,
	Popularity, Postgres, Providers, Qdrant, Ranking, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.admin_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.admin_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}

	validate_ranking(&cfg.ranking)?;
	validate_popularity(&cfg.popularity)?;
	validate_matching(&cfg.matching)?;

	Ok(())
}

fn validate_ranking(ranking: &Ranking) -> Result<()> {
	for (path, value) in [
		("ranking.text_weight", ranking.text_weight),
		("ranking.vector_weight", ranking.vector_weight),
		("ranking.popularity_weight", ranking.popularity_weight),
		("ranking.saves_weight", ranking.saves_weight),
		("ranking.boost_weight", ranking.boost_weight),
		("ranking.boost_scalars.basic", ranking.boost_scalars.basic),
		("ranking.boost_scalars.premium", ranking.boost_scalars.premium),
		("ranking.boost_scalars.platinum", ranking.boost_scalars.platinum),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{path} must be a finite number.") });
		}
		if value < 0.0 {
			return Err(Error::Validation { message: format!("{path} must be zero or greater.") });
		}
	}

	if (ranking.text_weight + ranking.vector_weight - 1.0).abs() > 1e-3 {
		return Err(Error::Validation {
			message: "ranking.text_weight and ranking.vector_weight must sum to 1.0.".to_string(),
		});
	}
	if ranking.boost_scalars.basic >= ranking.boost_scalars.premium
		|| ranking.boost_scalars.premium >= ranking.boost_scalars.platinum
	{
		return Err(Error::Validation {
			message: "ranking.boost_scalars must be strictly increasing from basic to platinum."
				.to_string(),
		});
	}
	if ranking.popularity_saturation <= 0.0 || ranking.saves_saturation <= 0.0 {
		return Err(Error::Validation {
			message: "ranking saturation constants must be greater than zero.".to_string(),
		});
	}
	if ranking.candidate_k == 0 {
		return Err(Error::Validation {
			message: "ranking.candidate_k must be greater than zero.".to_string(),
		});
	}
	if ranking.default_limit == 0 || ranking.default_limit > ranking.max_limit {
		return Err(Error::Validation {
			message: "ranking.default_limit must be in the range 1..=ranking.max_limit."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_popularity(popularity: &Popularity) -> Result<()> {
	if popularity.window_days <= 0 {
		return Err(Error::Validation {
			message: "popularity.window_days must be greater than zero.".to_string(),
		});
	}
	if !popularity.half_life_days.is_finite() || popularity.half_life_days <= 0.0 {
		return Err(Error::Validation {
			message: "popularity.half_life_days must be a positive finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&popularity.trending_percentile)
		|| popularity.trending_percentile == 0.0
	{
		return Err(Error::Validation {
			message: "popularity.trending_percentile must be in the range (0.0, 1.0].".to_string(),
		});
	}
	if popularity.min_saves_for_badge < 0 || popularity.min_views_for_badge < 0 {
		return Err(Error::Validation {
			message: "popularity badge minimums must be zero or greater.".to_string(),
		});
	}

	Ok(())
}

fn validate_matching(matching: &Matching) -> Result<()> {
	if matching.top_k == 0 {
		return Err(Error::Validation {
			message: "matching.top_k must be greater than zero.".to_string(),
		});
	}
	if !matching.freshness_tau_days.is_finite() || matching.freshness_tau_days <= 0.0 {
		return Err(Error::Validation {
			message: "matching.freshness_tau_days must be a positive finite number.".to_string(),
		});
	}

	let weights = &matching.weights;

	for (path, value) in [
		("matching.weights.structured_base", weights.structured_base),
		("matching.weights.relaxation_step", weights.relaxation_step),
		("matching.weights.sparse_profile_shift", weights.sparse_profile_shift),
		("matching.weights.pool_shift", weights.pool_shift),
		("matching.weights.min_structured", weights.min_structured),
		("matching.weights.max_structured", weights.max_structured),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{path} must be a finite number.") });
		}
		if !(0.0..=1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{path} must be in the range 0.0-1.0."),
			});
		}
	}

	if weights.min_structured >= weights.max_structured {
		return Err(Error::Validation {
			message: "matching.weights.min_structured must be less than max_structured."
				.to_string(),
		});
	}
	if weights.small_pool_size >= weights.large_pool_size {
		return Err(Error::Validation {
			message: "matching.weights.small_pool_size must be less than large_pool_size."
				.to_string(),
		});
	}
	if weights.rich_profile_dimensions == 0 {
		return Err(Error::Validation {
			message: "matching.weights.rich_profile_dimensions must be greater than zero."
				.to_string(),
		});
	}

	let points = &matching.points;

	for (path, value) in [
		("matching.points.budget", points.budget),
		("matching.points.bedrooms", points.bedrooms),
		("matching.points.bathrooms", points.bathrooms),
		("matching.points.size", points.size),
		("matching.points.commune", points.commune),
		("matching.points.amenity", points.amenity),
	] {
		if !value.is_finite() || value <= 0.0 {
			return Err(Error::Validation {
				message: format!("{path} must be a positive finite number."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let embedding = &mut cfg.providers.embedding;

	if embedding.path.trim().is_empty() {
		embedding.path = "/v1/embeddings".to_string();
	}

	while embedding.api_base.ends_with('/') {
		embedding.api_base.pop();
	}
}
