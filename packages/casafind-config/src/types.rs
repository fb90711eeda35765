use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub popularity: Popularity,
	#[serde(default)]
	pub matching: Matching,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Hybrid query-planner weights. The numeric defaults are hand-tuned carry-overs
/// and have not been validated empirically; treat them as re-tuning candidates.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ranking {
	pub text_weight: f32,
	pub vector_weight: f32,
	pub candidate_k: u32,
	pub popularity_weight: f32,
	pub popularity_saturation: f32,
	pub saves_weight: f32,
	pub saves_saturation: f32,
	pub boost_weight: f32,
	pub boost_scalars: BoostScalars,
	pub default_limit: u32,
	pub max_limit: u32,
}
impl Default for Ranking {
	fn default() -> Self {
		Self {
			text_weight: 0.45,
			vector_weight: 0.55,
			candidate_k: 250,
			popularity_weight: 0.15,
			popularity_saturation: 25.0,
			saves_weight: 0.10,
			saves_saturation: 10.0,
			boost_weight: 0.20,
			boost_scalars: BoostScalars::default(),
			default_limit: 20,
			max_limit: 100,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BoostScalars {
	pub basic: f32,
	pub premium: f32,
	pub platinum: f32,
}
impl Default for BoostScalars {
	fn default() -> Self {
		Self { basic: 0.45, premium: 0.70, platinum: 1.0 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Popularity {
	pub window_days: i64,
	pub half_life_days: f32,
	pub save_weight: f32,
	pub view_weight: f32,
	pub recency_bonus_per_day: f32,
	pub trending_percentile: f32,
	pub small_segment_max: usize,
	pub min_saves_for_badge: i64,
	pub min_views_for_badge: i64,
	pub global_fallback_limit: usize,
}
impl Default for Popularity {
	fn default() -> Self {
		Self {
			window_days: 7,
			half_life_days: 3.0,
			save_weight: 5.0,
			view_weight: 1.0,
			recency_bonus_per_day: 0.5,
			trending_percentile: 0.10,
			small_segment_max: 8,
			min_saves_for_badge: 5,
			min_views_for_badge: 60,
			global_fallback_limit: 10,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Matching {
	pub top_k: u32,
	pub freshness_tau_days: f32,
	pub points: MatchingPoints,
	pub weights: MatchingWeights,
}
impl Default for Matching {
	fn default() -> Self {
		Self {
			top_k: 20,
			freshness_tau_days: 14.0,
			points: MatchingPoints::default(),
			weights: MatchingWeights::default(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MatchingPoints {
	pub budget: f32,
	pub bedrooms: f32,
	pub bathrooms: f32,
	pub size: f32,
	pub commune: f32,
	pub amenity: f32,
}
impl Default for MatchingPoints {
	fn default() -> Self {
		Self { budget: 30.0, bedrooms: 20.0, bathrooms: 10.0, size: 15.0, commune: 15.0, amenity: 5.0 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MatchingWeights {
	pub structured_base: f32,
	pub relaxation_step: f32,
	pub sparse_profile_shift: f32,
	pub rich_profile_dimensions: u32,
	pub small_pool_size: usize,
	pub large_pool_size: usize,
	pub pool_shift: f32,
	pub min_structured: f32,
	pub max_structured: f32,
}
impl Default for MatchingWeights {
	fn default() -> Self {
		Self {
			structured_base: 0.70,
			relaxation_step: 0.125,
			sparse_profile_shift: 0.20,
			rich_profile_dimensions: 6,
			small_pool_size: 5,
			large_pool_size: 150,
			pool_shift: 0.05,
			min_structured: 0.20,
			max_structured: 0.95,
		}
	}
}
