pub mod index;
pub mod matching;
pub mod popularity;
pub mod search;
pub mod weights;

use std::{future::Future, pin::Pin, sync::Arc};

use tracing::warn;

pub use index::{IndexOutcome, ReindexReport};
pub use matching::{BuyerProfile, LeadMatchItem, MatchOutcome, MatchReport, MatchRequest};
pub use popularity::PopularityReport;
pub use search::{
	RankingMode, SearchFilters, SearchItem, SearchRequest, SearchResponse, SortMode,
};

use casafind_config::{Config, EmbeddingProviderConfig};
use casafind_domain::EmbeddingVector;
use casafind_providers::embedding;
use casafind_storage::{db::Db, qdrant::QdrantStore};

pub type ServiceResult<T> = Result<T, ServiceError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

#[derive(Debug)]
pub enum ServiceError {
	InvalidRequest { message: String },
	ScopeDenied { message: String },
	Provider { message: String },
	Storage { message: String },
	Qdrant { message: String },
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}

pub struct CasafindService {
	pub cfg: Config,
	pub db: Db,
	pub qdrant: QdrantStore,
	pub providers: Providers,
}

struct DefaultProviders;

impl std::fmt::Display for ServiceError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::InvalidRequest { message } => write!(f, "Invalid request: {message}"),
			Self::ScopeDenied { message } => write!(f, "Scope denied: {message}"),
			Self::Provider { message } => write!(f, "Provider error: {message}"),
			Self::Storage { message } => write!(f, "Storage error: {message}"),
			Self::Qdrant { message } => write!(f, "Qdrant error: {message}"),
		}
	}
}

impl std::error::Error for ServiceError {}

impl From<sqlx::Error> for ServiceError {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<casafind_storage::Error> for ServiceError {
	fn from(err: casafind_storage::Error) -> Self {
		match err {
			casafind_storage::Error::Sqlx(err) => Self::Storage { message: err.to_string() },
			casafind_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			casafind_storage::Error::Qdrant(err) => Self::Qdrant { message: err.to_string() },
		}
	}
}

impl From<color_eyre::Report> for ServiceError {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}

impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

impl CasafindService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		Self { cfg, db, qdrant, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, db: Db, qdrant: QdrantStore, providers: Providers) -> Self {
		Self { cfg, db, qdrant, providers }
	}

	/// Best-effort embedding of one text. Provider failure, a wrong dimension,
	/// or a non-finite value all collapse to `None`; the caller carries on
	/// without a vector.
	pub(crate) async fn try_embed(&self, text: &str) -> Option<EmbeddingVector> {
		let cfg = &self.cfg.providers.embedding;
		let expected = self.cfg.storage.qdrant.vector_dim;
		let result =
			self.providers.embedding.embed(cfg, std::slice::from_ref(&text.to_string())).await;
		let raw = match result {
			Ok(mut vectors) => vectors.pop(),
			Err(err) => {
				warn!(error = %err, "Embedding request failed; continuing without a vector.");
				return None;
			},
		};
		let Some(raw) = raw else {
			warn!("Embedding provider returned no vectors; continuing without a vector.");
			return None;
		};

		match EmbeddingVector::new(raw, expected) {
			Ok(vec) => Some(vec),
			Err(err) => {
				warn!(error = %err, "Embedding failed validation; continuing without a vector.");
				None
			},
		}
	}
}

pub(crate) fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);
	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}
		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

/// Inverse of [`vector_to_pg`], for vectors read back through a `::text` cast.
/// Anything that does not parse as a non-empty bracketed list yields `None`.
pub(crate) fn pg_to_vector(text: &str) -> Option<Vec<f32>> {
	let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;

	if inner.trim().is_empty() {
		return None;
	}

	inner.split(',').map(|value| value.trim().parse::<f32>().ok()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vector_to_pg_brackets_values() {
		assert_eq!(vector_to_pg(&[1.0, -0.5, 0.25]), "[1,-0.5,0.25]");
		assert_eq!(vector_to_pg(&[]), "[]");
	}

	#[test]
	fn pg_vector_text_round_trips() {
		let original = vec![1.0_f32, -0.5, 0.25];

		assert_eq!(pg_to_vector(&vector_to_pg(&original)), Some(original));
		assert_eq!(pg_to_vector("[]"), None);
		assert_eq!(pg_to_vector("0.5,1"), None);
	}
}
