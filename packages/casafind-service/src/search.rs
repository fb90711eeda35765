use std::collections::{HashMap, HashSet};

use qdrant_client::qdrant::{
	Condition, Document, Filter, Query, QueryPointsBuilder, Range, ScoredPoint,
	point_id::PointIdOptions,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use casafind_config::Ranking;
use casafind_domain::{Badge, BoostLevel, VisibilityStatus, normalize_text};
use casafind_storage::{
	models::DocumentRow,
	qdrant::{BM25_MODEL, BM25_VECTOR_NAME, DENSE_VECTOR_NAME},
	queries,
};

use crate::{CasafindService, ServiceError, ServiceResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
	pub query: Option<String>,
	pub filters: SearchFilters,
	pub sort: SortMode,
	pub limit: Option<u32>,
	pub offset: u32,
	pub viewer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
	pub commune: Option<String>,
	pub kind: Option<String>,
	pub property_type: Option<String>,
	pub bedrooms_min: Option<i32>,
	pub min_price: Option<f64>,
	pub max_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortMode {
	#[default]
	Recommended,
	Newest,
	PriceAsc,
	PriceDesc,
}

/// How the returned page was actually ranked. Anything other than `Hybrid`
/// (or `Browse` for query-less requests) means a degraded mode, surfaced so
/// quality loss is observable rather than silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankingMode {
	Hybrid,
	TextOnly,
	VectorOnly,
	Fallback,
	Browse,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchItem {
	pub listing_id: Uuid,
	pub rank_score: f32,
	pub commune: String,
	pub kind: String,
	pub property_type: String,
	pub price: f64,
	pub bedrooms: i32,
	pub bathrooms: i32,
	pub size_sqm: f64,
	pub badge: Badge,
	pub saved_by_viewer: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
	pub items: Vec<SearchItem>,
	pub has_more: bool,
	pub next_offset: u32,
	pub mode: RankingMode,
}

#[derive(Debug, Clone, Copy, Default)]
struct RankSignals {
	decayed_score: f32,
	recent_saves: i64,
	badge: Badge,
	boost_scalar: f32,
}

#[derive(Debug, sqlx::FromRow)]
struct BrowseRow {
	listing_id: Uuid,
	commune: String,
	kind: String,
	property_type: String,
	price: f64,
	bedrooms: i32,
	bathrooms: i32,
	size_sqm: f64,
	badge: String,
}

impl CasafindService {
	pub async fn search(&self, request: SearchRequest) -> ServiceResult<SearchResponse> {
		let ranking = &self.cfg.ranking;
		let limit = request.limit.unwrap_or(ranking.default_limit).min(ranking.max_limit);

		if limit == 0 {
			return Err(ServiceError::InvalidRequest {
				message: "Limit must be at least 1.".to_string(),
			});
		}
		if let (Some(min), Some(max)) = (request.filters.min_price, request.filters.max_price)
			&& min > max
		{
			return Err(ServiceError::InvalidRequest {
				message: "min_price exceeds max_price.".to_string(),
			});
		}

		let query = request.query.as_deref().map(str::trim).filter(|q| !q.is_empty());

		match query {
			Some(query) => self.ranked_search(query, &request, limit).await,
			None => self.browse(&request, limit).await,
		}
	}

	async fn ranked_search(
		&self,
		query: &str,
		request: &SearchRequest,
		limit: u32,
	) -> ServiceResult<SearchResponse> {
		let normalized = normalize_text(query);
		let query_vec = self.try_embed(&normalized).await;
		let filter = qdrant_filter(&request.filters);
		let (text_points, dense_points) = tokio::join!(
			self.query_bm25(&normalized, &filter),
			self.query_dense(query_vec.as_ref().map(|vec| vec.as_slice()), &filter),
		);
		// Retrieval failures degrade to whatever the other leg returned; the
		// substring fallback below catches the case where both came up empty.
		let (text_points, text_failed) = match text_points {
			Ok(points) => (points, false),
			Err(err) => {
				warn!(error = %err, "Text retrieval failed; continuing without it.");
				(Vec::new(), true)
			},
		};
		let (dense_points, dense_failed) = match dense_points {
			Ok(points) => (points, false),
			Err(err) => {
				warn!(error = %err, "Vector retrieval failed; continuing without it.");
				(Vec::new(), true)
			},
		};

		let mut text_rank: HashMap<Uuid, f32> = HashMap::new();

		for (position, point) in text_points.iter().enumerate() {
			if let Some(id) = point_uuid(point) {
				text_rank.entry(id).or_insert(rank_relevance(position, text_points.len()));
			}
		}

		let mut semantic: HashMap<Uuid, f32> = HashMap::new();

		for point in &dense_points {
			if let Some(id) = point_uuid(point) {
				semantic.entry(id).or_insert(cosine_to_similarity(point.score));
			}
		}

		let union: Vec<Uuid> = {
			let mut seen = HashSet::new();
			let mut ids = Vec::new();

			for id in text_rank.keys().chain(semantic.keys()) {
				if seen.insert(*id) {
					ids.push(*id);
				}
			}

			ids.sort();

			ids
		};

		if union.is_empty() {
			return self.fallback_search(&normalized, request, limit).await;
		}

		let documents = self.fetch_documents(&union).await?;
		let signals = self.fetch_signals(&union).await;
		let mode = ranked_mode(query_vec.is_some(), text_failed, dense_failed);
		let mut ranked: Vec<(f32, DocumentRow)> = documents
			.into_iter()
			.map(|doc| {
				let signal = signals.get(&doc.listing_id).copied().unwrap_or_default();
				let score = hybrid_score(
					&self.cfg.ranking,
					text_rank.get(&doc.listing_id).copied().unwrap_or(0.0),
					semantic.get(&doc.listing_id).copied(),
					signal.decayed_score,
					signal.recent_saves,
					signal.boost_scalar,
				);

				(score, doc)
			})
			.collect();

		match request.sort {
			SortMode::Recommended => ranked.sort_by(|a, b| {
				b.0.total_cmp(&a.0).then_with(|| a.1.listing_id.cmp(&b.1.listing_id))
			}),
			SortMode::Newest => ranked.sort_by(|a, b| {
				b.1.updated_at
					.cmp(&a.1.updated_at)
					.then_with(|| a.1.listing_id.cmp(&b.1.listing_id))
			}),
			SortMode::PriceAsc => ranked.sort_by(|a, b| {
				a.1.price.total_cmp(&b.1.price).then_with(|| a.1.listing_id.cmp(&b.1.listing_id))
			}),
			SortMode::PriceDesc => ranked.sort_by(|a, b| {
				b.1.price.total_cmp(&a.1.price).then_with(|| a.1.listing_id.cmp(&b.1.listing_id))
			}),
		}

		let page: Vec<(f32, DocumentRow)> =
			ranked.into_iter().skip(request.offset as usize).take(limit as usize).collect();
		let saved = self.saved_flags(request.viewer_id, &page).await;
		let items: Vec<SearchItem> = page
			.into_iter()
			.map(|(score, doc)| {
				let signal = signals.get(&doc.listing_id).copied().unwrap_or_default();

				SearchItem {
					listing_id: doc.listing_id,
					rank_score: score,
					commune: doc.commune,
					kind: doc.kind,
					property_type: doc.property_type,
					price: doc.price,
					bedrooms: doc.bedrooms,
					bathrooms: doc.bathrooms,
					size_sqm: doc.size_sqm,
					badge: signal.badge,
					saved_by_viewer: saved.contains(&doc.listing_id),
				}
			})
			.collect();

		Ok(page_response(items, limit, request.offset, mode))
	}

	/// Plain substring match over the indexed search text, so a query with
	/// matching data never returns empty because of a retrieval-layer quirk.
	async fn fallback_search(
		&self,
		query: &str,
		request: &SearchRequest,
		limit: u32,
	) -> ServiceResult<SearchResponse> {
		let mut builder = sqlx::QueryBuilder::new(
			"\
SELECT
	d.listing_id,
	d.commune,
	d.kind,
	d.property_type,
	d.price,
	d.bedrooms,
	d.bathrooms,
	d.size_sqm,
	COALESCE(p.badge, 'NONE') AS badge
FROM listing_documents d
LEFT JOIN listing_popularity p ON p.listing_id = d.listing_id
WHERE d.status = ",
		);

		builder.push_bind(VisibilityStatus::Published.as_str());
		builder.push(" AND d.search_text ILIKE ");
		builder.push_bind(like_pattern(query));
		push_filters(&mut builder, &request.filters);
		builder.push(
			" ORDER BY COALESCE(p.decayed_score, 0) DESC, d.updated_at DESC, d.listing_id LIMIT ",
		);
		builder.push_bind(limit as i64);
		builder.push(" OFFSET ");
		builder.push_bind(request.offset as i64);

		let rows: Vec<BrowseRow> = builder.build_query_as().fetch_all(&self.db.pool).await?;
		let items = self.browse_items(rows, request.viewer_id).await;

		Ok(page_response(items, limit, request.offset, RankingMode::Fallback))
	}

	async fn browse(&self, request: &SearchRequest, limit: u32) -> ServiceResult<SearchResponse> {
		let now = OffsetDateTime::now_utc();
		let mut builder = sqlx::QueryBuilder::new(
			"\
SELECT
	d.listing_id,
	d.commune,
	d.kind,
	d.property_type,
	d.price,
	d.bedrooms,
	d.bathrooms,
	d.size_sqm,
	COALESCE(p.badge, 'NONE') AS badge
FROM listing_documents d
LEFT JOIN listing_popularity p ON p.listing_id = d.listing_id
LEFT JOIN promotion_boosts b ON b.listing_id = d.listing_id AND b.starts_at <= ",
		);

		builder.push_bind(now);
		builder.push(" AND b.ends_at >= ");
		builder.push_bind(now);
		builder.push(" WHERE d.status = ");
		builder.push_bind(VisibilityStatus::Published.as_str());
		push_filters(&mut builder, &request.filters);
		builder.push(match request.sort {
			// Strict deterministic tie-break chain for the recommended feed:
			// boost presence, boost tier, decayed popularity, recent saves,
			// recency, then id.
			SortMode::Recommended =>
				"\
 ORDER BY
	(b.level IS NOT NULL) DESC,
	CASE b.level WHEN 'PLATINUM' THEN 3 WHEN 'PREMIUM' THEN 2 WHEN 'BASIC' THEN 1 ELSE 0 END DESC,
	COALESCE(p.decayed_score, 0) DESC,
	COALESCE(p.saves_7d, 0) DESC,
	d.updated_at DESC,
	d.listing_id",
			SortMode::Newest => " ORDER BY d.updated_at DESC, d.listing_id",
			SortMode::PriceAsc => " ORDER BY d.price ASC, d.listing_id",
			SortMode::PriceDesc => " ORDER BY d.price DESC, d.listing_id",
		});
		builder.push(" LIMIT ");
		builder.push_bind(limit as i64);
		builder.push(" OFFSET ");
		builder.push_bind(request.offset as i64);

		let rows: Vec<BrowseRow> = builder.build_query_as().fetch_all(&self.db.pool).await?;
		let items = self.browse_items(rows, request.viewer_id).await;

		Ok(page_response(items, limit, request.offset, RankingMode::Browse))
	}

	async fn browse_items(&self, rows: Vec<BrowseRow>, viewer_id: Option<Uuid>) -> Vec<SearchItem> {
		let ids: Vec<Uuid> = rows.iter().map(|row| row.listing_id).collect();
		let saved = match viewer_id {
			Some(viewer_id) =>
				match queries::saved_listing_ids(&self.db, viewer_id, &ids).await {
					Ok(ids) => ids.into_iter().collect(),
					Err(err) => {
						warn!(error = %err, "Saved-listing lookup failed; flags omitted.");
						HashSet::new()
					},
				},
			None => HashSet::new(),
		};

		rows.into_iter()
			.map(|row| SearchItem {
				listing_id: row.listing_id,
				rank_score: 0.0,
				commune: row.commune,
				kind: row.kind,
				property_type: row.property_type,
				price: row.price,
				bedrooms: row.bedrooms,
				bathrooms: row.bathrooms,
				size_sqm: row.size_sqm,
				badge: Badge::parse(&row.badge).unwrap_or(Badge::None),
				saved_by_viewer: saved.contains(&row.listing_id),
			})
			.collect()
	}

	async fn query_bm25(&self, query: &str, filter: &Filter) -> ServiceResult<Vec<ScoredPoint>> {
		let candidate_k = self.cfg.ranking.candidate_k as u64;
		let search = QueryPointsBuilder::new(self.qdrant.collection.clone())
			.query(Query::new_nearest(Document::new(query.to_string(), BM25_MODEL)))
			.using(BM25_VECTOR_NAME)
			.filter(filter.clone())
			.limit(candidate_k);
		let response = self
			.qdrant
			.client
			.query(search)
			.await
			.map_err(|err| ServiceError::Qdrant { message: err.to_string() })?;

		Ok(response.result)
	}

	async fn query_dense(
		&self,
		query_vec: Option<&[f32]>,
		filter: &Filter,
	) -> ServiceResult<Vec<ScoredPoint>> {
		let Some(query_vec) = query_vec else {
			return Ok(Vec::new());
		};
		let candidate_k = self.cfg.ranking.candidate_k as u64;
		let search = QueryPointsBuilder::new(self.qdrant.collection.clone())
			.query(Query::new_nearest(query_vec.to_vec()))
			.using(DENSE_VECTOR_NAME)
			.filter(filter.clone())
			.limit(candidate_k);
		let response = self
			.qdrant
			.client
			.query(search)
			.await
			.map_err(|err| ServiceError::Qdrant { message: err.to_string() })?;

		Ok(response.result)
	}

	async fn fetch_documents(&self, ids: &[Uuid]) -> ServiceResult<Vec<DocumentRow>> {
		let rows = sqlx::query_as(
			"\
SELECT
	listing_id,
	agency_id,
	status,
	commune,
	kind,
	property_type,
	price,
	bedrooms,
	bathrooms,
	size_sqm,
	balcony,
	cellar,
	elevator,
	parking,
	furnished,
	pet_friendly,
	search_text,
	(vec IS NOT NULL) AS has_vector,
	updated_at
FROM listing_documents
WHERE listing_id = ANY($1) AND status = $2",
		)
		.bind(ids)
		.bind(VisibilityStatus::Published.as_str())
		.fetch_all(&self.db.pool)
		.await?;

		Ok(rows)
	}

	/// Popularity and boost lookups for the candidate set. Both are read-only
	/// enrichments; a failure in either leaves its signal at zero.
	async fn fetch_signals(&self, ids: &[Uuid]) -> HashMap<Uuid, RankSignals> {
		let now = OffsetDateTime::now_utc();
		let (popularity, boosts) = tokio::join!(
			queries::fetch_popularity_for(&self.db, ids),
			queries::fetch_active_boosts(&self.db, ids, now),
		);
		let mut signals: HashMap<Uuid, RankSignals> = HashMap::new();

		match popularity {
			Ok(rows) =>
				for row in rows {
					let entry = signals.entry(row.listing_id).or_default();

					entry.decayed_score = row.decayed_score;
					entry.recent_saves = row.saves_7d;
					entry.badge = Badge::parse(&row.badge).unwrap_or(Badge::None);
				},
			Err(err) => warn!(error = %err, "Popularity lookup failed; scoring without it."),
		}
		match boosts {
			Ok(rows) =>
				for row in rows {
					signals.entry(row.listing_id).or_default().boost_scalar =
						boost_scalar(&self.cfg.ranking, &row.level);
				},
			Err(err) => warn!(error = %err, "Boost lookup failed; scoring without it."),
		}

		signals
	}

	async fn saved_flags(
		&self,
		viewer_id: Option<Uuid>,
		page: &[(f32, DocumentRow)],
	) -> HashSet<Uuid> {
		let Some(viewer_id) = viewer_id else {
			return HashSet::new();
		};
		let ids: Vec<Uuid> = page.iter().map(|(_, doc)| doc.listing_id).collect();

		match queries::saved_listing_ids(&self.db, viewer_id, &ids).await {
			Ok(ids) => ids.into_iter().collect(),
			Err(err) => {
				warn!(error = %err, "Saved-listing lookup failed; flags omitted.");
				HashSet::new()
			},
		}
	}
}

fn page_response(
	items: Vec<SearchItem>,
	limit: u32,
	offset: u32,
	mode: RankingMode,
) -> SearchResponse {
	let has_more = items.len() == limit as usize;
	let next_offset = offset + items.len() as u32;

	SearchResponse { items, has_more, next_offset, mode }
}

fn point_uuid(point: &ScoredPoint) -> Option<Uuid> {
	match point.id.as_ref()?.point_id_options.as_ref()? {
		PointIdOptions::Uuid(value) => Uuid::parse_str(value).ok(),
		PointIdOptions::Num(_) => None,
	}
}

fn qdrant_filter(filters: &SearchFilters) -> Filter {
	let mut must =
		vec![Condition::matches("status", VisibilityStatus::Published.as_str().to_string())];

	if let Some(commune) = &filters.commune {
		must.push(Condition::matches("commune", commune.clone()));
	}
	if let Some(kind) = &filters.kind {
		must.push(Condition::matches("kind", kind.clone()));
	}
	if let Some(property_type) = &filters.property_type {
		must.push(Condition::matches("property_type", property_type.clone()));
	}
	if let Some(bedrooms_min) = filters.bedrooms_min {
		must.push(Condition::range(
			"bedrooms",
			Range { gte: Some(bedrooms_min as f64), ..Default::default() },
		));
	}
	if filters.min_price.is_some() || filters.max_price.is_some() {
		must.push(Condition::range(
			"price",
			Range { gte: filters.min_price, lte: filters.max_price, ..Default::default() },
		));
	}

	Filter::must(must)
}

fn push_filters(builder: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>, filters: &SearchFilters) {
	if let Some(commune) = &filters.commune {
		builder.push(" AND d.commune = ");
		builder.push_bind(commune.clone());
	}
	if let Some(kind) = &filters.kind {
		builder.push(" AND d.kind = ");
		builder.push_bind(kind.clone());
	}
	if let Some(property_type) = &filters.property_type {
		builder.push(" AND d.property_type = ");
		builder.push_bind(property_type.clone());
	}
	if let Some(bedrooms_min) = filters.bedrooms_min {
		builder.push(" AND d.bedrooms >= ");
		builder.push_bind(bedrooms_min);
	}
	if let Some(min_price) = filters.min_price {
		builder.push(" AND d.price >= ");
		builder.push_bind(min_price);
	}
	if let Some(max_price) = filters.max_price {
		builder.push(" AND d.price <= ");
		builder.push_bind(max_price);
	}
}

/// The mode actually delivered, from what each retrieval leg contributed. A
/// leg that errored counts as absent even when the query embedding existed.
fn ranked_mode(embedded: bool, text_failed: bool, dense_failed: bool) -> RankingMode {
	match (text_failed, embedded && !dense_failed) {
		(false, true) => RankingMode::Hybrid,
		(false, false) => RankingMode::TextOnly,
		(true, true) => RankingMode::VectorOnly,
		(true, false) => RankingMode::Fallback,
	}
}

/// Linear rank normalization: position 0 of N maps to 1.0, the last to 1/N.
fn rank_relevance(position: usize, total: usize) -> f32 {
	if total == 0 {
		return 0.0;
	}

	1.0 - position as f32 / total as f32
}

/// Cosine similarity from the vector index, converted through distance into
/// the planner's 1/(1+distance) similarity shape.
fn cosine_to_similarity(cosine: f32) -> f32 {
	let distance = (1.0 - cosine.clamp(-1.0, 1.0)).max(0.0);

	1.0 / (1.0 + distance)
}

fn boost_scalar(cfg: &Ranking, level: &str) -> f32 {
	match BoostLevel::parse(level) {
		Some(BoostLevel::Basic) => cfg.boost_scalars.basic,
		Some(BoostLevel::Premium) => cfg.boost_scalars.premium,
		Some(BoostLevel::Platinum) => cfg.boost_scalars.platinum,
		None => 0.0,
	}
}

/// Blended candidate score. The popularity and save terms saturate so very
/// popular items cannot dominate unboundedly; the boost term is a fixed lift
/// per tier.
pub(crate) fn hybrid_score(
	cfg: &Ranking,
	text_relevance: f32,
	semantic_similarity: Option<f32>,
	decayed_score: f32,
	recent_saves: i64,
	boost_scalar: f32,
) -> f32 {
	let text = cfg.text_weight * text_relevance;
	let semantic = cfg.vector_weight * semantic_similarity.unwrap_or(0.0);
	let pop = cfg.popularity_weight
		* (1.0 - (-decayed_score.max(0.0) / cfg.popularity_saturation).exp());
	let saves = cfg.saves_weight
		* (1.0 - (-(recent_saves.max(0) as f32) / cfg.saves_saturation).exp());
	let boost = cfg.boost_weight * boost_scalar;

	text + semantic + pop + saves + boost
}

fn like_pattern(query: &str) -> String {
	let escaped = query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");

	format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ranking() -> Ranking {
		Ranking::default()
	}

	#[test]
	fn rank_relevance_is_linear_and_bounded() {
		assert_eq!(rank_relevance(0, 10), 1.0);
		assert!((rank_relevance(9, 10) - 0.1).abs() < 1e-6);
		assert_eq!(rank_relevance(0, 0), 0.0);
	}

	#[test]
	fn cosine_similarity_maps_into_unit_interval() {
		assert!((cosine_to_similarity(1.0) - 1.0).abs() < 1e-6);
		assert!((cosine_to_similarity(0.0) - 0.5).abs() < 1e-6);
		assert!(cosine_to_similarity(-1.0) > 0.0);
		assert!(cosine_to_similarity(-1.0) < cosine_to_similarity(0.0));
	}

	#[test]
	fn popularity_term_saturates() {
		let cfg = ranking();
		let modest = hybrid_score(&cfg, 0.0, None, 10.0, 0, 0.0);
		let huge = hybrid_score(&cfg, 0.0, None, 100_000.0, 0, 0.0);

		assert!(modest < huge);
		assert!(huge <= cfg.popularity_weight + 1e-6);
	}

	#[test]
	fn boost_tiers_are_strictly_ordered() {
		let cfg = ranking();
		let basic = hybrid_score(&cfg, 0.5, None, 0.0, 0, cfg.boost_scalars.basic);
		let premium = hybrid_score(&cfg, 0.5, None, 0.0, 0, cfg.boost_scalars.premium);
		let platinum = hybrid_score(&cfg, 0.5, None, 0.0, 0, cfg.boost_scalars.platinum);

		assert!(basic < premium);
		assert!(premium < platinum);
	}

	#[test]
	fn missing_semantic_contributes_nothing() {
		let cfg = ranking();
		let without = hybrid_score(&cfg, 0.8, None, 5.0, 2, 0.0);
		let with = hybrid_score(&cfg, 0.8, Some(0.9), 5.0, 2, 0.0);

		assert!(with > without);
		assert!((with - without - cfg.vector_weight * 0.9).abs() < 1e-6);
	}

	#[test]
	fn ranked_mode_reports_failed_legs_as_absent() {
		assert_eq!(ranked_mode(true, false, false), RankingMode::Hybrid);
		assert_eq!(ranked_mode(false, false, false), RankingMode::TextOnly);
		assert_eq!(ranked_mode(true, false, true), RankingMode::TextOnly);
		assert_eq!(ranked_mode(true, true, false), RankingMode::VectorOnly);
		assert_eq!(ranked_mode(true, true, true), RankingMode::Fallback);
	}

	#[test]
	fn like_pattern_escapes_wildcards() {
		assert_eq!(like_pattern("50% off_deal"), "%50\\% off\\_deal%");
	}
}
