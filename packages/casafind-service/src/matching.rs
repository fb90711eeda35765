use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use casafind_config::MatchingPoints;
use casafind_domain::{AmenityFlags, EmbeddingVector, RelaxationLevel, VisibilityStatus};
use casafind_storage::models::DocumentRow;

use crate::{CasafindService, ServiceError, ServiceResult, vector_to_pg, weights::match_weights};

#[derive(Debug, Clone, Deserialize)]
pub struct MatchRequest {
	pub lead_id: Uuid,
	pub agency_id: Uuid,
	pub profile: BuyerProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuyerProfile {
	pub kind: Option<String>,
	pub property_type: Option<String>,
	pub budget_min: Option<f64>,
	pub budget_max: Option<f64>,
	pub size_min: Option<f64>,
	pub bedrooms_min: Option<i32>,
	pub bathrooms_min: Option<i32>,
	pub communes: Vec<String>,
	pub amenities: AmenityFlags,
	pub summary: Option<String>,
	pub embedding: Option<Vec<f32>>,
}

/// "No candidates" is a legitimate terminal outcome of the cascade, distinct
/// from any error.
#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "outcome")]
pub enum MatchOutcome {
	Completed { report: MatchReport },
	NoCandidates,
}

#[derive(Debug, Serialize)]
pub struct MatchReport {
	pub lead_id: Uuid,
	pub relaxation: RelaxationLevel,
	pub pool_size: usize,
	pub structured_weight: f32,
	pub semantic_weight: f32,
	pub matches: Vec<LeadMatchItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadMatchItem {
	pub listing_id: Uuid,
	pub score: f32,
	pub structured_score: f32,
	pub semantic_score: f32,
	pub freshness_score: Option<f32>,
	pub matched: Vec<String>,
	pub missing: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct StructuredScore {
	pub(crate) normalized: f32,
	pub(crate) matched: Vec<String>,
	pub(crate) missing: Vec<String>,
}

impl CasafindService {
	/// Ranks the best-fit listings for one buyer profile inside one agency.
	/// Results fully replace any prior matches for the lead.
	pub async fn match_lead(&self, request: MatchRequest) -> ServiceResult<MatchOutcome> {
		if request.agency_id.is_nil() {
			return Err(ServiceError::ScopeDenied {
				message: "Lead matching requires an agency scope.".to_string(),
			});
		}
		if request.lead_id.is_nil() {
			return Err(ServiceError::InvalidRequest {
				message: "lead_id must be set.".to_string(),
			});
		}

		let profile = &request.profile;
		let buyer_vec = self.buyer_vector(profile).await;
		let mut pool = None;

		// Fixed, never-reordered relaxation cascade; agency scope and
		// visibility are hard at every level.
		for level in RelaxationLevel::ALL {
			let candidates = self.match_candidates(request.agency_id, profile, level).await?;

			if !candidates.is_empty() {
				pool = Some((level, candidates));
				break;
			}
		}

		let Some((relaxation, candidates)) = pool else {
			self.persist_matches(request.lead_id, &[], &json!({})).await?;
			info!(lead_id = %request.lead_id, "Match run found no candidates at any relaxation level.");
			return Ok(MatchOutcome::NoCandidates);
		};
		let ids: Vec<Uuid> = candidates.iter().map(|doc| doc.listing_id).collect();
		// Semantic scoring is an enrichment; a failure downgrades the blend to
		// structured-only rather than aborting the run.
		let semantic: HashMap<Uuid, f32> = match &buyer_vec {
			Some(vec) => match self.candidate_similarity(vec, &ids).await {
				Ok(similarities) => similarities,
				Err(err) => {
					warn!(error = %err, "Semantic scoring failed; blending structured only.");
					HashMap::new()
				},
			},
			None => HashMap::new(),
		};
		let semantic_available = !semantic.is_empty();
		let dimensions = profile_dimensions(profile);
		let (structured_weight, semantic_weight) = match_weights(
			&self.cfg.matching.weights,
			relaxation,
			dimensions,
			candidates.len(),
			semantic_available,
		);
		let now = OffsetDateTime::now_utc();
		let tau = self.cfg.matching.freshness_tau_days;
		let mut items: Vec<LeadMatchItem> = candidates
			.iter()
			.map(|doc| {
				let structured = structured_score(&self.cfg.matching.points, profile, doc);
				let semantic_score =
					semantic.get(&doc.listing_id).copied().unwrap_or(0.0) * 100.0;
				let score = structured.normalized * structured_weight
					+ semantic_score * semantic_weight;
				let age_days = ((now - doc.updated_at).as_seconds_f32() / 86_400.0).max(0.0);

				LeadMatchItem {
					listing_id: doc.listing_id,
					score,
					structured_score: structured.normalized,
					semantic_score,
					// Stored for explanation and downstream surfaces; not
					// blended into the score.
					freshness_score: Some((-age_days / tau).exp()),
					matched: structured.matched,
					missing: structured.missing,
				}
			})
			.collect();

		items.sort_by(|a, b| {
			b.score.total_cmp(&a.score).then_with(|| a.listing_id.cmp(&b.listing_id))
		});
		items.truncate(self.cfg.matching.top_k as usize);

		let run_context = json!({
			"relaxation": relaxation.as_str(),
			"structured_weight": structured_weight,
			"semantic_weight": semantic_weight,
			"pool_size": candidates.len(),
			"profile_dimensions": dimensions,
		});

		self.persist_matches(request.lead_id, &items, &run_context).await?;

		info!(
			lead_id = %request.lead_id,
			relaxation = relaxation.as_str(),
			pool_size = candidates.len(),
			matches = items.len(),
			"Match run finished."
		);

		Ok(MatchOutcome::Completed {
			report: MatchReport {
				lead_id: request.lead_id,
				relaxation,
				pool_size: candidates.len(),
				structured_weight,
				semantic_weight,
				matches: items,
			},
		})
	}

	/// The buyer vector, if any: a profile-supplied embedding that passes the
	/// validation gate, else a best-effort embedding of the free-text summary.
	async fn buyer_vector(&self, profile: &BuyerProfile) -> Option<EmbeddingVector> {
		if let Some(raw) = &profile.embedding {
			match EmbeddingVector::new(raw.clone(), self.cfg.storage.qdrant.vector_dim) {
				Ok(vec) => return Some(vec),
				Err(err) => {
					warn!(error = %err, "Profile embedding failed validation; treating as absent.");
				},
			}
		}

		let summary = profile.summary.as_deref().map(str::trim).filter(|s| !s.is_empty())?;

		self.try_embed(summary).await
	}

	async fn match_candidates(
		&self,
		agency_id: Uuid,
		profile: &BuyerProfile,
		level: RelaxationLevel,
	) -> ServiceResult<Vec<DocumentRow>> {
		let mut builder = QueryBuilder::new(
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
WHERE agency_id = ",
		);

		builder.push_bind(agency_id);
		builder.push(" AND status = ");
		builder.push_bind(VisibilityStatus::Published.as_str());

		// Budget bounds survive every relaxation level.
		if let Some(min) = profile.budget_min {
			builder.push(" AND price >= ");
			builder.push_bind(min);
		}
		if let Some(max) = profile.budget_max {
			builder.push(" AND price <= ");
			builder.push_bind(max);
		}

		if level != RelaxationLevel::BudgetOnly {
			if let Some(bedrooms_min) = profile.bedrooms_min {
				builder.push(" AND bedrooms >= ");
				builder.push_bind(bedrooms_min);
			}
			if let Some(bathrooms_min) = profile.bathrooms_min {
				builder.push(" AND bathrooms >= ");
				builder.push_bind(bathrooms_min);
			}
			if let Some(size_min) = profile.size_min {
				builder.push(" AND size_sqm >= ");
				builder.push_bind(size_min);
			}

			push_amenity_constraints(&mut builder, &profile.amenities);
		}
		if matches!(level, RelaxationLevel::Strict | RelaxationLevel::DropLocation) {
			if let Some(kind) = &profile.kind {
				builder.push(" AND kind = ");
				builder.push_bind(kind.clone());
			}
			if let Some(property_type) = &profile.property_type {
				builder.push(" AND property_type = ");
				builder.push_bind(property_type.clone());
			}
		}
		if level == RelaxationLevel::Strict && !profile.communes.is_empty() {
			// Commune names compare case-insensitively, same as the scorer.
			builder.push(" AND LOWER(commune) = ANY(");
			builder.push_bind(lowered_communes(&profile.communes));
			builder.push(")");
		}

		builder.push(" ORDER BY listing_id");

		let rows = builder.build_query_as().fetch_all(&self.db.pool).await?;

		Ok(rows)
	}

	async fn candidate_similarity(
		&self,
		vec: &EmbeddingVector,
		ids: &[Uuid],
	) -> ServiceResult<HashMap<Uuid, f32>> {
		let vec_text = vector_to_pg(vec.as_slice());
		let rows: Vec<(Uuid, f32)> = sqlx::query_as(
			"\
SELECT
	listing_id,
	GREATEST(LEAST((1 - (vec <=> $1::text::vector))::real, 1::real), 0::real) AS similarity
FROM listing_documents
WHERE listing_id = ANY($2) AND vec IS NOT NULL",
		)
		.bind(vec_text)
		.bind(ids)
		.fetch_all(&self.db.pool)
		.await?;

		Ok(rows.into_iter().collect())
	}

	async fn persist_matches(
		&self,
		lead_id: Uuid,
		items: &[LeadMatchItem],
		run_context: &serde_json::Value,
	) -> ServiceResult<()> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;

		sqlx::query("DELETE FROM lead_matches WHERE lead_id = $1")
			.bind(lead_id)
			.execute(&mut *tx)
			.await?;

		if !items.is_empty() {
			let mut builder = QueryBuilder::new(
				"\
INSERT INTO lead_matches (
	match_id,
	lead_id,
	listing_id,
	score,
	structured_score,
	semantic_score,
	freshness_score,
	reasons,
	created_at
) ",
			);

			builder.push_values(items, |mut b, item| {
				let mut reasons = run_context.clone();

				if let Some(map) = reasons.as_object_mut() {
					map.insert("matched".to_string(), json!(item.matched));
					map.insert("missing".to_string(), json!(item.missing));
				}

				b.push_bind(Uuid::new_v4())
					.push_bind(lead_id)
					.push_bind(item.listing_id)
					.push_bind(item.score)
					.push_bind(item.structured_score)
					.push_bind(item.semantic_score)
					.push_bind(item.freshness_score)
					.push_bind(reasons)
					.push_bind(now);
			});
			builder.build().execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}

fn push_amenity_constraints(
	builder: &mut QueryBuilder<'_, sqlx::Postgres>,
	amenities: &AmenityFlags,
) {
	if amenities.balcony {
		builder.push(" AND balcony");
	}
	if amenities.cellar {
		builder.push(" AND cellar");
	}
	if amenities.elevator {
		builder.push(" AND elevator");
	}
	if amenities.parking {
		builder.push(" AND parking");
	}
	if amenities.furnished {
		builder.push(" AND furnished");
	}
	if amenities.pet_friendly {
		builder.push(" AND pet_friendly");
	}
}

fn lowered_communes(communes: &[String]) -> Vec<String> {
	communes.iter().map(|commune| commune.to_lowercase()).collect()
}

/// Number of structured dimensions the profile actually specifies. Feeds the
/// richness input of the weight function.
pub(crate) fn profile_dimensions(profile: &BuyerProfile) -> u32 {
	let mut count = 0;

	if profile.kind.is_some() {
		count += 1;
	}
	if profile.property_type.is_some() {
		count += 1;
	}
	if profile.budget_min.is_some() || profile.budget_max.is_some() {
		count += 1;
	}
	if profile.size_min.is_some() {
		count += 1;
	}
	if profile.bedrooms_min.is_some() {
		count += 1;
	}
	if profile.bathrooms_min.is_some() {
		count += 1;
	}
	if !profile.communes.is_empty() {
		count += 1;
	}
	if profile.amenities.any() {
		count += 1;
	}

	count
}

/// Additive point system over the dimensions the profile specifies, rescaled
/// to 0-100 so it blends with the semantic score. Every checked dimension
/// lands in either `matched` or `missing`.
pub(crate) fn structured_score(
	points: &MatchingPoints,
	profile: &BuyerProfile,
	doc: &DocumentRow,
) -> StructuredScore {
	let mut earned = 0.0_f32;
	let mut possible = 0.0_f32;
	let mut matched = Vec::new();
	let mut missing = Vec::new();
	let mut check = |name: &str, weight: f32, hit: bool| {
		possible += weight;

		if hit {
			earned += weight;
			matched.push(name.to_string());
		} else {
			missing.push(name.to_string());
		}
	};

	if profile.budget_min.is_some() || profile.budget_max.is_some() {
		let within = profile.budget_min.is_none_or(|min| doc.price >= min)
			&& profile.budget_max.is_none_or(|max| doc.price <= max);

		check("budget", points.budget, within);
	}
	if let Some(bedrooms_min) = profile.bedrooms_min {
		check("bedrooms", points.bedrooms, doc.bedrooms >= bedrooms_min);
	}
	if let Some(bathrooms_min) = profile.bathrooms_min {
		check("bathrooms", points.bathrooms, doc.bathrooms >= bathrooms_min);
	}
	if let Some(size_min) = profile.size_min {
		check("size", points.size, doc.size_sqm >= size_min);
	}
	if !profile.communes.is_empty() {
		let doc_commune = doc.commune.to_lowercase();
		let within = profile.communes.iter().any(|commune| commune.to_lowercase() == doc_commune);

		check("commune", points.commune, within);
	}

	let amenity_checks: [(&str, bool, bool); 6] = [
		("amenity:balcony", profile.amenities.balcony, doc.balcony),
		("amenity:cellar", profile.amenities.cellar, doc.cellar),
		("amenity:elevator", profile.amenities.elevator, doc.elevator),
		("amenity:parking", profile.amenities.parking, doc.parking),
		("amenity:furnished", profile.amenities.furnished, doc.furnished),
		("amenity:pet_friendly", profile.amenities.pet_friendly, doc.pet_friendly),
	];

	for (name, requested, present) in amenity_checks {
		if requested {
			check(name, points.amenity, present);
		}
	}

	drop(check);

	let normalized = if possible > 0.0 { earned / possible * 100.0 } else { 0.0 };

	StructuredScore { normalized, matched, missing }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn doc(price: f64, bedrooms: i32, commune: &str, balcony: bool) -> DocumentRow {
		DocumentRow {
			listing_id: Uuid::from_u128(1),
			agency_id: Uuid::from_u128(2),
			status: "PUBLISHED".to_string(),
			commune: commune.to_string(),
			kind: "SALE".to_string(),
			property_type: "house".to_string(),
			price,
			bedrooms,
			bathrooms: 1,
			size_sqm: 120.0,
			balcony,
			cellar: false,
			elevator: false,
			parking: false,
			furnished: false,
			pet_friendly: false,
			search_text: String::new(),
			has_vector: false,
			updated_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	#[test]
	fn fully_satisfied_profile_scores_one_hundred() {
		let points = MatchingPoints::default();
		let profile = BuyerProfile {
			budget_max: Some(800_000.0),
			bedrooms_min: Some(2),
			communes: vec!["Mersch".to_string()],
			amenities: AmenityFlags { balcony: true, ..Default::default() },
			..Default::default()
		};
		let score = structured_score(&points, &profile, &doc(700_000.0, 3, "mersch", true));

		assert!((score.normalized - 100.0).abs() < 1e-4);
		assert_eq!(score.matched, vec!["budget", "bedrooms", "commune", "amenity:balcony"]);
		assert!(score.missing.is_empty());
	}

	#[test]
	fn missing_dimensions_are_named() {
		let points = MatchingPoints::default();
		let profile = BuyerProfile {
			budget_max: Some(500_000.0),
			bedrooms_min: Some(4),
			..Default::default()
		};
		let score = structured_score(&points, &profile, &doc(700_000.0, 3, "mersch", false));

		assert_eq!(score.normalized, 0.0);
		assert_eq!(score.missing, vec!["budget", "bedrooms"]);
	}

	#[test]
	fn unspecified_dimensions_do_not_dilute_the_score() {
		let points = MatchingPoints::default();
		let profile = BuyerProfile { bedrooms_min: Some(2), ..Default::default() };
		let score = structured_score(&points, &profile, &doc(700_000.0, 3, "mersch", false));

		assert!((score.normalized - 100.0).abs() < 1e-4);
	}

	#[test]
	fn empty_profile_scores_zero() {
		let points = MatchingPoints::default();
		let score =
			structured_score(&points, &BuyerProfile::default(), &doc(1.0, 0, "mersch", false));

		assert_eq!(score.normalized, 0.0);
		assert!(score.matched.is_empty());
		assert!(score.missing.is_empty());
	}

	#[test]
	fn commune_comparison_ignores_case_beyond_ascii() {
		let points = MatchingPoints::default();
		let profile =
			BuyerProfile { communes: vec!["KÄERJENG".to_string()], ..Default::default() };
		let score = structured_score(&points, &profile, &doc(1.0, 0, "Käerjeng", false));

		assert!((score.normalized - 100.0).abs() < 1e-4);
		assert_eq!(lowered_communes(&profile.communes), vec!["käerjeng"]);
	}

	#[test]
	fn profile_dimensions_counts_specified_inputs() {
		assert_eq!(profile_dimensions(&BuyerProfile::default()), 0);

		let profile = BuyerProfile {
			kind: Some("SALE".to_string()),
			budget_min: Some(100.0),
			budget_max: Some(200.0),
			communes: vec!["Esch".to_string()],
			amenities: AmenityFlags { parking: true, ..Default::default() },
			..Default::default()
		};

		// budget_min and budget_max are one dimension together.
		assert_eq!(profile_dimensions(&profile), 4);
	}
}
