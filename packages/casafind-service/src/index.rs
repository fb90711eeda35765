use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		Condition, DeletePointsBuilder, Document, Filter, PointStruct, UpsertPointsBuilder, Value,
		Vector,
	},
};
use serde_json::Value as JsonValue;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};
use uuid::Uuid;

use casafind_domain::{
	AmenityFlags, EmbeddingVector, ListingKind, SearchTextInput, VisibilityStatus,
	build_search_text,
};
use casafind_storage::{
	models::ListingRow,
	qdrant::{BM25_MODEL, BM25_VECTOR_NAME, DENSE_VECTOR_NAME},
	queries,
};

use crate::{CasafindService, ServiceError, ServiceResult, vector_to_pg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "outcome")]
pub enum IndexOutcome {
	Indexed { embedded: bool },
	ListingMissing,
	SkippedInvalid,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ReindexReport {
	pub scanned: u64,
	pub indexed: u64,
	pub embedded: u64,
	pub missing: u64,
	pub skipped: u64,
}

impl CasafindService {
	/// Rebuilds the searchable document for one listing: search text and
	/// denormalized filter fields in Postgres, plus the matching point in
	/// Qdrant. Idempotent; safe to re-run on an unchanged listing.
	pub async fn index_listing(&self, listing_id: Uuid) -> ServiceResult<IndexOutcome> {
		let Some(listing) = queries::fetch_listing(&self.db, listing_id).await? else {
			warn!(listing_id = %listing_id, "Listing vanished before indexing; skipping.");
			return Ok(IndexOutcome::ListingMissing);
		};
		let Some(status) = VisibilityStatus::parse(&listing.status) else {
			warn!(listing_id = %listing_id, status = %listing.status, "Listing has an unknown status; skipping.");
			return Ok(IndexOutcome::SkippedInvalid);
		};
		let Some(kind) = ListingKind::parse(&listing.kind) else {
			warn!(listing_id = %listing_id, kind = %listing.kind, "Listing has an unknown kind; skipping.");
			return Ok(IndexOutcome::SkippedInvalid);
		};

		let amenities = AmenityFlags {
			balcony: listing.balcony,
			cellar: listing.cellar,
			elevator: listing.elevator,
			parking: listing.parking,
			furnished: listing.furnished,
			pet_friendly: listing.pet_friendly,
		};
		let search_text = build_search_text(&SearchTextInput {
			title: &listing.title,
			description: &listing.description,
			commune: &listing.commune,
			kind,
			property_type: &listing.property_type,
			price: listing.price,
			bedrooms: listing.bedrooms,
			bathrooms: listing.bathrooms,
			size_sqm: listing.size_sqm,
			amenities,
		});

		// Non-published listings must never carry an embedding; this also skips
		// the provider call entirely for them.
		let embedding = if status.is_published() { self.try_embed(&search_text).await } else { None };
		// A failed embed attempt must not destroy a previously stored vector;
		// only the unpublish path clears it.
		let preserve_vector = status.is_published() && embedding.is_none();
		let stored_vec =
			self.upsert_document(&listing, &search_text, embedding.as_ref(), preserve_vector).await?;

		if status.is_published() {
			let dense = dense_point_vector(embedding.as_ref(), stored_vec.as_deref());

			self.upsert_qdrant_point(&listing, &search_text, dense.as_deref()).await?;
		} else {
			self.delete_qdrant_point(listing_id).await?;
		}

		Ok(IndexOutcome::Indexed { embedded: embedding.is_some() })
	}

	/// Full sweep over every listing. Per-listing outcomes are tallied rather
	/// than aborting the sweep; only infrastructure errors stop it.
	pub async fn reindex_all(&self) -> ServiceResult<ReindexReport> {
		let ids = queries::fetch_all_listing_ids(&self.db).await?;
		let mut report = ReindexReport::default();

		for listing_id in ids {
			report.scanned += 1;

			match self.index_listing(listing_id).await? {
				IndexOutcome::Indexed { embedded } => {
					report.indexed += 1;

					if embedded {
						report.embedded += 1;
					}
				},
				IndexOutcome::ListingMissing => report.missing += 1,
				IndexOutcome::SkippedInvalid => report.skipped += 1,
			}
		}

		info!(
			scanned = report.scanned,
			indexed = report.indexed,
			embedded = report.embedded,
			missing = report.missing,
			skipped = report.skipped,
			"Reindex sweep finished."
		);

		Ok(report)
	}

	/// Writes the document row and returns the vector column as text so the
	/// Qdrant point can be rebuilt from whatever the row now holds.
	async fn upsert_document(
		&self,
		listing: &ListingRow,
		search_text: &str,
		embedding: Option<&EmbeddingVector>,
		preserve_vector: bool,
	) -> ServiceResult<Option<String>> {
		let vec_text = embedding.map(|vec| vector_to_pg(vec.as_slice()));
		let sql = format!(
			"\
INSERT INTO listing_documents (
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
	vec,
	updated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18::text::vector,$19)
ON CONFLICT (listing_id) DO UPDATE
SET
	agency_id = EXCLUDED.agency_id,
	status = EXCLUDED.status,
	commune = EXCLUDED.commune,
	kind = EXCLUDED.kind,
	property_type = EXCLUDED.property_type,
	price = EXCLUDED.price,
	bedrooms = EXCLUDED.bedrooms,
	bathrooms = EXCLUDED.bathrooms,
	size_sqm = EXCLUDED.size_sqm,
	balcony = EXCLUDED.balcony,
	cellar = EXCLUDED.cellar,
	elevator = EXCLUDED.elevator,
	parking = EXCLUDED.parking,
	furnished = EXCLUDED.furnished,
	pet_friendly = EXCLUDED.pet_friendly,
	search_text = EXCLUDED.search_text,
	vec = {},
	updated_at = EXCLUDED.updated_at
RETURNING vec::text",
			document_vec_update(preserve_vector),
		);
		let stored_vec: Option<String> = sqlx::query_scalar(&sql)
			.bind(listing.listing_id)
			.bind(listing.agency_id)
			.bind(&listing.status)
			.bind(&listing.commune)
			.bind(&listing.kind)
			.bind(&listing.property_type)
			.bind(listing.price)
			.bind(listing.bedrooms)
			.bind(listing.bathrooms)
			.bind(listing.size_sqm)
			.bind(listing.balcony)
			.bind(listing.cellar)
			.bind(listing.elevator)
			.bind(listing.parking)
			.bind(listing.furnished)
			.bind(listing.pet_friendly)
			.bind(search_text)
			.bind(vec_text)
			.bind(listing.updated_at)
			.fetch_one(&self.db.pool)
			.await?;

		Ok(stored_vec)
	}

	async fn upsert_qdrant_point(
		&self,
		listing: &ListingRow,
		search_text: &str,
		dense: Option<&[f32]>,
	) -> ServiceResult<()> {
		let updated_at = listing.updated_at.format(&Rfc3339).map_err(|_| {
			ServiceError::Storage { message: "Failed to format listing timestamp.".to_string() }
		})?;
		let mut payload_map = HashMap::new();

		payload_map.insert("listing_id".to_string(), Value::from(listing.listing_id.to_string()));
		payload_map.insert("agency_id".to_string(), Value::from(listing.agency_id.to_string()));
		payload_map.insert("status".to_string(), Value::from(listing.status.clone()));
		payload_map.insert("commune".to_string(), Value::from(listing.commune.clone()));
		payload_map.insert("kind".to_string(), Value::from(listing.kind.clone()));
		payload_map.insert("property_type".to_string(), Value::from(listing.property_type.clone()));
		payload_map.insert("price".to_string(), Value::from(JsonValue::from(listing.price)));
		payload_map.insert("bedrooms".to_string(), Value::from(listing.bedrooms as i64));
		payload_map.insert("bathrooms".to_string(), Value::from(listing.bathrooms as i64));
		payload_map.insert("size_sqm".to_string(), Value::from(JsonValue::from(listing.size_sqm)));
		payload_map.insert("balcony".to_string(), Value::from(listing.balcony));
		payload_map.insert("cellar".to_string(), Value::from(listing.cellar));
		payload_map.insert("elevator".to_string(), Value::from(listing.elevator));
		payload_map.insert("parking".to_string(), Value::from(listing.parking));
		payload_map.insert("furnished".to_string(), Value::from(listing.furnished));
		payload_map.insert("pet_friendly".to_string(), Value::from(listing.pet_friendly));
		payload_map.insert("updated_at".to_string(), Value::from(JsonValue::String(updated_at)));

		let payload = Payload::from(payload_map);
		let mut vector_map = HashMap::new();

		vector_map.insert(
			BM25_VECTOR_NAME.to_string(),
			Vector::from(Document::new(search_text.to_string(), BM25_MODEL)),
		);

		if let Some(dense) = dense {
			vector_map.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(dense.to_vec()));
		}

		let point = PointStruct::new(listing.listing_id.to_string(), vector_map, payload);
		let upsert = UpsertPointsBuilder::new(self.qdrant.collection.clone(), vec![point]).wait(true);

		self.qdrant
			.client
			.upsert_points(upsert)
			.await
			.map_err(|err| ServiceError::Qdrant { message: err.to_string() })?;

		Ok(())
	}

	async fn delete_qdrant_point(&self, listing_id: Uuid) -> ServiceResult<()> {
		let filter = Filter::must([Condition::matches("listing_id", listing_id.to_string())]);
		let delete =
			DeletePointsBuilder::new(self.qdrant.collection.clone()).points(filter).wait(true);

		self.qdrant
			.client
			.delete_points(delete)
			.await
			.map_err(|err| ServiceError::Qdrant { message: err.to_string() })?;

		Ok(())
	}
}

/// Vector column expression for the upsert. When the embed attempt failed for
/// a published listing the previously stored vector must survive the write.
fn document_vec_update(preserve_vector: bool) -> &'static str {
	if preserve_vector { "COALESCE(EXCLUDED.vec, listing_documents.vec)" } else { "EXCLUDED.vec" }
}

/// Dense vector for the Qdrant point: a fresh embedding when the provider
/// delivered one, else whatever the document row still holds after the upsert.
fn dense_point_vector(
	embedding: Option<&EmbeddingVector>,
	stored_vec: Option<&str>,
) -> Option<Vec<f32>> {
	match embedding {
		Some(vec) => Some(vec.as_slice().to_vec()),
		None => stored_vec.and_then(crate::pg_to_vector),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vector_column_survives_a_failed_embed_attempt() {
		assert_eq!(document_vec_update(true), "COALESCE(EXCLUDED.vec, listing_documents.vec)");
		assert_eq!(document_vec_update(false), "EXCLUDED.vec");
	}

	#[test]
	fn failed_embed_rebuilds_the_point_from_the_stored_vector() {
		assert_eq!(dense_point_vector(None, Some("[0.5,-0.25]")), Some(vec![0.5, -0.25]));
	}

	#[test]
	fn fresh_embedding_wins_over_the_stored_vector() {
		let embedding = EmbeddingVector::new(vec![1.0, 2.0], 2).expect("Expected a valid vector.");

		assert_eq!(dense_point_vector(Some(&embedding), Some("[9,9]")), Some(vec![1.0, 2.0]));
	}

	#[test]
	fn missing_stored_vector_leaves_the_point_sparse_only() {
		assert_eq!(dense_point_vector(None, None), None);
		assert_eq!(dense_point_vector(None, Some("not a vector")), None);
	}
}
