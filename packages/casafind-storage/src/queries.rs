use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{BoostRow, ListingRow, PopularityRow},
};

pub async fn fetch_listing(db: &Db, listing_id: Uuid) -> Result<Option<ListingRow>> {
	let row = sqlx::query_as("SELECT * FROM listings WHERE listing_id = $1")
		.bind(listing_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(row)
}

pub async fn fetch_all_listing_ids(db: &Db) -> Result<Vec<Uuid>> {
	let ids = sqlx::query_scalar("SELECT listing_id FROM listings ORDER BY listing_id")
		.fetch_all(&db.pool)
		.await?;

	Ok(ids)
}

pub async fn fetch_popularity_for(db: &Db, listing_ids: &[Uuid]) -> Result<Vec<PopularityRow>> {
	if listing_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as("SELECT * FROM listing_popularity WHERE listing_id = ANY($1)")
		.bind(listing_ids)
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

pub async fn fetch_active_boosts(
	db: &Db,
	listing_ids: &[Uuid],
	now: OffsetDateTime,
) -> Result<Vec<BoostRow>> {
	if listing_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as(
		"\
SELECT listing_id, level, starts_at, ends_at
FROM promotion_boosts
WHERE listing_id = ANY($1) AND starts_at <= $2 AND ends_at >= $2",
	)
	.bind(listing_ids)
	.bind(now)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn saved_listing_ids(
	db: &Db,
	viewer_id: Uuid,
	listing_ids: &[Uuid],
) -> Result<Vec<Uuid>> {
	if listing_ids.is_empty() {
		return Ok(Vec::new());
	}

	let ids = sqlx::query_scalar(
		"SELECT listing_id FROM saved_listings WHERE viewer_id = $1 AND listing_id = ANY($2)",
	)
	.bind(viewer_id)
	.bind(listing_ids)
	.fetch_all(&db.pool)
	.await?;

	Ok(ids)
}

/// Drops popularity rows whose listing is no longer published. Runs ahead of
/// every recompute so ineligible listings lose badge and score even when the
/// scoring pass never visits them.
pub async fn delete_stale_popularity(db: &Db) -> Result<u64> {
	let result = sqlx::query(
		"\
DELETE FROM listing_popularity
WHERE listing_id NOT IN (SELECT listing_id FROM listings WHERE status = 'PUBLISHED')",
	)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}
