use std::collections::HashMap;

use sqlx::QueryBuilder;
use time::{Duration, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use casafind_config::Popularity;
use casafind_domain::{Badge, segment_key};

use crate::{CasafindService, ServiceResult};

const UPSERT_BATCH: usize = 500;

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PopularityReport {
	pub cleared: u64,
	pub scored: u64,
	pub trending: u64,
	pub most_saved: u64,
	pub most_viewed: u64,
	pub global_fallback: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ScoredListing {
	pub(crate) listing_id: Uuid,
	pub(crate) segment_key: String,
	pub(crate) saves: i64,
	pub(crate) views: i64,
	pub(crate) score: f32,
}

pub(crate) struct BadgeAssignments {
	pub(crate) badges: HashMap<Uuid, Badge>,
	pub(crate) trending: u64,
	pub(crate) most_saved: u64,
	pub(crate) most_viewed: u64,
	pub(crate) global_fallback: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct EngagementRow {
	listing_id: Uuid,
	kind: String,
	property_type: String,
	commune: String,
	created_at: OffsetDateTime,
	saves: i64,
	views: i64,
	decayed_saves: f64,
	decayed_views: f64,
}

impl CasafindService {
	/// Full recompute of the popularity side-table over every published
	/// listing. Idempotent; no state carries over between runs.
	pub async fn recompute_popularity(&self) -> ServiceResult<PopularityReport> {
		let cfg = &self.cfg.popularity;
		let now = OffsetDateTime::now_utc();
		let cleared = casafind_storage::queries::delete_stale_popularity(&self.db).await?;
		let lambda = (std::f64::consts::LN_2 / cfg.half_life_days as f64).max(0.0);
		let window_start = now - Duration::days(cfg.window_days);
		let rows: Vec<EngagementRow> = sqlx::query_as(
			"\
SELECT
	l.listing_id,
	l.kind,
	l.property_type,
	l.commune,
	l.created_at,
	COALESCE(COUNT(e.event_id) FILTER (WHERE e.event_type = 'SAVE'), 0) AS saves,
	COALESCE(COUNT(e.event_id) FILTER (WHERE e.event_type = 'VIEW'), 0) AS views,
	COALESCE(SUM(EXP(-$1 * EXTRACT(EPOCH FROM ($2 - e.occurred_at)) / 86400.0))
		FILTER (WHERE e.event_type = 'SAVE'), 0)::float8 AS decayed_saves,
	COALESCE(SUM(EXP(-$1 * EXTRACT(EPOCH FROM ($2 - e.occurred_at)) / 86400.0))
		FILTER (WHERE e.event_type = 'VIEW'), 0)::float8 AS decayed_views
FROM listings l
LEFT JOIN interaction_events e
	ON e.listing_id = l.listing_id AND e.occurred_at >= $3 AND e.occurred_at <= $2
WHERE l.status = 'PUBLISHED'
GROUP BY l.listing_id",
		)
		.bind(lambda)
		.bind(now)
		.bind(window_start)
		.fetch_all(&self.db.pool)
		.await?;

		let scored: Vec<ScoredListing> = rows
			.iter()
			.map(|row| {
				let age_days = ((now - row.created_at).as_seconds_f32() / 86_400.0).max(0.0);

				ScoredListing {
					listing_id: row.listing_id,
					segment_key: segment_key(&row.kind, &row.property_type, &row.commune),
					saves: row.saves,
					views: row.views,
					score: popularity_score(cfg, row.decayed_saves, row.decayed_views, age_days),
				}
			})
			.collect();
		let assignments = assign_badges(cfg, &scored);

		for chunk in scored.chunks(UPSERT_BATCH) {
			let mut builder = QueryBuilder::new(
				"\
INSERT INTO listing_popularity (
	listing_id,
	saves_7d,
	views_7d,
	decayed_score,
	badge,
	segment_key,
	computed_at
) ",
			);

			builder.push_values(chunk, |mut b, item| {
				let badge =
					assignments.badges.get(&item.listing_id).copied().unwrap_or(Badge::None);

				b.push_bind(item.listing_id)
					.push_bind(item.saves)
					.push_bind(item.views)
					.push_bind(item.score)
					.push_bind(badge.as_str())
					.push_bind(item.segment_key.as_str())
					.push_bind(now);
			});
			builder.push(
				"\
 ON CONFLICT (listing_id) DO UPDATE
SET
	saves_7d = EXCLUDED.saves_7d,
	views_7d = EXCLUDED.views_7d,
	decayed_score = EXCLUDED.decayed_score,
	badge = EXCLUDED.badge,
	segment_key = EXCLUDED.segment_key,
	computed_at = EXCLUDED.computed_at",
			);
			builder.build().execute(&self.db.pool).await?;
		}

		let report = PopularityReport {
			cleared,
			scored: scored.len() as u64,
			trending: assignments.trending,
			most_saved: assignments.most_saved,
			most_viewed: assignments.most_viewed,
			global_fallback: assignments.global_fallback,
		};

		info!(
			cleared = report.cleared,
			scored = report.scored,
			trending = report.trending,
			most_saved = report.most_saved,
			most_viewed = report.most_viewed,
			global_fallback = report.global_fallback,
			"Popularity recompute finished."
		);

		Ok(report)
	}
}

/// Weight of a single interaction event after exponential decay.
pub(crate) fn decay_weight(age_days: f32, half_life_days: f32) -> f32 {
	(-(std::f32::consts::LN_2 / half_life_days) * age_days).exp()
}

/// Engagement score: decayed save/view sums under their respective weights
/// plus a small head start for brand-new listings that fades linearly over
/// the aggregation window.
pub(crate) fn popularity_score(
	cfg: &Popularity,
	decayed_saves: f64,
	decayed_views: f64,
	age_days: f32,
) -> f32 {
	let recency = (cfg.window_days as f32 - age_days).max(0.0) * cfg.recency_bonus_per_day;

	decayed_saves as f32 * cfg.save_weight + decayed_views as f32 * cfg.view_weight + recency
}

/// Badge pass over the whole catalog. Segments compete internally; the global
/// fallback only runs when the per-segment pass produced zero TRENDING
/// listings catalog-wide. A listing holds at most one badge, with MOST_SAVED
/// taking precedence over MOST_VIEWED over TRENDING.
pub(crate) fn assign_badges(cfg: &Popularity, scored: &[ScoredListing]) -> BadgeAssignments {
	let mut segments: HashMap<&str, Vec<&ScoredListing>> = HashMap::new();

	for item in scored {
		segments.entry(item.segment_key.as_str()).or_default().push(item);
	}

	let mut badges = HashMap::new();
	let mut trending = 0_u64;
	let mut most_saved = 0_u64;
	let mut most_viewed = 0_u64;

	for members in segments.values_mut() {
		members.sort_by(|a, b| {
			b.score.total_cmp(&a.score).then_with(|| a.listing_id.cmp(&b.listing_id))
		});

		if let Some(top) = members
			.iter()
			.filter(|item| item.saves >= cfg.min_saves_for_badge)
			.max_by(|a, b| a.saves.cmp(&b.saves).then_with(|| b.listing_id.cmp(&a.listing_id)))
		{
			badges.insert(top.listing_id, Badge::MostSaved);
			most_saved += 1;
		}

		if let Some(top) = members
			.iter()
			.filter(|item| item.views >= cfg.min_views_for_badge)
			.max_by(|a, b| a.views.cmp(&b.views).then_with(|| b.listing_id.cmp(&a.listing_id)))
			&& !badges.contains_key(&top.listing_id)
		{
			badges.insert(top.listing_id, Badge::MostViewed);
			most_viewed += 1;
		}

		// Small segments award at most one TRENDING slot; larger ones badge
		// everyone at or above the top-percentile cutoff.
		let candidates: Vec<&ScoredListing> = if members.len() <= cfg.small_segment_max {
			members.first().copied().into_iter().collect()
		} else {
			let cutoff_index = ((members.len() as f32 * cfg.trending_percentile).ceil() as usize)
				.saturating_sub(1)
				.min(members.len() - 1);
			let cutoff = members[cutoff_index].score;

			members.iter().filter(|item| item.score >= cutoff).copied().collect()
		};

		for item in candidates {
			if item.score > 0.0
				&& meets_activity_floor(cfg, item)
				&& !badges.contains_key(&item.listing_id)
			{
				badges.insert(item.listing_id, Badge::Trending);
				trending += 1;
			}
		}
	}

	let global_fallback = trending == 0;

	if global_fallback {
		let mut catalog: Vec<&ScoredListing> = scored.iter().collect();

		catalog.sort_by(|a, b| {
			b.score.total_cmp(&a.score).then_with(|| a.listing_id.cmp(&b.listing_id))
		});

		for item in catalog {
			if trending as usize >= cfg.global_fallback_limit {
				break;
			}
			if item.score > 0.0
				&& meets_activity_floor(cfg, item)
				&& !badges.contains_key(&item.listing_id)
			{
				badges.insert(item.listing_id, Badge::Trending);
				trending += 1;
			}
		}
	}

	BadgeAssignments { badges, trending, most_saved, most_viewed, global_fallback }
}

fn meets_activity_floor(cfg: &Popularity, item: &ScoredListing) -> bool {
	item.saves >= cfg.min_saves_for_badge || item.views >= cfg.min_views_for_badge
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cfg() -> Popularity {
		Popularity::default()
	}

	fn listing(n: u128, segment: &str, saves: i64, views: i64, score: f32) -> ScoredListing {
		ScoredListing {
			listing_id: Uuid::from_u128(n),
			segment_key: segment.to_string(),
			saves,
			views,
			score,
		}
	}

	#[test]
	fn decay_weight_is_non_increasing_in_age() {
		let mut previous = f32::INFINITY;

		for age in 0..30 {
			let weight = decay_weight(age as f32, 3.0);

			assert!(weight <= previous);
			assert!(weight > 0.0);

			previous = weight;
		}
	}

	#[test]
	fn decay_weight_halves_at_half_life() {
		let weight = decay_weight(3.0, 3.0);

		assert!((weight - 0.5).abs() < 1e-6);
	}

	#[test]
	fn score_recency_bonus_fades_with_age() {
		let cfg = cfg();
		let fresh = popularity_score(&cfg, 0.0, 0.0, 0.0);
		let old = popularity_score(&cfg, 0.0, 0.0, 10.0);

		assert!(fresh > 0.0);
		assert_eq!(old, 0.0);
	}

	#[test]
	fn small_segment_awards_trending_to_single_top_scorer_only() {
		let cfg = cfg();
		let scored: Vec<ScoredListing> =
			(1..=5).map(|n| listing(n, "sale|house|mersch", 6, 70, n as f32 * 10.0)).collect();
		let assignments = assign_badges(&cfg, &scored);
		let trending: Vec<Uuid> = assignments
			.badges
			.iter()
			.filter(|(_, badge)| **badge == Badge::Trending)
			.map(|(id, _)| *id)
			.collect();

		assert_eq!(trending.len(), 1);
		// The top scorer holds MOST_SAVED/MOST_VIEWED ties too, so TRENDING
		// lands on the best unbadged performer, still exactly one.
		assert!(!assignments.global_fallback);
	}

	#[test]
	fn most_saved_requires_absolute_minimum() {
		let cfg = cfg();
		let scored = vec![
			listing(1, "rent|flat|esch", 2, 10, 40.0),
			listing(2, "rent|flat|esch", 1, 5, 20.0),
		];
		let assignments = assign_badges(&cfg, &scored);

		assert_eq!(assignments.most_saved, 0);
		assert!(!assignments.badges.values().any(|badge| *badge == Badge::MostSaved));
	}

	#[test]
	fn at_most_one_most_saved_per_segment() {
		let cfg = cfg();
		let scored = vec![
			listing(1, "sale|flat|luxembourg", 9, 10, 50.0),
			listing(2, "sale|flat|luxembourg", 8, 10, 45.0),
			listing(3, "sale|flat|luxembourg", 7, 10, 40.0),
		];
		let assignments = assign_badges(&cfg, &scored);
		let count =
			assignments.badges.values().filter(|badge| **badge == Badge::MostSaved).count();

		assert_eq!(count, 1);
		assert_eq!(assignments.badges.get(&Uuid::from_u128(1)), Some(&Badge::MostSaved));
	}

	#[test]
	fn global_fallback_fires_only_when_no_segment_trending() {
		let cfg = cfg();
		// Ten listings, one segment: the cutoff sits at the top scorer, which
		// already holds MOST_VIEWED, so the segment pass yields no TRENDING
		// and the catalog-wide fallback picks the next qualifying listing.
		let mut scored: Vec<ScoredListing> =
			(1..=8).map(|n| listing(n, "sale|house|differdange", 0, 0, n as f32)).collect();

		scored.push(listing(9, "sale|house|differdange", 0, 100, 9.0));
		scored.push(listing(10, "sale|house|differdange", 0, 70, 5.5));

		let assignments = assign_badges(&cfg, &scored);

		assert!(assignments.global_fallback);
		assert_eq!(assignments.badges.get(&Uuid::from_u128(9)), Some(&Badge::MostViewed));
		assert_eq!(assignments.badges.get(&Uuid::from_u128(10)), Some(&Badge::Trending));
		assert_eq!(assignments.trending, 1);
	}

	#[test]
	fn no_fallback_when_a_segment_already_has_trending() {
		let cfg = cfg();
		// MOST_SAVED goes to the heavier saver, leaving the top scorer free to
		// take the segment's TRENDING slot.
		let scored = vec![
			listing(1, "sale|house|wiltz", 6, 0, 90.0),
			listing(2, "sale|house|wiltz", 9, 0, 80.0),
			listing(3, "sale|house|wiltz", 0, 0, 70.0),
		];
		let assignments = assign_badges(&cfg, &scored);

		assert!(!assignments.global_fallback);
		assert_eq!(assignments.badges.get(&Uuid::from_u128(1)), Some(&Badge::Trending));
		assert_eq!(assignments.badges.get(&Uuid::from_u128(2)), Some(&Badge::MostSaved));
	}
}
