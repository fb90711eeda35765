use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListingRow {
	pub listing_id: Uuid,
	pub agency_id: Uuid,
	pub title: String,
	pub description: String,
	pub commune: String,
	pub kind: String,
	pub property_type: String,
	pub price: f64,
	pub bedrooms: i32,
	pub bathrooms: i32,
	pub size_sqm: f64,
	pub balcony: bool,
	pub cellar: bool,
	pub elevator: bool,
	pub parking: bool,
	pub furnished: bool,
	pub pet_friendly: bool,
	pub status: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// `listing_documents` without the raw vector column. Vectors never leave
/// Postgres; distance math happens in SQL through `::text::vector` casts.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRow {
	pub listing_id: Uuid,
	pub agency_id: Uuid,
	pub status: String,
	pub commune: String,
	pub kind: String,
	pub property_type: String,
	pub price: f64,
	pub bedrooms: i32,
	pub bathrooms: i32,
	pub size_sqm: f64,
	pub balcony: bool,
	pub cellar: bool,
	pub elevator: bool,
	pub parking: bool,
	pub furnished: bool,
	pub pet_friendly: bool,
	pub search_text: String,
	pub has_vector: bool,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PopularityRow {
	pub listing_id: Uuid,
	pub saves_7d: i64,
	pub views_7d: i64,
	pub decayed_score: f32,
	pub badge: String,
	pub segment_key: String,
	pub computed_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BoostRow {
	pub listing_id: Uuid,
	pub level: String,
	pub starts_at: OffsetDateTime,
	pub ends_at: OffsetDateTime,
}
