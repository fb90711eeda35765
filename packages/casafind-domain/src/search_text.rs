use std::{fmt::Write, sync::OnceLock};

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::types::ListingKind;

/// Cross-language anchors appended to `search_text` so that French, German,
/// Luxembourgish, and English queries all recall the same attributes, both
/// lexically and through the embedding.
const BALCONY_ANCHOR: &str = "balcony terrace balcon terrasse Balkon Terrasse";
const CELLAR_ANCHOR: &str = "cellar storage cave cellier Keller Abstellraum";
const ELEVATOR_ANCHOR: &str = "elevator lift ascenseur Aufzug";
const PARKING_ANCHOR: &str = "parking garage parkplatz Stellplatz emplacement";
const FURNISHED_ANCHOR: &str = "furnished meuble moebliert miwweleiert";
const PET_FRIENDLY_ANCHOR: &str = "pets allowed animaux acceptes Haustiere erlaubt Deieren";
const SALE_ANCHOR: &str = "for sale a vendre zu verkaufen ze verkafen";
const RENT_ANCHOR: &str = "for rent a louer zu vermieten ze lounen";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AmenityFlags {
	pub balcony: bool,
	pub cellar: bool,
	pub elevator: bool,
	pub parking: bool,
	pub furnished: bool,
	pub pet_friendly: bool,
}
impl AmenityFlags {
	pub fn any(&self) -> bool {
		self.balcony
			|| self.cellar
			|| self.elevator
			|| self.parking
			|| self.furnished
			|| self.pet_friendly
	}
}

#[derive(Debug, Clone)]
pub struct SearchTextInput<'a> {
	pub title: &'a str,
	pub description: &'a str,
	pub commune: &'a str,
	pub kind: ListingKind,
	pub property_type: &'a str,
	pub price: f64,
	pub bedrooms: i32,
	pub bathrooms: i32,
	pub size_sqm: f64,
	pub amenities: AmenityFlags,
}

/// Deterministic field-to-line rendering of a listing. Re-running over the
/// same input yields byte-identical output, which keeps the index upsert
/// idempotent.
pub fn build_search_text(input: &SearchTextInput<'_>) -> String {
	let mut out = String::new();

	push_line(&mut out, "Title", input.title);
	push_line(&mut out, "Description", input.description);
	push_line(&mut out, "Commune", input.commune);
	push_line(&mut out, "Type", input.property_type);

	let _ = writeln!(out, "Offer: {}", input.kind.as_str().to_lowercase());
	let _ = writeln!(out, "Price: {:.0}", input.price);
	let _ = writeln!(out, "Bedrooms: {}", input.bedrooms);
	let _ = writeln!(out, "Bathrooms: {}", input.bathrooms);
	let _ = writeln!(out, "Size: {:.0} m2", input.size_sqm);

	let mut anchors: Vec<&str> = Vec::new();

	anchors.push(match input.kind {
		ListingKind::Sale => SALE_ANCHOR,
		ListingKind::Rent => RENT_ANCHOR,
	});

	if input.amenities.balcony {
		anchors.push(BALCONY_ANCHOR);
	}
	if input.amenities.cellar {
		anchors.push(CELLAR_ANCHOR);
	}
	if input.amenities.elevator {
		anchors.push(ELEVATOR_ANCHOR);
	}
	if input.amenities.parking {
		anchors.push(PARKING_ANCHOR);
	}
	if input.amenities.furnished {
		anchors.push(FURNISHED_ANCHOR);
	}
	if input.amenities.pet_friendly {
		anchors.push(PET_FRIENDLY_ANCHOR);
	}

	let _ = writeln!(out, "Features: {}", anchors.join(" "));

	normalize_text(out.trim_end())
}

fn push_line(out: &mut String, label: &str, value: &str) {
	let normalized = normalize_text(value);

	if normalized.is_empty() {
		return;
	}

	let _ = writeln!(out, "{label}: {normalized}");
}

/// NFKC normalization plus whitespace collapsing.
pub fn normalize_text(value: &str) -> String {
	static WHITESPACE: OnceLock<Regex> = OnceLock::new();

	let collapsed = WHITESPACE
		.get_or_init(|| Regex::new(r"[ \t\r\f]+").expect("Whitespace pattern must compile."))
		.replace_all(value, " ");

	collapsed.trim().nfkc().collect()
}
