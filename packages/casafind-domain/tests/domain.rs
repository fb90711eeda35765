use casafind_domain::{
	AmenityFlags, Badge, BoostLevel, EmbeddingVector, ListingKind, RelaxationLevel,
	SearchTextInput, VisibilityStatus, build_search_text, segment_key,
};

fn sample_input(amenities: AmenityFlags) -> SearchTextInput<'static> {
	SearchTextInput {
		title: "Bright   apartment near the park",
		description: "Two bedrooms,\tquiet street.",
		commune: "Luxembourg",
		kind: ListingKind::Rent,
		property_type: "apartment",
		price: 1_850.0,
		bedrooms: 2,
		bathrooms: 1,
		size_sqm: 82.4,
		amenities,
	}
}

#[test]
fn status_round_trips_through_strings() {
	for status in [VisibilityStatus::Published, VisibilityStatus::Draft, VisibilityStatus::Unpublished] {
		assert_eq!(VisibilityStatus::parse(status.as_str()), Some(status));
	}

	assert_eq!(VisibilityStatus::parse("published"), None);
}

#[test]
fn badge_round_trips_through_strings() {
	for badge in [Badge::None, Badge::Trending, Badge::MostSaved, Badge::MostViewed] {
		assert_eq!(Badge::parse(badge.as_str()), Some(badge));
	}
}

#[test]
fn boost_levels_order_by_strength() {
	assert!(BoostLevel::Basic < BoostLevel::Premium);
	assert!(BoostLevel::Premium < BoostLevel::Platinum);
}

#[test]
fn relaxation_levels_are_ordered_and_complete() {
	let depths: Vec<u32> = RelaxationLevel::ALL.iter().map(|level| level.depth()).collect();

	assert_eq!(depths, vec![0, 1, 2, 3]);
	assert_eq!(RelaxationLevel::ALL[0], RelaxationLevel::Strict);
	assert_eq!(RelaxationLevel::ALL[3], RelaxationLevel::BudgetOnly);
}

#[test]
fn segment_key_is_case_insensitive() {
	assert_eq!(segment_key("SALE", "Apartment", "Esch-sur-Alzette"), "sale|apartment|esch-sur-alzette");
	assert_eq!(
		segment_key("sale", "apartment", "esch-sur-alzette"),
		segment_key(" SALE ", " APARTMENT ", " Esch-sur-Alzette ")
	);
}

#[test]
fn vector_constructor_rejects_wrong_dimension() {
	let err = EmbeddingVector::new(vec![0.1, 0.2], 3).expect_err("Expected dimension error.");

	assert!(err.to_string().contains("dimension 2"));
}

#[test]
fn vector_constructor_rejects_non_finite_values() {
	let err =
		EmbeddingVector::new(vec![0.1, f32::NAN, 0.3], 3).expect_err("Expected non-finite error.");

	assert!(err.to_string().contains("index 1"));
	assert!(EmbeddingVector::new(vec![0.1, f32::INFINITY, 0.3], 3).is_err());
}

#[test]
fn vector_constructor_accepts_valid_input() {
	let vector = EmbeddingVector::new(vec![0.1, 0.2, 0.3], 3).expect("Expected a valid vector.");

	assert_eq!(vector.dim(), 3);
	assert_eq!(vector.as_slice(), &[0.1, 0.2, 0.3]);
}

#[test]
fn search_text_is_deterministic() {
	let input = sample_input(AmenityFlags { balcony: true, ..AmenityFlags::default() });

	assert_eq!(build_search_text(&input), build_search_text(&input));
}

#[test]
fn search_text_collapses_whitespace() {
	let text = build_search_text(&sample_input(AmenityFlags::default()));

	assert!(text.contains("Title: Bright apartment near the park"));
	assert!(text.contains("Description: Two bedrooms, quiet street."));
}

#[test]
fn search_text_includes_multilingual_anchors_for_present_amenities() {
	let text = build_search_text(&sample_input(AmenityFlags {
		balcony: true,
		elevator: true,
		..AmenityFlags::default()
	}));

	assert!(text.contains("balcon"));
	assert!(text.contains("Balkon"));
	assert!(text.contains("ascenseur"));
	assert!(text.contains("ze lounen"));
	assert!(!text.contains("Keller"));
}

#[test]
fn search_text_anchors_track_the_offer_kind() {
	let mut input = sample_input(AmenityFlags::default());

	input.kind = ListingKind::Sale;

	let text = build_search_text(&input);

	assert!(text.contains("a vendre"));
	assert!(!text.contains("a louer"));
}
