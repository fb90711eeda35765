use serde::{Deserialize, Serialize};

/// Publication state of a listing. Anything other than `Published` must never
/// reach the search surface or carry an embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisibilityStatus {
	Published,
	Draft,
	Unpublished,
}
impl VisibilityStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Published => "PUBLISHED",
			Self::Draft => "DRAFT",
			Self::Unpublished => "UNPUBLISHED",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"PUBLISHED" => Some(Self::Published),
			"DRAFT" => Some(Self::Draft),
			"UNPUBLISHED" => Some(Self::Unpublished),
			_ => None,
		}
	}

	pub fn is_published(self) -> bool {
		matches!(self, Self::Published)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Badge {
	#[default]
	None,
	Trending,
	MostSaved,
	MostViewed,
}
impl Badge {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::None => "NONE",
			Self::Trending => "TRENDING",
			Self::MostSaved => "MOST_SAVED",
			Self::MostViewed => "MOST_VIEWED",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"NONE" => Some(Self::None),
			"TRENDING" => Some(Self::Trending),
			"MOST_SAVED" => Some(Self::MostSaved),
			"MOST_VIEWED" => Some(Self::MostViewed),
			_ => None,
		}
	}
}

/// Paid promotion tiers, ordered from weakest to strongest lift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoostLevel {
	Basic,
	Premium,
	Platinum,
}
impl BoostLevel {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Basic => "BASIC",
			Self::Premium => "PREMIUM",
			Self::Platinum => "PLATINUM",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"BASIC" => Some(Self::Basic),
			"PREMIUM" => Some(Self::Premium),
			"PLATINUM" => Some(Self::Platinum),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingKind {
	Sale,
	Rent,
}
impl ListingKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Sale => "SALE",
			Self::Rent => "RENT",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"SALE" => Some(Self::Sale),
			"RENT" => Some(Self::Rent),
			_ => None,
		}
	}
}

/// Constraint-relaxation stages of the lead matcher, in the exact order they
/// are attempted. Agency scope and visibility are never relaxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelaxationLevel {
	Strict,
	DropLocation,
	DropCategory,
	BudgetOnly,
}
impl RelaxationLevel {
	pub const ALL: [Self; 4] = [Self::Strict, Self::DropLocation, Self::DropCategory, Self::BudgetOnly];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Strict => "STRICT",
			Self::DropLocation => "DROP_LOCATION",
			Self::DropCategory => "DROP_CATEGORY",
			Self::BudgetOnly => "BUDGET_ONLY",
		}
	}

	/// Zero-based depth of the relaxation cascade.
	pub fn depth(self) -> u32 {
		match self {
			Self::Strict => 0,
			Self::DropLocation => 1,
			Self::DropCategory => 2,
			Self::BudgetOnly => 3,
		}
	}
}

/// Fairness segment for popularity badging: listings only compete against the
/// same category in the same commune.
pub fn segment_key(kind: &str, property_type: &str, commune: &str) -> String {
	format!(
		"{}|{}|{}",
		kind.trim().to_lowercase(),
		property_type.trim().to_lowercase(),
		commune.trim().to_lowercase()
	)
}
