pub fn render_schema(vector_dim: u32) -> String {
	let init = include_str!("../../../sql/init.sql");
	let expanded = expand_includes(init);

	expanded.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_listings.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_listings.sql")),
				"tables/002_listing_documents.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_listing_documents.sql")),
				"tables/003_interaction_events.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_interaction_events.sql")),
				"tables/004_listing_popularity.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_listing_popularity.sql")),
				"tables/005_promotion_boosts.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_promotion_boosts.sql")),
				"tables/006_saved_listings.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_saved_listings.sql")),
				"tables/007_lead_matches.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_lead_matches.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_substitutes_vector_dim() {
		let sql = render_schema(1_024);

		assert!(sql.contains("VECTOR(1024)"));
		assert!(!sql.contains("<VECTOR_DIM>"));
		assert!(!sql.contains("\\ir "));
	}
}
