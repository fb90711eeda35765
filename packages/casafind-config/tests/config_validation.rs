use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_value() -> Value {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.")
}

fn set_path(value: &mut Value, path: &[&str], new_value: Value) {
	let mut current = value;

	for key in &path[..path.len() - 1] {
		current = current
			.as_table_mut()
			.and_then(|table| table.get_mut(*key))
			.expect("Template config is missing a table.");
	}

	current
		.as_table_mut()
		.expect("Template config leaf must live in a table.")
		.insert(path[path.len() - 1].to_string(), new_value);
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("casafind_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_with(mutate: impl FnOnce(&mut Value)) -> casafind_config::Result<casafind_config::Config> {
	let mut value = sample_value();

	mutate(&mut value);

	let payload = toml::to_string(&value).expect("Failed to render template config.");
	let path = write_temp_config(payload);
	let result = casafind_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation_error(mutate: impl FnOnce(&mut Value), needle: &str) {
	let err = load_with(mutate).expect_err("Expected a validation error.");
	let message = err.to_string();

	assert!(message.contains(needle), "Unexpected error message: {message}");
}

#[test]
fn template_config_is_valid() {
	let cfg = load_with(|_| ()).expect("Template config must validate.");

	assert_eq!(cfg.storage.qdrant.vector_dim, 1_024);
	assert_eq!(cfg.popularity.small_segment_max, 8);
}

#[test]
fn hybrid_weights_must_sum_to_one() {
	expect_validation_error(
		|value| set_path(value, &["ranking", "text_weight"], Value::Float(0.6)),
		"must sum to 1.0",
	);
}

#[test]
fn boost_scalars_must_be_strictly_increasing() {
	expect_validation_error(
		|value| set_path(value, &["ranking", "boost_scalars", "premium"], Value::Float(0.4)),
		"strictly increasing",
	);
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	expect_validation_error(
		|value| set_path(value, &["providers", "embedding", "dimensions"], Value::Integer(512)),
		"must match storage.qdrant.vector_dim",
	);
}

#[test]
fn half_life_must_be_positive() {
	expect_validation_error(
		|value| set_path(value, &["popularity", "half_life_days"], Value::Float(0.0)),
		"popularity.half_life_days",
	);
}

#[test]
fn trending_percentile_must_be_in_range() {
	expect_validation_error(
		|value| set_path(value, &["popularity", "trending_percentile"], Value::Float(1.5)),
		"popularity.trending_percentile",
	);
}

#[test]
fn structured_weight_bounds_must_be_ordered() {
	expect_validation_error(
		|value| set_path(value, &["matching", "weights", "min_structured"], Value::Float(0.95)),
		"min_structured",
	);
}

#[test]
fn missing_tunable_sections_fall_back_to_defaults() {
	let mut value = sample_value();
	let root = value.as_table_mut().expect("Template config must be a table.");

	root.remove("ranking");
	root.remove("popularity");
	root.remove("matching");

	let payload = toml::to_string(&value).expect("Failed to render template config.");
	let path = write_temp_config(payload);
	let result = casafind_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Defaults must validate.");

	assert!((cfg.ranking.text_weight - 0.45).abs() < 1e-6);
	assert!((cfg.ranking.vector_weight - 0.55).abs() < 1e-6);
	assert!((cfg.popularity.half_life_days - 3.0).abs() < 1e-6);
	assert_eq!(cfg.matching.top_k, 20);
}

#[test]
fn api_base_trailing_slash_is_normalized() {
	let cfg = load_with(|value| {
		set_path(
			value,
			&["providers", "embedding", "api_base"],
			Value::String("https://api.openai.example/".to_string()),
		)
	})
	.expect("Config must validate.");

	assert_eq!(cfg.providers.embedding.api_base, "https://api.openai.example");
}
