use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use casafind_service::CasafindService;
use casafind_storage::{db::Db, qdrant::QdrantStore};

/// Runs one maintenance job and exits. Scheduling (cron, systemd timers) is
/// external; the jobs themselves are full idempotent recomputes, so an
/// overlapping or repeated run is harmless.
#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
	#[arg(value_enum)]
	pub job: Job,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Job {
	/// Recompute decayed popularity scores and badges for the whole catalog.
	Popularity,
	/// Rebuild every listing document, including embeddings and Qdrant points.
	Reindex,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = casafind_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;
	db.ensure_schema(config.storage.qdrant.vector_dim).await?;
	let qdrant = QdrantStore::new(&config.storage.qdrant)?;
	qdrant.ensure_collection().await?;
	let service = CasafindService::new(config, db, qdrant);

	match args.job {
		Job::Popularity => {
			let report = service.recompute_popularity().await?;
			println!("{}", serde_json::to_string_pretty(&report)?);
		},
		Job::Reindex => {
			let report = service.reindex_all().await?;
			println!("{}", serde_json::to_string_pretty(&report)?);
		},
	}

	Ok(())
}
