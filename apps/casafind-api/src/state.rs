use std::sync::Arc;

use casafind_service::CasafindService;
use casafind_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<CasafindService>,
}
impl AppState {
	pub async fn new(config: casafind_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.storage.qdrant.vector_dim).await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		qdrant.ensure_collection().await?;

		let service = CasafindService::new(config, db, qdrant);

		Ok(Self { service: Arc::new(service) })
	}
}
