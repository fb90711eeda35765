pub const DENSE_VECTOR_NAME: &str = "dense";
pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";

use qdrant_client::qdrant::{
	CreateCollectionBuilder, Distance, Modifier, SparseVectorParamsBuilder,
	SparseVectorsConfigBuilder, VectorParamsBuilder, VectorsConfigBuilder,
};

use crate::Result;

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &casafind_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the listing-document collection if it does not exist yet: one
	/// optional dense vector per point plus a BM25 sparse vector over the
	/// search text.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(&self.collection).await? {
			return Ok(());
		}

		let mut vectors = VectorsConfigBuilder::default();

		vectors.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim as u64, Distance::Cosine),
		);

		let mut sparse_vectors = SparseVectorsConfigBuilder::default();

		sparse_vectors.add_named_vector_params(
			BM25_VECTOR_NAME,
			SparseVectorParamsBuilder::default().modifier(Modifier::Idf),
		);

		let create = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(vectors)
			.sparse_vectors_config(sparse_vectors);

		self.client.create_collection(create).await?;

		Ok(())
	}
}
