/// A fixed-dimension embedding that has passed validation. Vectors that fail
/// the gate never exist anywhere in the system; callers downgrade them to
/// "absent" instead.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
	values: Vec<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum VectorError {
	#[error("Embedding has dimension {actual}, expected {expected}.")]
	DimensionMismatch { expected: u32, actual: usize },
	#[error("Embedding contains a non-finite value at index {index}.")]
	NonFinite { index: usize },
}

impl EmbeddingVector {
	pub fn new(values: Vec<f32>, expected_dim: u32) -> Result<Self, VectorError> {
		if values.len() != expected_dim as usize {
			return Err(VectorError::DimensionMismatch {
				expected: expected_dim,
				actual: values.len(),
			});
		}

		for (index, value) in values.iter().enumerate() {
			if !value.is_finite() {
				return Err(VectorError::NonFinite { index });
			}
		}

		Ok(Self { values })
	}

	pub fn dim(&self) -> usize {
		self.values.len()
	}

	pub fn as_slice(&self) -> &[f32] {
		&self.values
	}

	pub fn into_values(self) -> Vec<f32> {
		self.values
	}
}
