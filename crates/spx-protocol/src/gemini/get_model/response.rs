pub use super::types::Model as GetModelResponse;
