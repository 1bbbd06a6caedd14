pub use super::types::InputTokenCount as InputTokenCountResponse;
