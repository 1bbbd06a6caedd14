//! Wire-format translation between the protocols switchproxy fronts and the
//! protocols its providers actually speak, plus the stateful SSE translators
//! that keep a streamed response in order while its shape changes underfoot.

pub mod count_tokens;
pub mod generate_content;
pub mod get_model;
pub mod list_models;
pub mod middleware;
pub mod stream2nostream;

pub use middleware::*;
