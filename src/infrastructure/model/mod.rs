//! Chat model access used by the AI layer.

mod base;
mod openai;
pub mod traits;
pub mod types;

pub use base::HttpClientBase;
pub use openai::OpenAIClient;
pub use traits::ModelProvider;
pub use types::{ModelError, ModelRequest, ModelResponse};
