pub mod backend;
pub mod client;
pub mod openai;
pub mod stream;

pub use backend::{AssistantBackend, BackendError, CallMetadata, ThreadMessage};
pub use client::AssistantClient;
pub use openai::OpenAiAssistantBackend;
pub use stream::StreamEvent;
