mod chat_completion_chunk;
mod chat_completion_request;
mod chat_completion_response;
mod message;
mod usage;

pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, Delta};
pub use chat_completion_request::{ChatCompletionRequest, ToolChoice};
pub use chat_completion_response::{ChatCompletionResponse, Choice, ResponseMessage};
pub use message::{Message, MessageRole};
pub use usage::Usage;
