//! SSE Adapter - InkFlow 后端生成流客户端

mod sse_transport;
mod wire;

pub use sse_transport::{SseStreamTransport, SseTransportConfig};
pub use wire::{decode_event, decode_generated_chapter, GenerateChapterBody, GeneratedChapter};
