mod core;

pub use core::{
    ChatMessage, ChunkChoice, CompletionChunk, Delta, FragmentStream, OpenAiClient, SseDecoder,
    UpstreamEvent, fragments, parse_frame,
};
