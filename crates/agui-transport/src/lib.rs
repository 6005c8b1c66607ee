//! Wire transport for AG-UI event streams.
//!
//! Two framings carry the same events: SSE text blocks (`data: <json>\n\n`)
//! and length-prefixed protobuf frames. Decoders accept arbitrarily split
//! byte chunks and yield events in arrival order.
//!
//! - [`sse`] — text framing, incremental UTF-8 aware decoder
//! - [`frame`] — binary framing, `FrameDecoder`
//! - [`proto`] — protobuf schema and `Event` conversion
//! - [`media_type`] — `Accept` negotiation
//! - [`encoder`] — server-side `EventEncoder`
//! - [`http`] — response stream to events, codec chosen by content type

pub mod encoder;
pub mod frame;
pub mod http;
pub mod media_type;
pub mod proto;
pub mod sse;

pub use encoder::EventEncoder;
pub use frame::{
    DEFAULT_MAX_FRAME_LEN, FrameDecoder, decode_proto_stream, decode_proto_stream_with,
    encode_frame, encode_protobuf,
};
pub use http::{HttpEvent, HttpEventStream, transform_http_event_stream};
pub use media_type::{
    AGUI_MEDIA_TYPE, SSE_MEDIA_TYPE, is_protobuf_content_type, preferred_media_types,
    prefers_protobuf,
};
pub use proto::{decode_event, encode_event};
pub use sse::{SseDecoder, decode_sse_stream, encode_sse, sse_json_stream};
