//! Profile service core: payload codec, cache keys, message and table schemas.

pub mod cache_key;
pub mod codec;
pub mod messages;
pub mod schema;
pub mod types;

pub use cache_key::CacheKey;
pub use codec::{decode_payload, encode_payload, Codec, CodecError, JsonCodec, MsgPackCodec, Payload};
pub use messages::{AccountEvent, EventType};
pub use schema::{ColumnDef, TableSchema};
pub use types::{CreateProfile, Friend, Post, Profile};
