pub mod reader;
pub mod snapshot;
pub mod writer;

pub use reader::decode_entry;
pub use snapshot::*;
pub use writer::{encode_entry, now_millis, HEADER_SIZE, MAX_ENTRY_SIZE, RCSN_MAGIC, RCSN_VERSION};
