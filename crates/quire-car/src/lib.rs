//! Proof bundle container for Quire.
//!
//! A bundle is a header naming its root block followed by a flat list of
//! `(id, bytes)` block frames. Each frame is length-prefixed, so a reader can
//! walk the bundle without understanding the blocks it carries.
//!
//! # Layout
//!
//! ```text
//! varint(len(header)) | header {version: 1, roots: [id]}
//! varint(32 + len(data)) | id | data      (repeated)
//! ```

pub mod error;
pub mod reader;
pub mod varint;
pub mod writer;

pub use error::{CarError, CarResult};
pub use reader::CarReader;
pub use writer::CarWriter;

/// Container format version written into every header.
pub const CAR_VERSION: u64 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
pub(crate) struct Header {
    pub version: u64,
    pub roots: Vec<quire_types::ObjectId>,
}
