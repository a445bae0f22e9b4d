use quire_store::codec;
use quire_types::ObjectId;
use tracing::debug;

use crate::error::CarResult;
use crate::{varint, Header, CAR_VERSION};

/// Builds a bundle in memory.
///
/// Blocks are written in the order they are added; the writer does not
/// deduplicate.
#[derive(Debug)]
pub struct CarWriter {
    root: ObjectId,
    blocks: Vec<(ObjectId, Vec<u8>)>,
}

impl CarWriter {
    /// Start a bundle whose header names `root`.
    pub fn new(root: ObjectId) -> Self {
        Self {
            root,
            blocks: Vec::new(),
        }
    }

    /// Queue one block.
    pub fn write_block(&mut self, id: ObjectId, data: &[u8]) {
        self.blocks.push((id, data.to_vec()));
    }

    /// Number of blocks queued.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Serialize the header and every queued block.
    pub fn finish(self) -> CarResult<Vec<u8>> {
        let header = codec::encode(&Header {
            version: CAR_VERSION,
            roots: vec![self.root],
        })?;

        let body_len: usize = self.blocks.iter().map(|(_, data)| data.len() + 42).sum();
        let mut out = Vec::with_capacity(header.len() + 10 + body_len);
        varint::encode(&mut out, header.len() as u64);
        out.extend_from_slice(&header);

        for (id, data) in &self.blocks {
            varint::encode(&mut out, (ObjectId::LEN + data.len()) as u64);
            out.extend_from_slice(id.as_bytes());
            out.extend_from_slice(data);
        }

        debug!(root = %self.root.short_hex(), blocks = self.blocks.len(), bytes = out.len(), "bundle written");
        Ok(out)
    }
}
