use quire_crypto::ContentHasher;
use quire_store::codec;
use quire_types::ObjectId;

use crate::error::{CarError, CarResult};
use crate::{varint, Header, CAR_VERSION};

/// A parsed bundle.
#[derive(Debug)]
pub struct CarReader {
    roots: Vec<ObjectId>,
    blocks: Vec<(ObjectId, Vec<u8>)>,
}

impl CarReader {
    /// Parse a complete bundle. Block contents are not checked; see [`verify`](Self::verify).
    pub fn from_bytes(data: &[u8]) -> CarResult<Self> {
        let mut pos = 0;
        let header_bytes = read_frame(data, &mut pos)?;
        let header: Header = codec::decode(header_bytes)?;
        if header.version != CAR_VERSION {
            return Err(CarError::UnsupportedVersion(header.version));
        }
        if header.roots.is_empty() {
            return Err(CarError::MissingRoot);
        }

        let mut blocks = Vec::new();
        while pos < data.len() {
            let start = pos;
            let frame = read_frame(data, &mut pos)?;
            if frame.len() < ObjectId::LEN {
                return Err(CarError::CorruptEntry {
                    offset: start,
                    reason: format!("block frame of {} bytes has no room for an id", frame.len()),
                });
            }
            let (id, body) = frame.split_at(ObjectId::LEN);
            let id = ObjectId::from_slice(id).map_err(|e| CarError::CorruptEntry {
                offset: start,
                reason: e.to_string(),
            })?;
            blocks.push((id, body.to_vec()));
        }

        Ok(Self {
            roots: header.roots,
            blocks,
        })
    }

    /// The first declared root.
    pub fn root(&self) -> ObjectId {
        self.roots[0]
    }

    pub fn roots(&self) -> &[ObjectId] {
        &self.roots
    }

    /// Blocks in bundle order.
    pub fn blocks(&self) -> &[(ObjectId, Vec<u8>)] {
        &self.blocks
    }

    /// Look up a block by id.
    pub fn get(&self, id: &ObjectId) -> Option<&[u8]> {
        self.blocks
            .iter()
            .find(|(block_id, _)| block_id == id)
            .map(|(_, data)| data.as_slice())
    }

    /// Check every block id against the hash of its bytes.
    pub fn verify(&self) -> CarResult<()> {
        for (id, data) in &self.blocks {
            if !ContentHasher::BLOCK.verify(data, id) {
                return Err(CarError::BlockHashMismatch { id: *id });
            }
        }
        Ok(())
    }
}

/// Read one length-prefixed frame starting at `*pos` and advance past it.
fn read_frame<'a>(data: &'a [u8], pos: &mut usize) -> CarResult<&'a [u8]> {
    let (len, consumed) = varint::decode(&data[*pos..], *pos)?;
    let start = *pos + consumed;
    let end = usize::try_from(len)
        .ok()
        .and_then(|len| start.checked_add(len))
        .filter(|end| *end <= data.len())
        .ok_or_else(|| CarError::CorruptEntry {
            offset: *pos,
            reason: format!("frame of {len} bytes runs past end of data"),
        })?;
    *pos = end;
    Ok(&data[start..end])
}
