//! Chunked LZ4 save container.
//!
//! A save file is an optional opaque header followed by a run of chunks:
//!
//! ```text
//! magic:             u32 = 0xFEEDA1E5
//! compressed_size:   u32
//! uncompressed_size: u32
//! reserved:          u32 = 0
//! payload:           [u8; compressed_size]   (LZ4 block)
//! ```
//!
//! The stream ends at EOF or at a terminal chunk with both sizes zero. The
//! concatenated payloads are UTF-8 JSON followed by NUL padding.
//!
//! Different writers disagree on block size, padding and whether the terminal
//! chunk is present, so [`BlockFormat`] is inferred from each file and reused
//! when the edited payload is written back.

use std::ops::Range;

use thiserror::Error;
use tracing::debug;

/// Little-endian magic word that starts every chunk
pub const CHUNK_MAGIC: u32 = 0xFEED_A1E5;

/// Size of a chunk header in bytes
pub const CHUNK_HEADER_LEN: usize = 16;

/// Upper bound for either size field; anything larger is corruption
pub const MAX_CHUNK_SIZE: u32 = 128 * 1024 * 1024;

/// Upper bound for the whole decompressed stream
pub const MAX_PAYLOAD_SIZE: u64 = 1024 * 1024 * 1024;

/// Most output bytes one byte of LZ4 block data can expand to
const MAX_EXPANSION_RATIO: u64 = 255;

/// Block size used when a file has no data chunks to infer one from
pub const DEFAULT_BLOCK_SIZE: u32 = 0x8_0000;

/// Errors that can occur while framing or unframing a container
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Container magic 0x{magic:08X} not found", magic = CHUNK_MAGIC)]
    MagicNotFound,

    #[error("Corrupt chunk at offset {offset}: {reason}")]
    CorruptChunk { offset: usize, reason: String },

    #[error("Failed to decompress chunk at offset {offset}: {reason}")]
    DecompressFailed { offset: usize, reason: String },

    #[error("Failed to compress block: {0}")]
    CompressFailed(String),

    #[error("Invalid block size {0}")]
    InvalidBlockSize(u32),
}

fn corrupt(offset: usize, reason: impl Into<String>) -> ContainerError {
    ContainerError::CorruptChunk {
        offset,
        reason: reason.into(),
    }
}

/// Fixed 16-byte header in front of every chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub magic: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub reserved: u32,
}

impl ChunkHeader {
    /// Header for a data chunk
    pub fn data(compressed_size: u32, uncompressed_size: u32) -> Self {
        ChunkHeader {
            magic: CHUNK_MAGIC,
            compressed_size,
            uncompressed_size,
            reserved: 0,
        }
    }

    /// Header for the end-of-stream sentinel
    pub fn terminal() -> Self {
        Self::data(0, 0)
    }

    /// Parse a header from at least 16 bytes
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < CHUNK_HEADER_LEN {
            return None;
        }
        let word = |i: usize| {
            u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
        };
        Some(ChunkHeader {
            magic: word(0),
            compressed_size: word(4),
            uncompressed_size: word(8),
            reserved: word(12),
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.compressed_size == 0 && self.uncompressed_size == 0
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&self.reserved.to_le_bytes());
    }
}

/// Shape of a container as produced by its original writer.
///
/// Inferred once per source file and reused when re-chunking an edited
/// payload so the output matches what that writer would have produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFormat {
    /// Uncompressed bytes per chunk
    pub block_size: u32,

    /// Whether the final block is zero-padded up to `block_size`
    pub pad_to_block: bool,

    /// Whether a terminal chunk follows the last data chunk
    pub has_terminal_chunk: bool,

    /// NUL bytes that follow the JSON text inside the decompressed stream
    pub trailing_nulls: u32,
}

impl Default for BlockFormat {
    fn default() -> Self {
        BlockFormat {
            block_size: DEFAULT_BLOCK_SIZE,
            pad_to_block: false,
            has_terminal_chunk: false,
            trailing_nulls: 1,
        }
    }
}

/// Result of unframing a container
#[derive(Debug, Clone)]
pub struct DecodedContainer {
    /// Opaque bytes in front of the first chunk
    pub header: Vec<u8>,

    /// Decompressed JSON text with trailing padding removed
    pub payload: Vec<u8>,

    /// Format parameters needed to write the payload back
    pub format: BlockFormat,

    /// Number of data chunks (terminal chunk excluded)
    pub chunk_count: usize,
}

struct ChunkSpan {
    header: ChunkHeader,
    offset: usize,
    payload: Range<usize>,
}

struct ChunkWalk {
    header_len: usize,
    chunks: Vec<ChunkSpan>,
    terminal: bool,
}

/// Offset of the first little-endian word equal to [`CHUNK_MAGIC`]
pub fn find_magic(bytes: &[u8]) -> Option<usize> {
    let magic = CHUNK_MAGIC.to_le_bytes();
    bytes.windows(4).position(|w| w == magic)
}

fn walk_chunks(bytes: &[u8]) -> Result<ChunkWalk, ContainerError> {
    let header_len = find_magic(bytes).ok_or(ContainerError::MagicNotFound)?;
    let mut chunks = Vec::new();
    let mut terminal = false;
    let mut offset = header_len;
    let mut total: u64 = 0;

    while offset < bytes.len() {
        let header = ChunkHeader::parse(&bytes[offset..]).ok_or_else(|| {
            corrupt(
                offset,
                format!("truncated chunk header ({} bytes)", bytes.len() - offset),
            )
        })?;

        if header.magic != CHUNK_MAGIC {
            return Err(corrupt(
                offset,
                format!("unexpected chunk magic 0x{:08X}", header.magic),
            ));
        }

        if header.is_terminal() {
            terminal = true;
            let rest = bytes.len() - offset - CHUNK_HEADER_LEN;
            if rest > 0 {
                debug!(offset, rest, "ignoring bytes after terminal chunk");
            }
            break;
        }

        if header.compressed_size == 0 || header.uncompressed_size == 0 {
            return Err(corrupt(
                offset,
                format!(
                    "inconsistent sizes (compressed {}, uncompressed {})",
                    header.compressed_size, header.uncompressed_size
                ),
            ));
        }

        if header.compressed_size > MAX_CHUNK_SIZE || header.uncompressed_size > MAX_CHUNK_SIZE {
            return Err(corrupt(
                offset,
                format!(
                    "chunk size exceeds limit (compressed {}, uncompressed {})",
                    header.compressed_size, header.uncompressed_size
                ),
            ));
        }

        let ratio_cap = u64::from(header.compressed_size) * MAX_EXPANSION_RATIO;
        if u64::from(header.uncompressed_size) > ratio_cap {
            return Err(corrupt(
                offset,
                format!(
                    "{} compressed bytes cannot expand to {}",
                    header.compressed_size, header.uncompressed_size
                ),
            ));
        }

        total += u64::from(header.uncompressed_size);
        if total > MAX_PAYLOAD_SIZE {
            return Err(corrupt(
                offset,
                format!("decompressed stream exceeds {} bytes", MAX_PAYLOAD_SIZE),
            ));
        }

        let payload_start = offset + CHUNK_HEADER_LEN;
        let available = bytes.len() - payload_start;
        let compressed = header.compressed_size as usize;
        if compressed > available {
            return Err(corrupt(
                offset,
                format!(
                    "compressed size {} exceeds remaining {} bytes",
                    compressed, available
                ),
            ));
        }

        chunks.push(ChunkSpan {
            header,
            offset,
            payload: payload_start..payload_start + compressed,
        });
        offset = payload_start + compressed;
    }

    Ok(ChunkWalk {
        header_len,
        chunks,
        terminal,
    })
}

fn format_from_walk(walk: &ChunkWalk, trailing_nulls: u32) -> BlockFormat {
    let has_terminal_chunk = walk.terminal;

    let (block_size, pad_to_block) = match walk.chunks.as_slice() {
        [] => (DEFAULT_BLOCK_SIZE, false),
        [first, ..] => {
            let block_size = first.header.uncompressed_size;
            let all_full = walk
                .chunks
                .iter()
                .all(|c| c.header.uncompressed_size == block_size);
            (block_size, all_full)
        }
    };

    BlockFormat {
        block_size,
        pad_to_block,
        has_terminal_chunk,
        trailing_nulls,
    }
}

/// Split decompressed bytes into JSON text and the NUL count after it.
///
/// The text ends at the last `}` or `]`; anything after that is padding.
fn split_padding(mut data: Vec<u8>) -> (Vec<u8>, u32) {
    let end = match data.iter().rposition(|&b| b == b'}' || b == b']') {
        Some(pos) => pos + 1,
        None => data.iter().rposition(|&b| b != 0).map_or(0, |pos| pos + 1),
    };

    let tail = &data[end..];
    let nulls = tail.iter().filter(|&&b| b == 0).count();
    if nulls != tail.len() {
        debug!(
            discarded = tail.len() - nulls,
            "dropping non-NUL bytes after JSON text"
        );
    }

    data.truncate(end);
    (data, u32::try_from(nulls).unwrap_or(u32::MAX))
}

/// Unframe a save container into its JSON payload
pub fn decode(bytes: &[u8]) -> Result<DecodedContainer, ContainerError> {
    let walk = walk_chunks(bytes)?;

    // Bounded by the expansion and total-size checks in walk_chunks
    let total: usize = walk
        .chunks
        .iter()
        .map(|c| c.header.uncompressed_size as usize)
        .sum();
    let mut output = Vec::with_capacity(total);

    for chunk in &walk.chunks {
        let expected = chunk.header.uncompressed_size as usize;
        let mut block = vec![0u8; expected];
        let written = lz4_flex::block::decompress_into(&bytes[chunk.payload.clone()], &mut block)
            .map_err(|e| ContainerError::DecompressFailed {
                offset: chunk.offset,
                reason: e.to_string(),
            })?;
        if written != expected {
            return Err(ContainerError::DecompressFailed {
                offset: chunk.offset,
                reason: format!("produced {} of {} bytes", written, expected),
            });
        }
        output.extend_from_slice(&block);
    }

    let (payload, trailing_nulls) = split_padding(output);
    let format = format_from_walk(&walk, trailing_nulls);

    debug!(
        header_len = walk.header_len,
        chunks = walk.chunks.len(),
        payload_len = payload.len(),
        ?format,
        "decoded save container"
    );

    Ok(DecodedContainer {
        header: bytes[..walk.header_len].to_vec(),
        payload,
        format,
        chunk_count: walk.chunks.len(),
    })
}

/// Infer the block format of an existing container
pub fn detect_format(bytes: &[u8]) -> Result<BlockFormat, ContainerError> {
    decode(bytes).map(|decoded| decoded.format)
}

/// Re-frame `payload` in the shape of `original`, keeping its header verbatim
pub fn encode(original: &[u8], payload: &[u8]) -> Result<Vec<u8>, ContainerError> {
    let decoded = decode(original)?;
    encode_with_format(&decoded.header, &decoded.format, payload)
}

/// Frame `payload` with explicit format parameters
pub fn encode_with_format(
    header: &[u8],
    format: &BlockFormat,
    payload: &[u8],
) -> Result<Vec<u8>, ContainerError> {
    if format.block_size == 0 || format.block_size > MAX_CHUNK_SIZE {
        return Err(ContainerError::InvalidBlockSize(format.block_size));
    }
    let block_size = format.block_size as usize;

    let mut data = Vec::with_capacity(payload.len() + format.trailing_nulls as usize);
    data.extend_from_slice(payload);
    data.resize(payload.len() + format.trailing_nulls as usize, 0);

    let mut out = Vec::with_capacity(header.len() + data.len() / 2 + CHUNK_HEADER_LEN);
    out.extend_from_slice(header);

    let mut chunk_count = 0usize;
    for block in data.chunks(block_size) {
        let padded;
        let raw: &[u8] = if format.pad_to_block && block.len() < block_size {
            let mut full = block.to_vec();
            full.resize(block_size, 0);
            padded = full;
            &padded
        } else {
            block
        };

        let compressed = lz4_flex::block::compress(raw);
        let compressed_size = u32::try_from(compressed.len())
            .ok()
            .filter(|&n| n <= MAX_CHUNK_SIZE)
            .ok_or_else(|| {
                ContainerError::CompressFailed(format!(
                    "compressed block of {} bytes exceeds chunk limit",
                    compressed.len()
                ))
            })?;

        // raw.len() <= block_size <= MAX_CHUNK_SIZE
        ChunkHeader::data(compressed_size, raw.len() as u32).write_to(&mut out);
        out.extend_from_slice(&compressed);
        chunk_count += 1;
    }

    if format.has_terminal_chunk {
        ChunkHeader::terminal().write_to(&mut out);
    }

    debug!(chunks = chunk_count, out_len = out.len(), "encoded save container");
    Ok(out)
}
