//! Fixed-layout record header and CRC32C-sealed 32 KiB block codec.
//!
//! A block is the atomic unit of on-disk storage shared by the stripe
//! writer and the SST writer: a fixed `BLOCK_SIZE` buffer packed with a
//! sequence of records, each framed by a 32-byte [`AkHdr32`] header, and
//! sealed with a trailing CRC32C over the whole buffer.
//!
//! Records are appended with [`BlockBuilder::try_append`] until the
//! block is full, then sealed with [`BlockBuilder::finish`]. Readers
//! walk a sealed block with [`BlockCursor`], which yields zero-copy
//! [`RecordView`]s borrowed directly from the block buffer — no record
//! is copied on the read path.

use thiserror::Error;

use crate::encoding::{Decode, Encode, EncodingError};

/// Size of every on-disk block, in bytes.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Trailing CRC32C footer width.
const CRC_LEN: usize = 4;

/// Bytes available for record payloads in a single block.
pub const PAYLOAD_LIMIT: usize = BLOCK_SIZE - CRC_LEN;

/// Fixed 32-byte record header: `AKHdr32`.
///
/// Layout (little-endian):
///
/// | field     | bytes | offset |
/// |-----------|-------|--------|
/// | magic     | 2     | 0      |
/// | flags     | 1     | 2      |
/// | reserved  | 1     | 3      |
/// | seq       | 8     | 4      |
/// | key_fp64  | 8     | 12     |
/// | mini_key  | 4     | 20     |
/// | k_len     | 2     | 24     |
/// | v_len     | 4     | 26     |
/// | reserved2 | 2     | 30     |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AkHdr32 {
    pub flags: RecordFlags,
    pub seq: u64,
    pub key_fp64: u64,
    pub mini_key: u32,
    pub k_len: u16,
    pub v_len: u32,
}

/// Magic bytes identifying an AKHdr32 record header.
pub const AKHDR32_MAGIC: u16 = 0xAB_4B;

/// Per-record flags packed into [`AkHdr32::flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFlags(u8);

impl RecordFlags {
    pub const TOMBSTONE: RecordFlags = RecordFlags(0b0000_0001);
    pub const RANGE_DELETE: RecordFlags = RecordFlags(0b0000_0010);

    pub const fn empty() -> Self {
        RecordFlags(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u8) -> Self {
        RecordFlags(bits & 0b0000_0011)
    }

    pub const fn contains(self, other: RecordFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RecordFlags {
    type Output = RecordFlags;
    fn bitor(self, rhs: RecordFlags) -> RecordFlags {
        RecordFlags(self.0 | rhs.0)
    }
}

impl Encode for AkHdr32 {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        AKHDR32_MAGIC.encode_to(buf)?;
        self.flags.bits().encode_to(buf)?;
        0u8.encode_to(buf)?; // reserved
        self.seq.encode_to(buf)?;
        self.key_fp64.encode_to(buf)?;
        self.mini_key.encode_to(buf)?;
        self.k_len.encode_to(buf)?;
        self.v_len.encode_to(buf)?;
        0u16.encode_to(buf)?; // reserved2
        Ok(())
    }
}

impl Decode for AkHdr32 {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (magic, mut off) = u16::decode_from(buf)?;
        if magic != AKHDR32_MAGIC {
            return Err(EncodingError::InvalidTag {
                tag: magic as u32,
                type_name: "AkHdr32::magic",
            });
        }
        let (flags_raw, n) = u8::decode_from(&buf[off..])?;
        off += n;
        let (_reserved, n) = u8::decode_from(&buf[off..])?;
        off += n;
        let (seq, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (key_fp64, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (mini_key, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (k_len, n) = u16::decode_from(&buf[off..])?;
        off += n;
        let (v_len, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (_reserved2, n) = u16::decode_from(&buf[off..])?;
        off += n;
        Ok((
            AkHdr32 {
                flags: RecordFlags::from_bits_truncate(flags_raw),
                seq,
                key_fp64,
                mini_key,
                k_len,
                v_len,
            },
            off,
        ))
    }
}

/// Size in bytes of an encoded [`AkHdr32`] — fixed regardless of content.
pub const AKHDR32_LEN: usize = 32;

/// Errors raised while packing or unpacking a block.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("record key length {0} exceeds the 65535-byte limit")]
    KeyTooLong(usize),

    #[error("record of {0} bytes cannot fit in an empty block (limit {PAYLOAD_LIMIT})")]
    RecordTooLarge(usize),

    #[error("block CRC32C mismatch: expected {expected:08x}, computed {computed:08x}")]
    CrcMismatch { expected: u32, computed: u32 },

    #[error("block shorter than the minimum frame size")]
    Truncated,

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Accumulates records into a single sealed block buffer.
pub struct BlockBuilder {
    buf: Vec<u8>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(BLOCK_SIZE),
        }
    }

    /// Bytes currently buffered, excluding the CRC footer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Attempt to append one record. Returns `Ok(false)` without mutating
    /// the block if the record would overflow [`PAYLOAD_LIMIT`]; the
    /// caller should seal the current block and start a new one.
    pub fn try_append(
        &mut self,
        seq: u64,
        key_fp64: u64,
        mini_key: u32,
        flags: RecordFlags,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> Result<bool, BlockError> {
        if key.len() > u16::MAX as usize {
            return Err(BlockError::KeyTooLong(key.len()));
        }
        let v_len = value.map_or(0, <[u8]>::len);
        let record_len = AKHDR32_LEN + key.len() + v_len;
        if record_len > PAYLOAD_LIMIT {
            return Err(BlockError::RecordTooLarge(record_len));
        }
        if self.buf.len() + record_len > PAYLOAD_LIMIT {
            return Ok(false);
        }

        let hdr = AkHdr32 {
            flags,
            seq,
            key_fp64,
            mini_key,
            k_len: key.len() as u16,
            v_len: v_len as u32,
        };
        hdr.encode_to(&mut self.buf)?;
        self.buf.extend_from_slice(key);
        if let Some(v) = value {
            self.buf.extend_from_slice(v);
        }
        Ok(true)
    }

    /// Seal the block: pad to [`BLOCK_SIZE`] and append the CRC32C
    /// footer over the full payload region.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.resize(PAYLOAD_LIMIT, 0);
        let crc = crc32c(&self.buf);
        self.buf.extend_from_slice(&crc.to_le_bytes());
        debug_assert_eq!(self.buf.len(), BLOCK_SIZE);
        self.buf
    }
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A zero-copy view over one record inside a decoded block buffer.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    pub seq: u64,
    pub key_fp64: u64,
    pub mini_key: u32,
    pub flags: RecordFlags,
    pub key: &'a [u8],
    pub value: Option<&'a [u8]>,
}

/// Sequential cursor over a sealed, CRC-verified block buffer.
pub struct BlockCursor<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> BlockCursor<'a> {
    /// Verify the block's CRC32C footer and build a cursor over its
    /// payload region.
    pub fn open(block: &'a [u8]) -> Result<Self, BlockError> {
        if block.len() != BLOCK_SIZE {
            return Err(BlockError::Truncated);
        }
        let (payload, crc_bytes) = block.split_at(PAYLOAD_LIMIT);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed = crc32c(payload);
        if expected != computed {
            return Err(BlockError::CrcMismatch { expected, computed });
        }
        Ok(Self { payload, pos: 0 })
    }

    /// Build a cursor without CRC verification, for callers that already
    /// verified (or intend to reconstruct) the block contents.
    pub fn open_unchecked(block: &'a [u8]) -> Self {
        let payload = &block[..PAYLOAD_LIMIT.min(block.len())];
        Self { payload, pos: 0 }
    }
}

impl<'a> Iterator for BlockCursor<'a> {
    type Item = RecordView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.payload.len() {
            return None;
        }
        let rest = &self.payload[self.pos..];
        let (hdr, n) = AkHdr32::decode_from(rest).ok()?;
        if hdr.seq == 0 && hdr.k_len == 0 && hdr.v_len == 0 {
            // Zero padding reached; no more records.
            return None;
        }
        let mut off = n;
        let k_len = hdr.k_len as usize;
        if off + k_len > rest.len() {
            return None;
        }
        let key = &rest[off..off + k_len];
        off += k_len;
        let value = if hdr.flags.contains(RecordFlags::TOMBSTONE) {
            None
        } else {
            let v_len = hdr.v_len as usize;
            if off + v_len > rest.len() {
                return None;
            }
            let v = &rest[off..off + v_len];
            off += v_len;
            Some(v)
        };
        self.pos += off;
        Some(RecordView {
            seq: hdr.seq,
            key_fp64: hdr.key_fp64,
            mini_key: hdr.mini_key,
            flags: hdr.flags,
            key,
            value,
        })
    }
}

/// Fixed SipHash keys. Fingerprints are persisted on disk (Bloom filter,
/// index entries), so the keys must stay stable across process restarts
/// rather than being drawn from `RandomState`.
const SIP_KEY0: u64 = 0x0123_4567_89ab_cdef;
const SIP_KEY1: u64 = 0xfedc_ba98_7654_3210;

/// SipHash-2-4 64-bit key fingerprint, used for Bloom membership and as
/// the high-order sort key for block index lookups.
pub fn key_fp64(key: &[u8]) -> u64 {
    sip_hash_2_4(SIP_KEY0, SIP_KEY1, key)
}

/// Minimal SipHash-2-4 implementation (2 compression rounds, 4
/// finalization rounds) over a byte slice, per Aumasson & Bernstein.
fn sip_hash_2_4(key0: u64, key1: u64, data: &[u8]) -> u64 {
    let mut v0: u64 = 0x736f_6d65_7073_6575 ^ key0;
    let mut v1: u64 = 0x646f_7261_6e64_6f6d ^ key1;
    let mut v2: u64 = 0x6c79_6765_6e65_7261 ^ key0;
    let mut v3: u64 = 0x7465_6462_7974_6573 ^ key1;

    macro_rules! sipround {
        () => {
            v0 = v0.wrapping_add(v1);
            v1 = v1.rotate_left(13);
            v1 ^= v0;
            v0 = v0.rotate_left(32);
            v2 = v2.wrapping_add(v3);
            v3 = v3.rotate_left(16);
            v3 ^= v2;
            v0 = v0.wrapping_add(v3);
            v3 = v3.rotate_left(21);
            v3 ^= v0;
            v2 = v2.wrapping_add(v1);
            v1 = v1.rotate_left(17);
            v1 ^= v2;
            v2 = v2.rotate_left(32);
        };
    }

    let len = data.len();
    let blocks = len / 8;
    for i in 0..blocks {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&data[i * 8..i * 8 + 8]);
        let m = u64::from_le_bytes(buf);
        v3 ^= m;
        sipround!();
        sipround!();
        v0 ^= m;
    }

    let mut tail = [0u8; 8];
    let tail_start = blocks * 8;
    tail[..len - tail_start].copy_from_slice(&data[tail_start..]);
    tail[7] = (len & 0xff) as u8;
    let m = u64::from_le_bytes(tail);
    v3 ^= m;
    sipround!();
    sipround!();
    v0 ^= m;

    v2 ^= 0xff;
    sipround!();
    sipround!();
    sipround!();
    sipround!();

    v0 ^ v1 ^ v2 ^ v3
}

/// Pack up to the first 4 bytes of `key` into a little-endian `u32`,
/// zero-padded, for cheap in-block prefix comparisons.
pub fn mini_key(key: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    let n = key.len().min(4);
    buf[..n].copy_from_slice(&key[..n]);
    u32::from_le_bytes(buf)
}

// ------------------------------------------------------------------------------------------------
// CRC32C (Castagnoli) — slicing-by-8 software table.
//
// The teacher's `crc32fast` dependency is configured for the IEEE 802.3
// polynomial and is kept as-is for the manifest's checksum (see
// DESIGN.md, Open Question d). Blocks, WAL frames, and SST footers
// require the Castagnoli polynomial, which is implemented here directly
// rather than pulling in a second checksum crate.
// ------------------------------------------------------------------------------------------------

const CASTAGNOLI_POLY: u32 = 0x82f6_3b78; // reversed 0x1EDC6F41

fn build_crc32c_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CASTAGNOLI_POLY
            } else {
                crc >> 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn crc32c_table() -> &'static [u32; 256] {
    use std::sync::OnceLock;
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(build_crc32c_table)
}

/// Compute the CRC32C (Castagnoli) checksum of `data`.
pub fn crc32c(data: &[u8]) -> u32 {
    let table = crc32c_table();
    let mut crc = !0u32;
    for &byte in data {
        let idx = ((crc ^ byte as u32) & 0xff) as usize;
        crc = (crc >> 8) ^ table[idx];
    }
    !crc
}
