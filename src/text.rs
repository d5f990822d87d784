//! Text context: encoding, delimiters and collation
//!
//! Built once at startup and shared by reference with every pipeline, so
//! no component reads encoding or locale settings from global state.

use std::sync::Arc;

/// Characters dropped from backend output before it reaches the buffer
pub const CONTROL_DELIMITERS: [u16; 2] = [0x000C, 0x0008];

/// Characters ignored when two streams are compared as text
pub const COMPARE_DELIMITERS: [u16; 12] = [
    0x0020, 0x000D, 0x000A, 0x0008, 0x000C, 0x0009, 0x000B, 0x00A0, 0x202F, 0x2007, 0x2009,
    0x2060,
];

/// Line terminators that end a line-oriented field
pub const LINE_TERMINATORS: [u16; 2] = [0x000D, 0x000A];

/// Encoding of the raw byte spans a backend pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// Big-endian UTF-16 (UCS-2 compatible)
    #[default]
    Utf16Be,
    Utf8,
}

impl TextEncoding {
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Utf8 => "utf-8",
        }
    }
}

/// How text-mode comparison treats case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collation {
    /// Unicode lowercase folding
    #[default]
    CaseInsensitive,
    Exact,
}

impl Collation {
    /// Compare two UTF-16 runs of equal length
    pub fn equal(self, a: &[u16], b: &[u16]) -> bool {
        match self {
            Collation::Exact => a == b,
            Collation::CaseInsensitive => {
                let left = char::decode_utf16(a.iter().copied())
                    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .flat_map(char::to_lowercase);
                let right = char::decode_utf16(b.iter().copied())
                    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .flat_map(char::to_lowercase);
                left.eq(right)
            }
        }
    }
}

/// Process-wide text settings
#[derive(Debug, Clone)]
pub struct TextContext {
    pub encoding: TextEncoding,
    pub collation: Collation,
    pub compare_delimiters: Vec<u16>,
}

impl Default for TextContext {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::default(),
            collation: Collation::default(),
            compare_delimiters: COMPARE_DELIMITERS.to_vec(),
        }
    }
}

impl TextContext {
    pub fn shared(self) -> Arc<TextContext> {
        Arc::new(self)
    }

    pub fn decoder(&self) -> ChunkDecoder {
        ChunkDecoder::new(self.encoding)
    }

    /// Copy of `units` without compare delimiters
    pub fn strip_delimiters(&self, units: &[u16]) -> Vec<u16> {
        units
            .iter()
            .copied()
            .filter(|u| !self.compare_delimiters.contains(u))
            .collect()
    }
}

/// Incremental decoder from raw chunks to UTF-16 units
///
/// A code unit or sequence split across two chunks is carried over and
/// completed by the next call.
#[derive(Debug)]
pub struct ChunkDecoder {
    encoding: TextEncoding,
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            pending: Vec::new(),
        }
    }

    /// Decode `bytes`, appending UTF-16 units to `out`
    pub fn decode(&mut self, bytes: &[u8], out: &mut Vec<u16>) {
        self.pending.extend_from_slice(bytes);
        match self.encoding {
            TextEncoding::Utf16Be => {
                let whole = self.pending.len() / 2 * 2;
                out.extend(
                    self.pending[..whole]
                        .chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]])),
                );
                self.pending.drain(..whole);
            }
            TextEncoding::Utf8 => {
                let mut consumed = 0;
                loop {
                    match std::str::from_utf8(&self.pending[consumed..]) {
                        Ok(valid) => {
                            out.extend(valid.encode_utf16());
                            consumed = self.pending.len();
                            break;
                        }
                        Err(e) => {
                            let good = consumed + e.valid_up_to();
                            // valid_up_to is always a char boundary
                            if let Ok(valid) = std::str::from_utf8(&self.pending[consumed..good]) {
                                out.extend(valid.encode_utf16());
                            }
                            match e.error_len() {
                                Some(bad) => {
                                    out.push(char::REPLACEMENT_CHARACTER as u16);
                                    consumed = good + bad;
                                }
                                None => {
                                    consumed = good;
                                    break;
                                }
                            }
                        }
                    }
                }
                self.pending.drain(..consumed);
            }
        }
    }
}

/// Lossy conversion of UTF-16 units for display
pub fn units_to_string(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}
