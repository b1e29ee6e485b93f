//! Tag codebook: an immutable table of codes and their rotations.
//!
//! A code is an `n x n` bit grid packed row-major into a `u64`, first
//! cell in the most significant used bit. A set bit is a light cell.
//! Codebooks are plain data, usually loaded from JSON:
//!
//! ```json
//! { "name": "demo16h5", "bits": 16, "min_hamming": 5, "codes": [7, 57] }
//! ```

use serde::{Deserialize, Serialize};

use crate::types::DetectorError;

/// Largest supported grid: 8 x 8 bits in a `u64`.
const MAX_BITS: u32 = 64;

/// On-disk form of a codebook, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CodebookFile {
    name: String,
    bits: u32,
    min_hamming: u32,
    codes: Vec<u64>,
}

/// The codebook entry nearest to an observed pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeMatch {
    /// Index into [`TagCodebook::codes`].
    pub id: usize,
    /// Bit errors between the (rotated) observation and the code.
    pub hamming: u32,
    /// Clockwise quarter turns applied to the observation to match.
    pub rotation: u8,
}

/// Immutable code table with all four rotations precomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CodebookFile", into = "CodebookFile")]
pub struct TagCodebook {
    name: String,
    bits: u32,
    grid_size: u32,
    min_hamming: u32,
    codes: Vec<u64>,
    /// `rotations[id][r]` is `codes[id]` turned `r` quarter turns clockwise.
    rotations: Vec<[u64; 4]>,
}

impl TagCodebook {
    /// Build and validate a codebook.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::InvalidCodebook`] if `bits` is not a
    /// perfect square in `1..=64`, the code list is empty, or a code has
    /// bits set outside the grid.
    pub fn new(
        name: impl Into<String>,
        bits: u32,
        min_hamming: u32,
        codes: Vec<u64>,
    ) -> Result<Self, DetectorError> {
        if bits == 0 || bits > MAX_BITS {
            return Err(DetectorError::InvalidCodebook(format!(
                "bit count must be in 1..={MAX_BITS}, got {bits}"
            )));
        }
        let grid_size = bits.isqrt();
        if grid_size * grid_size != bits {
            return Err(DetectorError::InvalidCodebook(format!(
                "bit count {bits} is not a square grid"
            )));
        }
        if codes.is_empty() {
            return Err(DetectorError::InvalidCodebook("no codes".to_string()));
        }
        let mask = code_mask(bits);
        if let Some((id, code)) = codes.iter().enumerate().find(|&(_, &c)| c & !mask != 0) {
            return Err(DetectorError::InvalidCodebook(format!(
                "code {id} ({code:#x}) does not fit in {bits} bits"
            )));
        }

        let rotations = codes
            .iter()
            .map(|&c| {
                let r1 = rotate90(c, grid_size);
                let r2 = rotate90(r1, grid_size);
                [c, r1, r2, rotate90(r2, grid_size)]
            })
            .collect();

        Ok(Self {
            name: name.into(),
            bits,
            grid_size,
            min_hamming,
            codes,
            rotations,
        })
    }

    /// Parse and validate a JSON codebook.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::InvalidCodebook`] for malformed JSON or a
    /// table that fails [`new`](Self::new).
    pub fn from_json(json: &str) -> Result<Self, DetectorError> {
        serde_json::from_str(json).map_err(|e| DetectorError::InvalidCodebook(e.to_string()))
    }

    /// Family name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total payload bits.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Payload grid side length (`sqrt(bits)`).
    #[must_use]
    pub const fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Declared minimum Hamming distance between codes, rotations
    /// included.
    #[must_use]
    pub const fn min_hamming(&self) -> u32 {
        self.min_hamming
    }

    /// Bit errors that can be corrected without ambiguity.
    #[must_use]
    pub const fn correctable_bits(&self) -> u32 {
        self.min_hamming.saturating_sub(1) / 2
    }

    /// The codes, indexed by tag id.
    #[must_use]
    pub fn codes(&self) -> &[u64] {
        &self.codes
    }

    /// Number of codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Always `false`: construction rejects empty tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// `codes[id]` turned `rotation` quarter turns clockwise.
    #[must_use]
    pub fn rotated_code(&self, id: usize, rotation: u8) -> Option<u64> {
        self.rotations
            .get(id)
            .map(|r| r[usize::from(rotation % 4)])
    }

    /// Nearest code to `pattern` in a single orientation, ties to the
    /// lower id.
    #[must_use]
    pub fn nearest(&self, pattern: u64) -> (usize, u32) {
        self.codes
            .iter()
            .enumerate()
            .map(|(id, &c)| (id, (c ^ pattern).count_ones()))
            .min_by_key(|&(id, d)| (d, id))
            .unwrap_or((0, self.bits))
    }

    /// Match `observed` against every code under all four rotations.
    ///
    /// Ties prefer fewer errors, then fewer quarter turns, then the lower
    /// id. Returns `None` if the best match exceeds `max_hamming`.
    #[must_use]
    pub fn decode(&self, observed: u64, max_hamming: u32) -> Option<CodeMatch> {
        let mut best: Option<CodeMatch> = None;
        for (id, rotated) in self.rotations.iter().enumerate() {
            for (turns, &code) in rotated.iter().enumerate() {
                // `observed` is `code` turned `turns` times; turning it
                // back needs the complementary count.
                #[allow(clippy::cast_possible_truncation)]
                let rotation = ((4 - turns) % 4) as u8;
                let candidate = CodeMatch {
                    id,
                    hamming: (code ^ observed).count_ones(),
                    rotation,
                };
                let better = best.is_none_or(|b| {
                    (candidate.hamming, candidate.rotation, candidate.id)
                        < (b.hamming, b.rotation, b.id)
                });
                if better {
                    best = Some(candidate);
                }
            }
        }
        best.filter(|b| b.hamming <= max_hamming)
    }

    /// Smallest Hamming distance between any two codes under rotation,
    /// and between each code and its own non-trivial rotations.
    #[must_use]
    pub fn measured_min_hamming(&self) -> u32 {
        let mut min = self.bits;
        for (i, ri) in self.rotations.iter().enumerate() {
            for &r in &ri[1..] {
                min = min.min((ri[0] ^ r).count_ones());
            }
            for rj in &self.rotations[i + 1..] {
                for &r in rj {
                    min = min.min((ri[0] ^ r).count_ones());
                }
            }
        }
        min
    }
}

impl TryFrom<CodebookFile> for TagCodebook {
    type Error = DetectorError;

    fn try_from(file: CodebookFile) -> Result<Self, Self::Error> {
        Self::new(file.name, file.bits, file.min_hamming, file.codes)
    }
}

impl From<TagCodebook> for CodebookFile {
    fn from(book: TagCodebook) -> Self {
        Self {
            name: book.name,
            bits: book.bits,
            min_hamming: book.min_hamming,
            codes: book.codes,
        }
    }
}

fn code_mask(bits: u32) -> u64 {
    if bits >= MAX_BITS {
        u64::MAX
    } else {
        (1_u64 << bits) - 1
    }
}

/// Value of cell `(row, col)` in an `n x n` code.
#[must_use]
pub const fn bit_at(code: u64, n: u32, row: u32, col: u32) -> bool {
    let shift = n * n - 1 - (row * n + col);
    (code >> shift) & 1 == 1
}

/// Turn an `n x n` code a quarter turn clockwise:
/// `new[i][j] = old[n - 1 - j][i]`.
#[must_use]
pub const fn rotate90(code: u64, n: u32) -> u64 {
    let bits = n * n;
    let mut out = 0_u64;
    let mut i = 0;
    while i < n {
        let mut j = 0;
        while j < n {
            if bit_at(code, n, n - 1 - j, i) {
                out |= 1 << (bits - 1 - (i * n + j));
            }
            j += 1;
        }
        i += 1;
    }
    out
}
