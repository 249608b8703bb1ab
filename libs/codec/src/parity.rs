//! # Two-Dimensional Parity Blocks
//!
//! Second integrity layer, computed purely from message content. The payload
//! is laid out row-major in a `rows × cols` grid and every row and column gets
//! an XOR parity byte (longitudinal and vertical redundancy checks).
//!
//! ## Grid Shape
//! For payload length `L`, the smallest divisor `d` with `2 ≤ d < L` gives
//! `rows = d` and `cols = L / d`. Lengths without such a divisor (primes and
//! `L = 1`) get a single row of width `L`: the column parity is then the
//! payload itself and the block adds no detection power. That weakness is
//! inherent to the scheme and kept as is.
//!
//! ```text
//!  h  e  l | p0        p0 = h ^ e ^ l
//!  l  o  ! | p1        p1 = l ^ o ^ !
//! ---------
//!  c0 c1 c2            c0 = h ^ l ...
//! ```
//!
//! ## Verification
//! No parity block travels on the wire. A receiver can only recompute the
//! block from the bytes it got, and a recomputed block always agrees with
//! itself, so [`ParityBlock::verify`] cannot detect corruption: it rejects
//! empty payloads and otherwise returns the block for diagnostics. Detection
//! on the wire is the checksum's job. [`ParityBlock::check`] compares a block
//! computed earlier (by the sender) against a payload and pinpoints the rows
//! and columns that changed.

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// Grid dimensions derived from a payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    /// Derive the grid shape for a payload of `len` bytes
    pub fn for_len(len: usize) -> Self {
        if len == 0 {
            return Self { rows: 0, cols: 0 };
        }

        // The smallest proper divisor, if any, is never above sqrt(len)
        let divisor = (2..)
            .take_while(|d: &usize| d * d <= len)
            .find(|d| len % d == 0);

        match divisor {
            Some(d) => Self {
                rows: d,
                cols: len / d,
            },
            None => Self { rows: 1, cols: len },
        }
    }

    /// Number of cells, always equal to the payload length
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Single-row grid: no column redundancy
    pub fn is_degenerate(&self) -> bool {
        self.rows <= 1
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Row and column parity for one payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParityBlock {
    shape: GridShape,
    row_parity: Vec<u8>,
    col_parity: Vec<u8>,
}

impl ParityBlock {
    /// Compute the parity block of a payload
    pub fn encode(payload: &[u8]) -> Self {
        let shape = GridShape::for_len(payload.len());

        if shape.cell_count() == 0 {
            return Self {
                shape,
                row_parity: Vec::new(),
                col_parity: Vec::new(),
            };
        }

        let row_parity = payload
            .chunks_exact(shape.cols)
            .map(|row| row.iter().fold(0u8, |acc, b| acc ^ b))
            .collect();

        let mut col_parity = vec![0u8; shape.cols];
        for row in payload.chunks_exact(shape.cols) {
            for (cell, byte) in col_parity.iter_mut().zip(row) {
                *cell ^= byte;
            }
        }

        Self {
            shape,
            row_parity,
            col_parity,
        }
    }

    /// Recompute the block for a received payload
    ///
    /// Only an empty payload fails; any other payload yields its own block.
    pub fn verify(payload: &[u8]) -> ProtocolResult<Self> {
        if payload.is_empty() {
            return Err(ProtocolError::EmptyPayload);
        }

        Ok(Self::encode(payload))
    }

    /// Compare this block against a payload
    ///
    /// Fails if the payload no longer produces the same grid shape or the same
    /// parity vectors. The error names the rows and columns that differ.
    pub fn check(&self, payload: &[u8]) -> ProtocolResult<()> {
        let other = Self::encode(payload);
        let GridShape { rows, cols } = self.shape;

        if other.shape != self.shape {
            return Err(ProtocolError::parity_mismatch(
                rows,
                cols,
                format!("payload now forms a {} grid", other.shape),
            ));
        }

        let bad_rows = differing_positions(&self.row_parity, &other.row_parity);
        let bad_cols = differing_positions(&self.col_parity, &other.col_parity);

        if bad_rows.is_empty() && bad_cols.is_empty() {
            return Ok(());
        }

        let detail = match (bad_rows.as_slice(), bad_cols.as_slice()) {
            ([r], [c]) => format!("single cell changed at row {}, column {}", r, c),
            _ => format!("rows {:?} and columns {:?} differ", bad_rows, bad_cols),
        };

        Err(ProtocolError::parity_mismatch(rows, cols, detail))
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn row_parity(&self) -> &[u8] {
        &self.row_parity
    }

    pub fn col_parity(&self) -> &[u8] {
        &self.col_parity
    }

    /// XOR of every payload byte (the grid's corner cell)
    pub fn corner(&self) -> u8 {
        fold_xor(&self.row_parity)
    }

    /// Human-readable grid for diagnostics
    pub fn display<'a>(&'a self, payload: &'a [u8]) -> ParityGrid<'a> {
        ParityGrid {
            block: self,
            payload,
        }
    }

}

/// Display adapter showing payload bytes, the row-parity column, the
/// column-parity row and the corner cell. Not part of the wire protocol.
pub struct ParityGrid<'a> {
    block: &'a ParityBlock,
    payload: &'a [u8],
}

impl fmt::Display for ParityGrid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let GridShape { rows, cols } = self.block.shape;
        writeln!(f, "2D parity ({} grid):", self.block.shape)?;

        if rows * cols == 0 || self.payload.len() != rows * cols {
            return writeln!(f, "  <empty>");
        }

        for (row, parity) in self
            .payload
            .chunks_exact(cols)
            .zip(&self.block.row_parity)
        {
            for byte in row {
                write!(f, " {:^3} ", printable(*byte))?;
            }
            writeln!(f, "| {:02x}", parity)?;
        }

        writeln!(f, "{}", "-----".repeat(cols))?;

        for parity in &self.block.col_parity {
            write!(f, " {:^3} ", format!("{:02x}", parity))?;
        }
        writeln!(f, "| {:02x}", self.block.corner())
    }
}

fn printable(byte: u8) -> String {
    if byte.is_ascii_graphic() || byte == b' ' {
        (byte as char).to_string()
    } else {
        format!("{:02x}", byte)
    }
}

fn fold_xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

fn differing_positions(left: &[u8], right: &[u8]) -> Vec<usize> {
    left.iter()
        .zip(right)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, _)| i)
        .collect()
}
