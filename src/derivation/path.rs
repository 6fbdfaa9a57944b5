// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! BIP-32 derivation path parsing.

use std::{fmt, str::FromStr};

use super::DerivationError;

/// First hardened child index.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Deepest path accepted by the parser.
const MAX_DEPTH: usize = 10;

/// One path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildIndex {
    pub index: u32,
    pub hardened: bool,
}

impl ChildIndex {
    /// Index as used on the wire by BIP-32 / SLIP-10 (hardened bit set).
    pub fn raw(&self) -> u32 {
        if self.hardened {
            self.index | HARDENED_OFFSET
        } else {
            self.index
        }
    }
}

/// Parsed derivation path such as `m/44'/60'/0'/0/0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    segments: Vec<ChildIndex>,
}

impl DerivationPath {
    pub fn segments(&self) -> &[ChildIndex] {
        &self.segments
    }

    pub fn is_fully_hardened(&self) -> bool {
        self.segments.iter().all(|s| s.hardened)
    }
}

impl FromStr for DerivationPath {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| DerivationError::InvalidPath {
            path: s.to_string(),
            reason,
        };

        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(invalid("path must start with 'm'".into()));
        }

        let mut segments = Vec::new();
        for part in parts {
            let (digits, hardened) = match part.strip_suffix(['\'', 'h', 'H']) {
                Some(d) => (d, true),
                None => (part, false),
            };

            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!("segment '{part}' is not a child index")));
            }

            let index: u32 = digits
                .parse()
                .map_err(|_| invalid(format!("segment '{part}' is out of range")))?;
            if index >= HARDENED_OFFSET {
                return Err(invalid(format!("segment '{part}' is out of range")));
            }

            segments.push(ChildIndex { index, hardened });
        }

        if segments.is_empty() {
            return Err(invalid("path has no segments".into()));
        }
        if segments.len() > MAX_DEPTH {
            return Err(invalid(format!("path deeper than {MAX_DEPTH} levels")));
        }

        Ok(Self { segments })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for s in &self.segments {
            write!(f, "/{}", s.index)?;
            if s.hardened {
                f.write_str("'")?;
            }
        }
        Ok(())
    }
}
