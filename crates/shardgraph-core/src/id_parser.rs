//! GID bit layout.
//!
//! ```text
//! | fid bits | label bits | offset bits |
//!   high                          low
//! ```
//!
//! The fragment slice is sized for `fnum`, the label slice for the largest
//! label count; the offset takes the remaining bits.

use crate::{FragmentId, Gid, LabelId, LoadError};
use serde::{Deserialize, Serialize};

/// Packs and unpacks `(fid, label, offset)` into a `Gid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdParser {
    fnum: u32,
    label_num: u32,
    fid_bits: u32,
    label_bits: u32,
    offset_bits: u32,
}

/// Bits needed to represent `0..n`, at least one.
const fn bits_for(n: u32) -> u32 {
    if n <= 1 {
        1
    } else {
        u32::BITS - (n - 1).leading_zeros()
    }
}

impl IdParser {
    pub fn new(fnum: usize, label_num: usize) -> Result<Self, LoadError> {
        let fnum = u32::try_from(fnum)
            .ok()
            .filter(|&f| f > 0)
            .ok_or_else(|| LoadError::InvalidArgument(format!("invalid fragment count {fnum}")))?;
        let label_num = u32::try_from(label_num.max(1))
            .map_err(|_| LoadError::InvalidArgument(format!("invalid label count {label_num}")))?;
        let fid_bits = bits_for(fnum);
        let label_bits = bits_for(label_num);
        if fid_bits + label_bits >= u64::BITS {
            return Err(LoadError::InvalidArgument(
                "fragment and label counts leave no offset bits".to_string(),
            ));
        }
        Ok(Self {
            fnum,
            label_num,
            fid_bits,
            label_bits,
            offset_bits: u64::BITS - fid_bits - label_bits,
        })
    }

    /// Largest offset plus one.
    #[must_use]
    pub const fn offset_capacity(&self) -> u64 {
        1 << self.offset_bits
    }

    pub fn generate(&self, fid: FragmentId, label: LabelId, offset: u64) -> Result<Gid, LoadError> {
        if fid.0 >= self.fnum {
            return Err(LoadError::InvalidArgument(format!(
                "fragment {fid} out of range for {} fragments",
                self.fnum
            )));
        }
        if label.0 >= self.label_num {
            return Err(LoadError::InvalidArgument(format!(
                "label {} out of range for {} labels",
                label.0, self.label_num
            )));
        }
        if offset >= self.offset_capacity() {
            return Err(LoadError::InvalidArgument(format!(
                "offset {offset} overflows {} offset bits",
                self.offset_bits
            )));
        }
        let fid_shift = self.label_bits + self.offset_bits;
        Ok(Gid(
            (u64::from(fid.0) << fid_shift) | (u64::from(label.0) << self.offset_bits) | offset,
        ))
    }

    #[must_use]
    pub const fn fid(&self, gid: Gid) -> FragmentId {
        FragmentId((gid.0 >> (self.label_bits + self.offset_bits)) as u32)
    }

    #[must_use]
    pub const fn label(&self, gid: Gid) -> LabelId {
        let mask = (1u64 << self.label_bits) - 1;
        LabelId(((gid.0 >> self.offset_bits) & mask) as u32)
    }

    #[must_use]
    pub const fn offset(&self, gid: Gid) -> u64 {
        gid.0 & (self.offset_capacity() - 1)
    }
}
