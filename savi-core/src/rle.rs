// Compressed run-length masks, COCO layout.
//
// Runs are counted over the mask in column-major order, starting with a run of
// background pixels (which may be empty). The counts are packed into printable
// ASCII: each count is delta-coded against the count two positions back (from
// the fourth count on) and written as little-endian 5-bit groups offset by 48,
// with bit 0x20 flagging a continuation and bit 0x10 carrying the sign.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A segmentation mask for one object on one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RleMask {
    /// `[height, width]`
    pub size: [u32; 2],
    pub counts: String,
}

impl RleMask {
    /// Encode a row-major binary mask.
    pub fn from_binary(height: u32, width: u32, pixels: &[bool]) -> Result<Self> {
        let (h, w) = (height as usize, width as usize);
        if pixels.len() != h * w {
            return Err(Error::InvalidPayload(format!(
                "mask has {} pixels, expected {}x{}",
                pixels.len(),
                height,
                width
            )));
        }

        let mut runs = Vec::new();
        let mut current = false;
        let mut run = 0u32;
        for x in 0..w {
            for y in 0..h {
                let value = pixels[y * w + x];
                if value != current {
                    runs.push(run);
                    run = 0;
                    current = value;
                }
                run += 1;
            }
        }
        runs.push(run);

        Ok(Self {
            size: [height, width],
            counts: pack_counts(&runs),
        })
    }

    /// An all-background mask.
    pub fn empty(height: u32, width: u32) -> Self {
        Self {
            size: [height, width],
            counts: pack_counts(&[height * width]),
        }
    }

    pub fn height(&self) -> u32 {
        self.size[0]
    }

    pub fn width(&self) -> u32 {
        self.size[1]
    }

    /// Unpacked run lengths, alternating background/foreground.
    pub fn runs(&self) -> Result<Vec<u32>> {
        unpack_counts(&self.counts)
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> Result<u64> {
        Ok(self
            .runs()?
            .iter()
            .skip(1)
            .step_by(2)
            .map(|&r| r as u64)
            .sum())
    }

    /// Decode back to a row-major binary mask.
    pub fn to_binary(&self) -> Result<Vec<bool>> {
        let (h, w) = (self.height() as usize, self.width() as usize);
        let runs = self.runs()?;
        let total: u64 = runs.iter().map(|&r| r as u64).sum();
        if total != (h * w) as u64 {
            return Err(Error::InvalidPayload(format!(
                "RLE covers {} pixels, mask is {}x{}",
                total, h, w
            )));
        }

        let mut pixels = vec![false; h * w];
        let mut position = 0usize;
        let mut value = false;
        for run in runs {
            for _ in 0..run {
                let (x, y) = (position / h, position % h);
                pixels[y * w + x] = value;
                position += 1;
            }
            value = !value;
        }
        Ok(pixels)
    }
}

fn pack_counts(runs: &[u32]) -> String {
    let mut out = String::new();
    for (i, &run) in runs.iter().enumerate() {
        let mut x = run as i64;
        if i > 2 {
            x -= runs[i - 2] as i64;
        }
        loop {
            let mut c = (x & 0x1f) as u8;
            x >>= 5;
            let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            out.push((c + 48) as char);
            if !more {
                break;
            }
        }
    }
    out
}

fn unpack_counts(counts: &str) -> Result<Vec<u32>> {
    let bytes = counts.as_bytes();
    let mut runs: Vec<u32> = Vec::new();
    let mut p = 0;
    while p < bytes.len() {
        let mut x = 0i64;
        let mut k = 0u32;
        loop {
            let byte = bytes[p];
            if !(48..48 + 64).contains(&byte) {
                return Err(Error::InvalidPayload(format!(
                    "invalid RLE character {:?} at offset {}",
                    byte as char, p
                )));
            }
            if 5 * k >= 64 {
                return Err(Error::InvalidPayload("RLE count overflows".to_string()));
            }
            let c = (byte - 48) as i64;
            x |= (c & 0x1f) << (5 * k);
            p += 1;
            k += 1;
            let more = c & 0x20 != 0;
            if !more {
                if c & 0x10 != 0 && 5 * k < 64 {
                    x |= -1i64 << (5 * k);
                }
                break;
            }
            if p >= bytes.len() {
                return Err(Error::InvalidPayload("truncated RLE counts".to_string()));
            }
        }
        if runs.len() > 2 {
            x += runs[runs.len() - 2] as i64;
        }
        let run = u32::try_from(x)
            .map_err(|_| Error::InvalidPayload(format!("RLE run out of range: {}", x)))?;
        runs.push(run);
    }
    Ok(runs)
}
