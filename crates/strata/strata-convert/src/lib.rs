//! Raw-to-energy conversion of gain-switching detector samples.
//!
//! A raw sample carries its gain range in the top two bits and the ADC value
//! in the low 14. Each pixel has one `(gain, pedestal)` pair per gain range:
//!
//! ```text
//! out = ((raw & 0x3FFF) - pedestal[g][i]) * gain[g][i],  g = (raw >> 14) % n_gains
//! ```

const VALUE_MASK: u16 = 0x3FFF;
const GAIN_SHIFT: u32 = 14;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvertError {
    #[error("expected 3 or 4 gain ranges, got {gains} gain and {pedestals} pedestal tables")]
    GainRanges { gains: usize, pedestals: usize },

    #[error("{what} table {range} has {len} entries, expected {expected}")]
    TableSize {
        what: &'static str,
        range: usize,
        len: usize,
        expected: usize,
    },

    #[error("input of {len} samples does not match {expected} calibrated pixels")]
    InvalidInput { len: usize, expected: usize },

    #[error("output of {len} elements cannot hold {needed}")]
    OutputTooSmall { len: usize, needed: usize },

    #[error("module of {cols}x{rows} pixels does not cover {pixels} calibrated pixels")]
    Placement { cols: usize, rows: usize, pixels: usize },
}

/// Where a module's pixels land in a larger image, row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModulePlacement {
    /// Image index of the module's first pixel.
    pub start_index: usize,
    /// Image width, the distance between consecutive module rows.
    pub row_jump: usize,
    pub module_cols: usize,
    pub module_rows: usize,
}

impl ModulePlacement {
    fn required_len(&self) -> usize {
        match self.module_rows {
            0 => self.start_index,
            rows => self.start_index + (rows - 1) * self.row_jump + self.module_cols,
        }
    }

    #[inline]
    fn target(&self, index: usize) -> usize {
        let (row, col) = (index / self.module_cols, index % self.module_cols);
        self.start_index + row * self.row_jump + col
    }
}

pub struct Converter {
    /// `(gain, pedestal)` per gain range, per pixel.
    calibration: Vec<Vec<(f32, f32)>>,
    n_pixels: usize,
    placement: Option<ModulePlacement>,
}

impl Converter {
    pub fn new(
        gains: Vec<Vec<f32>>,
        pedestals: Vec<Vec<f32>>,
        placement: Option<ModulePlacement>,
    ) -> Result<Self, ConvertError> {
        let n_ranges = gains.len();
        if !(3..=4).contains(&n_ranges) || pedestals.len() != n_ranges {
            return Err(ConvertError::GainRanges {
                gains: n_ranges,
                pedestals: pedestals.len(),
            });
        }
        let n_pixels = gains[0].len();
        for (range, (g, p)) in gains.iter().zip(&pedestals).enumerate() {
            for (what, len) in [("gain", g.len()), ("pedestal", p.len())] {
                if len != n_pixels {
                    return Err(ConvertError::TableSize {
                        what,
                        range,
                        len,
                        expected: n_pixels,
                    });
                }
            }
        }
        if let Some(p) = placement {
            if p.module_cols * p.module_rows != n_pixels || p.row_jump < p.module_cols {
                return Err(ConvertError::Placement {
                    cols: p.module_cols,
                    rows: p.module_rows,
                    pixels: n_pixels,
                });
            }
        }

        let calibration = gains
            .into_iter()
            .zip(pedestals)
            .map(|(g, p)| g.into_iter().zip(p).collect())
            .collect();
        tracing::debug!(n_ranges, n_pixels, ?placement, "converter ready");
        Ok(Self {
            calibration,
            n_pixels,
            placement,
        })
    }

    pub fn n_pixels(&self) -> usize {
        self.n_pixels
    }

    /// Output elements [`Converter::convert`] writes up to.
    pub fn output_len(&self) -> usize {
        self.placement
            .map_or(self.n_pixels, |p| p.required_len())
    }

    pub fn convert(&self, raw: &[u16], out: &mut [f32]) -> Result<(), ConvertError> {
        self.check(raw.len(), out.len())?;
        let n_ranges = self.calibration.len();
        for (index, &sample) in raw.iter().enumerate() {
            let range = usize::from(sample >> GAIN_SHIFT) % n_ranges;
            let (gain, pedestal) = self.calibration[range][index];
            let value = f32::from(sample & VALUE_MASK);
            out[self.target(index)] = (value - pedestal) * gain;
        }
        Ok(())
    }

    /// Places uncalibrated samples into the image.
    pub fn copy_raw(&self, raw: &[u16], out: &mut [u16]) -> Result<(), ConvertError> {
        self.check(raw.len(), out.len())?;
        match self.placement {
            None => out[..raw.len()].copy_from_slice(raw),
            Some(p) => {
                for (row, chunk) in raw.chunks_exact(p.module_cols).enumerate() {
                    let start = p.start_index + row * p.row_jump;
                    out[start..start + p.module_cols].copy_from_slice(chunk);
                }
            }
        }
        Ok(())
    }

    fn check(&self, len: usize, out_len: usize) -> Result<(), ConvertError> {
        if len != self.n_pixels {
            return Err(ConvertError::InvalidInput {
                len,
                expected: self.n_pixels,
            });
        }
        let needed = self.output_len();
        if out_len < needed {
            return Err(ConvertError::OutputTooSmall { len: out_len, needed });
        }
        Ok(())
    }

    #[inline]
    fn target(&self, index: usize) -> usize {
        match &self.placement {
            None => index,
            Some(p) => p.target(index),
        }
    }
}
