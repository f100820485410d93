//! ViBe-style per-pixel stochastic background model
//!
//! The model keeps, for every pixel, two history images plus a bag of color
//! samples. A pixel is background when enough stored colors sit within an L1
//! distance threshold of the observed color. Matched samples are rotated into
//! the history images so later frames are classified by the two cheap
//! history comparisons instead of the full sample scan.

use crate::error::{BgSegmError, Result};
use image::{GrayImage, RgbImage};
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Label value for a background pixel in the output mask
pub const BACKGROUND_LABEL: u8 = u8::MIN;

/// Label value for a foreground pixel in the output mask
pub const FOREGROUND_LABEL: u8 = u8::MAX;

/// Per-channel noise amplitude used when seeding samples from the first frame
const SEED_NOISE_AMPLITUDE: i16 = 10;

/// Construction parameters for [`ViBe`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViBeParams {
    /// Number of color samples kept per pixel
    pub num_samples: usize,
    /// Raw L1 threshold; the effective threshold is scaled by the channel count (3x)
    pub threshold_l1: u8,
    /// Minimum number of close samples for a pixel to count as background
    pub min_num_close_samples: u32,
    /// Update subsampling factor; each background pixel is refreshed with probability ~1/factor
    pub update_factor: usize,
    /// Fixed seed for the model-owned PRNG; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for ViBeParams {
    fn default() -> Self {
        Self {
            num_samples: 16,
            threshold_l1: 20,
            min_num_close_samples: 2,
            update_factor: 5,
            seed: None,
        }
    }
}

/// ViBe background subtractor over three-channel 8-bit frames
///
/// All buffers are owned, row-major and contiguous; pixel `(x, y)` lives at
/// byte offset `(y * width + x) * 3`. The sample block keeps the
/// `num_samples` cells of one pixel contiguous.
pub struct ViBe {
    h: usize,
    w: usize,
    num_samples: usize,
    /// Effective L1 threshold (3x the raw per-channel parameter)
    threshold: u32,
    min_close: i32,
    update_factor: usize,

    history0: Vec<u8>,
    history1: Vec<u8>,
    samples: Vec<u8>,

    /// Selects which history image receives matched samples; toggled per segment call
    swap_history_flag: bool,

    jump: Vec<usize>,
    replace: Vec<usize>,
    neighbor: Vec<i32>,

    rng: StdRng,
    initialized: bool,
}

impl ViBe {
    /// Create a background model for frames of the given dimensions
    ///
    /// Panics on zero dimensions or a zero sample count; there is no valid
    /// model for either.
    pub fn new(width: u32, height: u32, params: ViBeParams) -> Self {
        assert!(width > 0 && height > 0, "frame dimensions must be non-zero");
        assert!(params.num_samples > 0, "sample count must be non-zero");

        let w = width as usize;
        let h = height as usize;
        let table_len = 2 * w.max(h) + 1;
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            h,
            w,
            num_samples: params.num_samples,
            threshold: 3 * u32::from(params.threshold_l1),
            min_close: params.min_num_close_samples as i32,
            update_factor: params.update_factor,
            history0: vec![0; h * w * 3],
            history1: vec![0; h * w * 3],
            samples: vec![0; h * w * params.num_samples * 3],
            swap_history_flag: false,
            jump: vec![0; table_len],
            replace: vec![0; table_len],
            neighbor: vec![0; table_len],
            rng,
            initialized: false,
        }
    }

    /// Tells whether the model holds valid samples
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Invalidate the model; the next `segment` call reseeds from its frame
    pub fn clear(&mut self) {
        self.initialized = false;
        log::debug!("background model cleared; next segment call reseeds");
    }

    /// Classify every pixel of `frame` as background (0) or foreground (255)
    ///
    /// Seeds the model from `frame` on the first call after construction or
    /// [`clear`](Self::clear). Matched samples are swapped into the history
    /// image selected by the per-call toggle.
    pub fn segment(&mut self, frame: &RgbImage, fg_mask: &mut GrayImage) -> Result<()> {
        self.check_dims("frame", frame.dimensions())?;
        self.check_dims("foreground mask", fg_mask.dimensions())?;

        if !self.initialized {
            self.init(frame);
        }

        self.swap_history_flag = !self.swap_history_flag;
        let swap_into_h1 = self.swap_history_flag;

        let w = self.w;
        let n = self.num_samples;
        let threshold = self.threshold;
        let min_close = self.min_close;

        let frame_buf: &[u8] = frame.as_raw();
        let row_bytes = w * 3;
        let sample_row_bytes = w * n * 3;

        // Each pixel only touches its own mask byte, history cells and sample
        // row, so rows can be processed independently.
        fg_mask
            .par_chunks_exact_mut(w)
            .zip(frame_buf.par_chunks_exact(row_bytes))
            .zip(self.history0.par_chunks_exact_mut(row_bytes))
            .zip(self.history1.par_chunks_exact_mut(row_bytes))
            .zip(self.samples.par_chunks_exact_mut(sample_row_bytes))
            .for_each(|((((mask_row, frame_row), h0_row), h1_row), samples_row)| {
                for x in 0..w {
                    let o = x * 3;
                    let pixel = [frame_row[o], frame_row[o + 1], frame_row[o + 2]];

                    let mut counter = min_close - 1;
                    if distance_l1(&pixel, &h0_row[o..o + 3]) > threshold {
                        counter = min_close;
                    }
                    if distance_l1(&pixel, &h1_row[o..o + 3]) <= threshold {
                        counter -= 1;
                    }

                    if counter > 0 {
                        let history_cell = if swap_into_h1 {
                            &mut h1_row[o..o + 3]
                        } else {
                            &mut h0_row[o..o + 3]
                        };

                        for cell in samples_row[x * n * 3..(x + 1) * n * 3].chunks_exact_mut(3) {
                            if counter <= 0 {
                                break;
                            }
                            if distance_l1(&pixel, cell) <= threshold {
                                counter -= 1;
                                swap_pixels(cell, history_cell);
                            }
                        }
                    }

                    mask_row[x] = if counter > 0 {
                        FOREGROUND_LABEL
                    } else {
                        BACKGROUND_LABEL
                    };
                }
            });

        Ok(())
    }

    /// Sparsely refresh the model from pixels marked as background
    ///
    /// `update_mask` opts pixel `i` into the refresh when `update_mask[i] == 0`.
    /// The jump tables realize a ~1/update_factor per-pixel write probability
    /// without drawing a random number per pixel; interior writes propagate
    /// the color to a random column neighbor. This pass stays sequential:
    /// the neighbor write crosses pixel boundaries.
    pub fn update(&mut self, frame: &RgbImage, update_mask: &GrayImage) -> Result<()> {
        self.check_dims("frame", frame.dimensions())?;
        self.check_dims("update mask", update_mask.dimensions())?;

        if !self.initialized {
            return Err(BgSegmError::NotInitialized);
        }

        let w = self.w;
        let h = self.h;
        let n = self.num_samples;
        let frame_buf: &[u8] = frame.as_raw();
        let mask: &[u8] = update_mask;

        let jump = &self.jump;
        let replace = &self.replace;
        let neighbor = &self.neighbor;
        let history0 = &mut self.history0;
        let history1 = &mut self.history1;
        let samples = &mut self.samples;
        let rng = &mut self.rng;

        let mut stamp = |index: usize, slot: usize, value: [u8; 3]| {
            let dst = if slot < 2 {
                let history = if slot == 0 { &mut *history0 } else { &mut *history1 };
                &mut history[index * 3..index * 3 + 3]
            } else {
                let cell = (index * n + (slot - 2)) * 3;
                &mut samples[cell..cell + 3]
            };
            dst.copy_from_slice(&value);
        };

        // Interior rows: two-cell writes with column-neighbor propagation.
        for y in 1..h.saturating_sub(1) {
            let mut shift = rng.gen_range(0..w);
            let mut x = jump[shift];
            while x + 1 < w {
                let index = y * w + x;
                if mask[index] == BACKGROUND_LABEL {
                    let slot = replace[shift];
                    let value = pixel_at(frame_buf, index);
                    stamp(index, slot, value);
                    let neighbor_index = (index as i64 + i64::from(neighbor[shift])) as usize;
                    stamp(neighbor_index, slot, value);
                }
                shift += 1;
                x += jump[shift];
            }
        }

        // Borders: single-cell writes, no propagation.
        let mut border_rows = vec![0];
        if h > 1 {
            border_rows.push(h - 1);
        }
        for y in border_rows {
            let mut shift = rng.gen_range(0..w);
            let mut x = jump[shift];
            while x + 1 < w {
                let index = y * w + x;
                if mask[index] == BACKGROUND_LABEL {
                    stamp(index, replace[shift], pixel_at(frame_buf, index));
                }
                shift += 1;
                x += jump[shift];
            }
        }

        let mut border_cols = vec![0];
        if w > 1 {
            border_cols.push(w - 1);
        }
        for x in border_cols {
            let mut shift = rng.gen_range(0..h);
            let mut y = jump[shift];
            while y + 1 < h {
                let index = y * w + x;
                if mask[index] == BACKGROUND_LABEL {
                    stamp(index, replace[shift], pixel_at(frame_buf, index));
                }
                shift += 1;
                y += jump[shift];
            }
        }

        Ok(())
    }

    /// Seed history images, samples and random-index tables from `frame`
    fn init(&mut self, frame: &RgbImage) {
        let src: &[u8] = frame.as_raw();
        self.history0.copy_from_slice(src);
        self.history1.copy_from_slice(src);

        let n = self.num_samples;
        let noise = Uniform::new_inclusive(-SEED_NOISE_AMPLITUDE, SEED_NOISE_AMPLITUDE);
        let rng = &mut self.rng;
        let samples = &mut self.samples;

        for (i, pixel) in src.chunks_exact(3).enumerate() {
            for cell in samples[i * n * 3..(i + 1) * n * 3].chunks_exact_mut(3) {
                for c in 0..3 {
                    let value = i16::from(pixel[c]) + rng.sample(noise);
                    cell[c] = value.clamp(0, 255) as u8;
                }
            }
        }

        for i in 0..self.jump.len() {
            self.jump[i] = rng.gen_range(1..=2 * self.update_factor);
            self.replace[i] = rng.gen_range(0..=n + 1);
            self.neighbor[i] = rng.gen_range(-1..=1);
        }

        self.swap_history_flag = false;
        self.initialized = true;
        log::debug!(
            "background model seeded: {}x{}, {} samples per pixel",
            self.w,
            self.h,
            n
        );
    }

    fn check_dims(&self, what: &'static str, actual: (u32, u32)) -> Result<()> {
        let expected = (self.w as u32, self.h as u32);
        if actual != expected {
            return Err(BgSegmError::DimensionMismatch {
                what,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// L1 color distance between two 3-channel pixels
#[inline]
fn distance_l1(a: &[u8], b: &[u8]) -> u32 {
    u32::from(a[0].abs_diff(b[0])) + u32::from(a[1].abs_diff(b[1])) + u32::from(a[2].abs_diff(b[2]))
}

/// Exchange the contents of two 3-byte pixel cells
#[inline]
fn swap_pixels(a: &mut [u8], b: &mut [u8]) {
    for c in 0..3 {
        std::mem::swap(&mut a[c], &mut b[c]);
    }
}

#[inline]
fn pixel_at(buf: &[u8], index: usize) -> [u8; 3] {
    [buf[index * 3], buf[index * 3 + 1], buf[index * 3 + 2]]
}
