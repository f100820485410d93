//! Stochastic background segmentation for fixed-camera video analytics
//!
//! This crate implements a ViBe-style background subtractor: every pixel
//! owns a small bag of recently observed colors plus two history images, and
//! is classified by counting stored colors within an L1 threshold of the
//! observation. The model is refreshed sparsely from pixels the caller marks
//! as background.
//!
//! The crate deliberately stops at the mask: morphological cleanup,
//! connected components and blob extraction are the caller's concern.
//!
//! ```rust,ignore
//! use bgsegm::{ViBe, ViBeParams};
//! use image::GrayImage;
//!
//! let mut vibe = ViBe::new(width, height, ViBeParams::default());
//! let mut fg_mask = GrayImage::new(width, height);
//! vibe.segment(&frame, &mut fg_mask)?;   // seeds on the first call
//! vibe.update(&frame, &update_mask)?;    // refresh from background pixels
//! ```

pub mod error;
pub mod vibe;

pub use error::{BgSegmError, Result};
pub use vibe::{ViBe, ViBeParams, BACKGROUND_LABEL, FOREGROUND_LABEL};
