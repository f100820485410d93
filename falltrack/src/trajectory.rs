//! Falling-object trajectory: timestamped bbox samples plus a reference frame

use crate::bbox::Bbox;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use nalgebra::{Cholesky, Matrix3, Vector3};
use std::time::{Duration, SystemTime};

/// Scale factor that maps a velocity to an arrow length in pixels
const VELOCITY_SCALE_FACTOR: f32 = 0.75;

/// X sample step along the fitted parabola when drawing
const DRAW_POLYLINE_STEP_X: f32 = 0.5;

const BOX_COLOR: Rgb<u8> = Rgb([255, 50, 100]);
const CENTER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const VELOCITY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const PARABOLA_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// One tracked bbox observation along a trajectory
#[derive(Debug, Clone)]
pub struct SamplePoint {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub x_center: f32,
    pub y_center: f32,
    pub x_velocity: f32,
    pub y_velocity: f32,
    pub timestamp: SystemTime,
}

/// Ordered, timestamped sequence of bbox samples for one tracked identity
///
/// The frame current at creation time is copied and kept as the annotation
/// canvas for [`draw`](Self::draw).
#[derive(Debug, Clone)]
pub struct Trajectory {
    first_frame: RgbImage,
    samples: Vec<SamplePoint>,
    age: u32,
}

impl Trajectory {
    pub fn new(first_frame: &RgbImage) -> Self {
        Self {
            first_frame: first_frame.clone(),
            samples: Vec::new(),
            age: 0,
        }
    }

    /// Append a bbox sample and reset the age count
    pub fn add(&mut self, bbox: Bbox, velocity: (f32, f32), timestamp: SystemTime) {
        self.samples.push(SamplePoint {
            x: bbox.x,
            y: bbox.y,
            width: bbox.width,
            height: bbox.height,
            x_center: bbox.center_x(),
            y_center: bbox.center_y(),
            x_velocity: velocity.0,
            y_velocity: velocity.1,
            timestamp,
        });
        self.age = 0;
    }

    /// Age count: frames since the last sample was appended
    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn increment_age(&mut self, count: u32) {
        self.age += count;
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[SamplePoint] {
        &self.samples
    }

    /// Frame captured when this trajectory started
    pub fn first_frame(&self) -> &RgbImage {
        &self.first_frame
    }

    /// Timestamp of the first sample
    pub fn start_time(&self) -> Option<SystemTime> {
        self.samples.first().map(|s| s.timestamp)
    }

    /// Time span between the first and last sample
    pub fn duration(&self) -> Duration {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last
                .timestamp
                .duration_since(first.timestamp)
                .unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// Horizontal distance between the first and last sample centers
    pub fn range_x(&self) -> f32 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => (last.x_center - first.x_center).abs(),
            _ => 0.0,
        }
    }

    /// Vertical distance between the first and last sample centers
    pub fn range_y(&self) -> f32 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => (last.y_center - first.y_center).abs(),
            _ => 0.0,
        }
    }

    /// Fit a parabola `y = a*x^2 + b*x + c` through the sample centers
    ///
    /// Weighted least squares with weights `exp(-i/N)`, solved through the
    /// normal equations with a Cholesky factorization. The normal matrix is
    /// accumulated in f64: squaring the Vandermonde conditioning eats most of
    /// an f32 mantissa for pixel-scale x ranges. Returns `None` when there
    /// are too few samples or the system is degenerate (e.g. a purely
    /// vertical fall).
    pub fn fit_parabola(&self) -> Option<Vector3<f32>> {
        let num_samples = self.samples.len();
        if num_samples < 3 {
            return None;
        }

        let mut ata = Matrix3::<f64>::zeros();
        let mut atb = Vector3::<f64>::zeros();

        for (i, sample) in self.samples.iter().enumerate() {
            let weight = (-(i as f64) / num_samples as f64).exp();
            let x = f64::from(sample.x_center);
            let row = Vector3::new(x * x, x, 1.0) * weight;
            ata += row * row.transpose();
            atb += row * (f64::from(sample.y_center) * weight);
        }

        Cholesky::new(ata).map(|factorization| {
            let solution = factorization.solve(&atb);
            Vector3::new(
                solution[0] as f32,
                solution[1] as f32,
                solution[2] as f32,
            )
        })
    }

    /// Annotate a copy of the first frame with the samples and fitted parabola
    pub fn draw(&self) -> RgbImage {
        let mut anno = self.first_frame.clone();

        let mut x_center_min = f32::MAX;
        let mut x_center_max = f32::MIN;

        for sample in &self.samples {
            x_center_min = x_center_min.min(sample.x_center);
            x_center_max = x_center_max.max(sample.x_center);

            let width = sample.width.max(1.0) as u32;
            let height = sample.height.max(1.0) as u32;
            draw_hollow_rect_mut(
                &mut anno,
                Rect::at(sample.x as i32, sample.y as i32).of_size(width, height),
                BOX_COLOR,
            );

            draw_cross_mut(
                &mut anno,
                CENTER_COLOR,
                sample.x_center as i32,
                sample.y_center as i32,
            );

            draw_line_segment_mut(
                &mut anno,
                (sample.x_center, sample.y_center),
                (
                    sample.x_center + VELOCITY_SCALE_FACTOR * sample.x_velocity,
                    sample.y_center + VELOCITY_SCALE_FACTOR * sample.y_velocity,
                ),
                VELOCITY_COLOR,
            );
        }

        if let Some(parameters) = self.fit_parabola() {
            let evaluate = |x: f32| parameters[0] * x * x + parameters[1] * x + parameters[2];

            let num_points = ((x_center_max - x_center_min) / DRAW_POLYLINE_STEP_X) as usize;
            for i in 1..num_points {
                let x0 = x_center_min + (i - 1) as f32 * DRAW_POLYLINE_STEP_X;
                let x1 = x_center_min + i as f32 * DRAW_POLYLINE_STEP_X;
                draw_line_segment_mut(
                    &mut anno,
                    (x0, evaluate(x0)),
                    (x1, evaluate(x1)),
                    PARABOLA_COLOR,
                );
            }
        }

        anno
    }
}
