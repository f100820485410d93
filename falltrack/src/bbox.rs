//! Bounding box operations and IoU calculations

use ndarray::prelude::*;
use rayon::prelude::*;
use std::fmt;

/// Axis-aligned bounding box in float pixel coordinates
///
/// Boxes may be negative or extend outside the frame; nothing here clamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bbox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Convert to the measurement vector [center_x, center_y, area, aspect_ratio]
    /// used by the Kalman box state
    pub fn to_measurement(&self) -> [f32; 4] {
        let aspect_ratio = if self.height != 0.0 {
            self.width / self.height
        } else {
            1.0
        };
        [
            self.center_x(),
            self.center_y(),
            self.area(),
            aspect_ratio,
        ]
    }

    /// Reconstruct a box from [center_x, center_y, area, aspect_ratio]
    ///
    /// A negative area or aspect ratio cannot come from a real box; those
    /// measurements map to the zero box.
    pub fn from_measurement(z: &[f32; 4]) -> Self {
        let [center_x, center_y, area, aspect_ratio] = *z;
        if area < 0.0 || aspect_ratio < 0.0 {
            return Self::new(0.0, 0.0, 0.0, 0.0);
        }

        let width = (area * aspect_ratio).sqrt();
        let height = if width > 0.0 { area / width } else { 0.0 };

        Self {
            x: center_x - width / 2.0,
            y: center_y - height / 2.0,
            width,
            height,
        }
    }

    /// Intersection over union with another box; 0 when disjoint
    pub fn iou(&self, other: &Bbox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

impl fmt::Display for Bbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bbox({}, {}, {}, {})",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Compute the IoU matrix between predicted and detected boxes
/// Returns: (n_predictions, n_detections) IoU matrix
pub fn iou_matrix(predictions: &[Bbox], detections: &[Bbox]) -> Array2<f32> {
    let m = predictions.len();
    let n = detections.len();

    if m == 0 || n == 0 {
        return Array2::zeros((m, n));
    }

    let iou_data: Vec<f32> = predictions
        .par_iter()
        .flat_map(|predicted| {
            detections
                .iter()
                .map(|detected| predicted.iou(detected))
                .collect::<Vec<_>>()
        })
        .collect();

    Array2::from_shape_vec((m, n), iou_data).expect("IoU matrix shape mismatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bbox_properties() {
        let bbox = Bbox::new(0.0, 0.0, 10.0, 5.0);
        assert_eq!(bbox.width, 10.0);
        assert_eq!(bbox.height, 5.0);
        assert_eq!(bbox.area(), 50.0);
        assert_eq!(bbox.center_x(), 5.0);
        assert_eq!(bbox.center_y(), 2.5);
        assert!(!bbox.is_empty());
    }

    #[test]
    fn test_iou_overlapping() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
        let b = Bbox::new(5.0, 5.0, 10.0, 10.0);
        assert_abs_diff_eq!(a.iou(&b), 25.0 / 175.0, epsilon = 0.001);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
        let b = Bbox::new(20.0, 20.0, 5.0, 5.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_measurement_round_trip() {
        let bbox = Bbox::new(10.0, 20.0, 30.0, 40.0);
        let z = bbox.to_measurement();
        let back = Bbox::from_measurement(&z);

        assert_abs_diff_eq!(bbox.x, back.x, epsilon = 1e-4);
        assert_abs_diff_eq!(bbox.y, back.y, epsilon = 1e-4);
        assert_abs_diff_eq!(bbox.width, back.width, epsilon = 1e-4);
        assert_abs_diff_eq!(bbox.height, back.height, epsilon = 1e-4);
    }

    #[test]
    fn test_degenerate_measurement_yields_zero_box() {
        let negative_area = Bbox::from_measurement(&[5.0, 5.0, -1.0, 1.0]);
        assert!(negative_area.is_empty());
        assert_eq!(negative_area, Bbox::new(0.0, 0.0, 0.0, 0.0));

        let negative_ratio = Bbox::from_measurement(&[5.0, 5.0, 1.0, -1.0]);
        assert!(negative_ratio.is_empty());
    }

    #[test]
    fn test_iou_matrix_shape_and_values() {
        let predictions = vec![
            Bbox::new(0.0, 0.0, 10.0, 10.0),
            Bbox::new(100.0, 100.0, 10.0, 10.0),
        ];
        let detections = vec![
            Bbox::new(0.0, 0.0, 10.0, 10.0),
            Bbox::new(5.0, 0.0, 10.0, 10.0),
            Bbox::new(50.0, 50.0, 10.0, 10.0),
        ];

        let iou = iou_matrix(&predictions, &detections);
        assert_eq!(iou.dim(), (2, 3));
        assert_abs_diff_eq!(iou[(0, 0)], 1.0, epsilon = 0.001);
        assert_abs_diff_eq!(iou[(0, 1)], 50.0 / 150.0, epsilon = 0.001);
        assert_eq!(iou[(0, 2)], 0.0);
        assert_eq!(iou[(1, 0)], 0.0);

        let empty = iou_matrix(&[], &detections);
        assert_eq!(empty.dim(), (0, 3));
    }
}
