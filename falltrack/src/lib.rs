//! Falling-object tracking library
//!
//! This crate implements the tracking half of a falling-object detection
//! pipeline: a SORT-style multi-object tracker built from a constant-velocity
//! Kalman bbox estimator and a Hungarian assignment solver over an IoU cost
//! matrix, plus trajectory accumulation that decides when a tracked object
//! has completed a qualifying fall.
//!
//! Detections come from the outside (background subtraction, blob
//! extraction); this crate only consumes per-frame bbox lists:
//!
//! ```rust,ignore
//! use falltrack::{Bbox, SortTracker, SortTrackerParams};
//!
//! let mut tracker = SortTracker::new(SortTrackerParams::default());
//! tracker.set_trajectory_ended_callback(|tag, trajectory| {
//!     let anno = trajectory.draw();
//!     // persist `anno` and the samples; the reference dies with the call
//! });
//!
//! for (detections, frame, timestamp) in frames {
//!     tracker.update(&detections, &frame, Some(timestamp))?;
//! }
//! ```

pub mod bbox;
pub mod box_tracker;
pub mod hungarian;
pub mod kalman;
pub mod tracker;
pub mod trajectory;

pub use bbox::{iou_matrix, Bbox};
pub use box_tracker::TrackedBbox;
pub use hungarian::{AssignmentResult, HungarianSolver};
pub use kalman::{KalmanFilter, KalmanFilterParams};
pub use tracker::{SortTracker, SortTrackerParams, TrajectoryEndedCallback};
pub use trajectory::{SamplePoint, Trajectory};
