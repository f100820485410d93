//! SORT-style multi-object tracker that accumulates falling-object trajectories
//!
//! Each frame, existing tracks are propagated by their Kalman estimators,
//! associated to the new detections by maximizing total IoU, and promoted
//! into trajectories once they have been confirmed for enough consecutive
//! frames. A trajectory that stops receiving samples is swept out; if it
//! looks like a falling object it is handed to the end callback before
//! being dropped.

use crate::bbox::{iou_matrix, Bbox};
use crate::box_tracker::TrackedBbox;
use crate::hungarian::HungarianSolver;
use crate::trajectory::Trajectory;
use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Constant control bias applied to every prediction: gravity plus a mild
/// horizontal drift
const PREDICTION_ACCELERATION: (f32, f32) = (0.05, 0.7);

/// Callback invoked synchronously for every ended trajectory that qualifies
/// as a falling object
///
/// The trajectory reference is dropped when the callback returns; copy out
/// whatever must outlive the call.
pub type TrajectoryEndedCallback = Box<dyn FnMut(u32, &Trajectory) + Send>;

/// Tuning parameters for [`SortTracker`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortTrackerParams {
    /// Frames a track survives without a matched detection
    pub max_bbox_age: u32,
    /// Consecutive updates before a track feeds its trajectory
    pub min_bbox_hit_streak: u32,
    /// Frames without samples before a trajectory ends
    pub max_trajectory_age: u32,
    /// Minimum samples for a qualifying trajectory
    pub min_trajectory_num_samples: usize,
    /// Minimum |dy| between first and last sample centers, in pixels
    pub min_trajectory_fall_distance: f32,
    /// IoU acceptance threshold for prediction-to-detection matches
    pub iou_threshold: f32,
}

impl Default for SortTrackerParams {
    fn default() -> Self {
        Self {
            max_bbox_age: 2,
            min_bbox_hit_streak: 3,
            max_trajectory_age: 15,
            min_trajectory_num_samples: 16,
            min_trajectory_fall_distance: 128.0,
            iou_threshold: 0.25,
        }
    }
}

/// Falling-object bbox tracker based on the SORT algorithm
pub struct SortTracker {
    params: SortTrackerParams,
    tracks: BTreeMap<u32, TrackedBbox>,
    trajectories: BTreeMap<u32, Trajectory>,
    trajectory_ended_callback: Option<TrajectoryEndedCallback>,
    /// Monotone tag source; tags are never recycled, not even across `clear`
    tag_count: u32,
    frame_count: u64,
}

impl SortTracker {
    pub fn new(params: SortTrackerParams) -> Self {
        Self {
            params,
            tracks: BTreeMap::new(),
            trajectories: BTreeMap::new(),
            trajectory_ended_callback: None,
            tag_count: 0,
            frame_count: 0,
        }
    }

    /// Register the callback invoked when a qualifying trajectory ends
    pub fn set_trajectory_ended_callback<F>(&mut self, callback: F)
    where
        F: FnMut(u32, &Trajectory) + Send + 'static,
    {
        self.trajectory_ended_callback = Some(Box::new(callback));
    }

    /// Update the tracker with this frame's detections
    ///
    /// Detection boxes may be negative or extend outside the frame and are
    /// taken as-is. `timestamp` defaults to the current system time.
    pub fn update(
        &mut self,
        detections: &[Bbox],
        frame: &RgbImage,
        timestamp: Option<SystemTime>,
    ) -> Result<()> {
        let timestamp = timestamp.unwrap_or_else(SystemTime::now);

        self.update_tracks(detections)?;
        self.update_trajectories(frame, timestamp);

        self.frame_count += 1;
        Ok(())
    }

    /// Drop all tracks and trajectories without firing callbacks
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.trajectories.clear();
    }

    /// Tells whether this tracker has no live trajectory
    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn num_trajectories(&self) -> usize {
        self.trajectories.len()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn update_tracks(&mut self, detections: &[Bbox]) -> Result<()> {
        // No tracks yet: every detection founds one.
        if self.tracks.is_empty() {
            for &detection in detections {
                let tag = self.unused_tag();
                self.tracks.insert(tag, TrackedBbox::new(detection));
            }
            return Ok(());
        }

        // Propagate every track one frame forward.
        let mut predictions = Vec::with_capacity(self.tracks.len());
        for (&tag, track) in self.tracks.iter_mut() {
            predictions.push((tag, track.predict(PREDICTION_ACCELERATION)));
        }

        let predicted: Vec<Bbox> = predictions.iter().map(|&(_, bbox)| bbox).collect();
        let iou = iou_matrix(&predicted, detections);
        let result = HungarianSolver::solve(iou.view(), true);
        let mut reversed = result.assignment_reversed;

        for (i, &(tag, _)) in predictions.iter().enumerate() {
            let j = result.assignment[i];
            if j >= 0 {
                let j = j as usize;
                if iou[(i, j)] > self.params.iou_threshold {
                    if let Some(track) = self.tracks.get_mut(&tag) {
                        track.update(detections[j])?;
                    }
                    continue;
                }
                // Poor match is canceled on both sides.
                reversed[j] = -1;
            }

            let expired = self
                .tracks
                .get(&tag)
                .is_some_and(|track| track.age() > self.params.max_bbox_age);
            if expired {
                self.tracks.remove(&tag);
                // A dead track ends its trajectory on this very frame.
                if let Some(trajectory) = self.trajectories.get_mut(&tag) {
                    trajectory.increment_age(self.params.max_trajectory_age + 1);
                    log::debug!("track {tag} expired, forcing its trajectory to end");
                }
            }
        }

        // Unmatched detections found new tracks.
        for (j, &row) in reversed.iter().enumerate() {
            if row == -1 {
                let tag = self.unused_tag();
                self.tracks.insert(tag, TrackedBbox::new(detections[j]));
            }
        }

        Ok(())
    }

    fn update_trajectories(&mut self, frame: &RgbImage, timestamp: SystemTime) {
        // Confirmed tracks feed their trajectories; a track that keeps its
        // streak but missed this frame's detection contributes its predicted
        // position.
        for (&tag, track) in &self.tracks {
            if track.hit_streak() < self.params.min_bbox_hit_streak {
                continue;
            }

            let trajectory = self.trajectories.entry(tag).or_insert_with(|| {
                log::debug!("track {tag} confirmed, trajectory started");
                Trajectory::new(frame)
            });
            trajectory.add(track.rect(), track.velocity(), timestamp);
        }

        // Sweep ended trajectories, reporting the ones that fell far enough.
        let ended: Vec<u32> = self
            .trajectories
            .iter()
            .filter(|(_, trajectory)| trajectory.age() > self.params.max_trajectory_age)
            .map(|(&tag, _)| tag)
            .collect();

        for tag in ended {
            if let Some(trajectory) = self.trajectories.remove(&tag) {
                if self.is_falling_object_trajectory(&trajectory) {
                    if let Some(callback) = self.trajectory_ended_callback.as_mut() {
                        callback(tag, &trajectory);
                    }
                }
            }
        }

        for trajectory in self.trajectories.values_mut() {
            trajectory.increment_age(1);
        }
    }

    fn is_falling_object_trajectory(&self, trajectory: &Trajectory) -> bool {
        let num_samples = trajectory.num_samples();
        if num_samples < self.params.min_trajectory_num_samples {
            log::debug!("trajectory discarded: {num_samples} samples");
            return false;
        }

        let fall_distance = trajectory.range_y();
        if fall_distance < self.params.min_trajectory_fall_distance {
            log::debug!("trajectory discarded: fall distance {fall_distance:.2} px");
            return false;
        }

        true
    }

    fn unused_tag(&mut self) -> u32 {
        let tag = self.tag_count;
        self.tag_count += 1;
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn frame() -> RgbImage {
        RgbImage::new(64, 48)
    }

    fn ts(frame_index: u64) -> Option<SystemTime> {
        Some(SystemTime::UNIX_EPOCH + Duration::from_millis(33 * frame_index))
    }

    fn test_params() -> SortTrackerParams {
        SortTrackerParams {
            max_bbox_age: 2,
            min_bbox_hit_streak: 3,
            max_trajectory_age: 5,
            min_trajectory_num_samples: 16,
            min_trajectory_fall_distance: 128.0,
            iou_threshold: 0.25,
        }
    }

    /// Collects (tag, sample count, fall distance) per ended trajectory.
    fn collecting_tracker(
        params: SortTrackerParams,
    ) -> (SortTracker, Arc<Mutex<Vec<(u32, usize, f32)>>>) {
        let mut tracker = SortTracker::new(params);
        let ended = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ended);
        tracker.set_trajectory_ended_callback(move |tag, trajectory: &Trajectory| {
            sink.lock()
                .unwrap()
                .push((tag, trajectory.num_samples(), trajectory.range_y()));
        });
        (tracker, ended)
    }

    #[test]
    fn test_single_falling_object_fires_one_callback() {
        let (mut tracker, ended) = collecting_tracker(test_params());
        let canvas = frame();

        // A 40x60 box falling 10 px per frame for 30 frames.
        for k in 0..30 {
            let detections = [Bbox::new(500.0, 50.0 + 10.0 * k as f32, 40.0, 60.0)];
            tracker.update(&detections, &canvas, ts(k)).unwrap();
        }

        // The object leaves the view; the track coasts, expires, and the
        // trajectory ends.
        for k in 30..40 {
            tracker.update(&[], &canvas, ts(k)).unwrap();
        }

        let ended = ended.lock().unwrap();
        assert_eq!(ended.len(), 1, "exactly one trajectory must end");
        let (_, num_samples, fall_distance) = ended[0];
        assert!(num_samples >= 16, "got {num_samples} samples");
        assert!(fall_distance >= 280.0, "got fall distance {fall_distance}");
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_crossing_rectangles_keep_their_tags() {
        let (mut tracker, ended) = collecting_tracker(test_params());
        let canvas = frame();

        // A moves right, B moves left; they pass through each other
        // mid-sequence at slightly different heights.
        for k in 0..20 {
            let a = Bbox::new(50.0 + 10.0 * k as f32, 100.0, 40.0, 40.0);
            let b = Bbox::new(290.0 - 10.0 * k as f32, 130.0, 40.0, 40.0);
            tracker.update(&[a, b], &canvas, ts(k)).unwrap();
        }

        assert_eq!(tracker.num_tracks(), 2, "both tracks must survive");
        let positions: Vec<(u32, f32)> = tracker
            .tracks
            .iter()
            .map(|(&tag, track)| (tag, track.rect().center_x()))
            .collect();
        assert_eq!(positions[0].0, 0);
        assert_eq!(positions[1].0, 1);
        // Tag 0 started on the left and must have ended on the right.
        assert!(
            positions[0].1 > positions[1].1,
            "tags swapped during the crossing: {positions:?}"
        );

        // Horizontal motion never qualifies as a fall.
        assert!(ended.lock().unwrap().is_empty());
    }

    #[test]
    fn test_transient_blob_never_becomes_trajectory() {
        let (mut tracker, ended) = collecting_tracker(test_params());
        let canvas = frame();

        tracker
            .update(&[Bbox::new(10.0, 10.0, 8.0, 8.0)], &canvas, ts(0))
            .unwrap();
        assert_eq!(tracker.num_tracks(), 1);
        assert_eq!(tracker.num_trajectories(), 0);

        // Nothing is ever detected again: the track coasts for max_bbox_age
        // frames and is then removed.
        for k in 1..=3 {
            tracker.update(&[], &canvas, ts(k)).unwrap();
        }
        assert_eq!(tracker.num_tracks(), 0);
        assert_eq!(tracker.num_trajectories(), 0);
        assert!(ended.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_update_creates_nothing_and_ages_tracks() {
        let (mut tracker, ended) = collecting_tracker(test_params());
        let canvas = frame();

        tracker
            .update(&[Bbox::new(20.0, 20.0, 10.0, 10.0)], &canvas, ts(0))
            .unwrap();
        tracker.update(&[], &canvas, ts(1)).unwrap();

        assert_eq!(tracker.num_tracks(), 1);
        let track = tracker.tracks.values().next().unwrap();
        assert_eq!(track.age(), 1);
        assert!(ended.lock().unwrap().is_empty());
    }

    #[test]
    fn test_tags_are_monotone_and_never_recycled() {
        let mut tracker = SortTracker::new(test_params());
        let canvas = frame();

        let detections = [
            Bbox::new(0.0, 0.0, 10.0, 10.0),
            Bbox::new(30.0, 0.0, 10.0, 10.0),
            Bbox::new(60.0, 0.0, 10.0, 10.0),
        ];
        tracker.update(&detections, &canvas, ts(0)).unwrap();
        let first: Vec<u32> = tracker.tracks.keys().copied().collect();
        assert_eq!(first, vec![0, 1, 2]);

        tracker.clear();
        assert_eq!(tracker.num_tracks(), 0);

        tracker.update(&detections, &canvas, ts(1)).unwrap();
        let second: Vec<u32> = tracker.tracks.keys().copied().collect();
        assert_eq!(second, vec![3, 4, 5], "tags must not be recycled");
    }

    #[test]
    fn test_clear_drops_trajectories_without_callbacks() {
        let (mut tracker, ended) = collecting_tracker(test_params());
        let canvas = frame();

        // Establish a confirmed track with a live trajectory.
        for k in 0..10 {
            let detections = [Bbox::new(100.0, 10.0 + 10.0 * k as f32, 40.0, 40.0)];
            tracker.update(&detections, &canvas, ts(k)).unwrap();
        }
        assert_eq!(tracker.num_trajectories(), 1);

        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.num_tracks(), 0);
        assert!(ended.lock().unwrap().is_empty());
    }

    #[test]
    fn test_track_ages_stay_bounded() {
        let mut tracker = SortTracker::new(test_params());
        let canvas = frame();

        tracker
            .update(&[Bbox::new(5.0, 5.0, 10.0, 10.0)], &canvas, ts(0))
            .unwrap();
        for k in 1..20 {
            tracker.update(&[], &canvas, ts(k)).unwrap();
            for track in tracker.tracks.values() {
                assert!(track.age() <= tracker.params.max_bbox_age);
            }
        }
    }
}
