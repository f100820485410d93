//! Tracks a synthetic falling box and saves the annotated trajectory.

use falltrack::{Bbox, SortTracker, SortTrackerParams};
use image::RgbImage;
use std::time::{Duration, SystemTime};

fn main() -> anyhow::Result<()> {
    let frame = RgbImage::from_pixel(640, 480, image::Rgb([24, 24, 24]));

    let mut tracker = SortTracker::new(SortTrackerParams {
        max_trajectory_age: 5,
        ..SortTrackerParams::default()
    });

    tracker.set_trajectory_ended_callback(|tag, trajectory| {
        println!(
            "trajectory {tag} ended: {} samples, fell {:.1} px over {:?}",
            trajectory.num_samples(),
            trajectory.range_y(),
            trajectory.duration(),
        );

        let anno = trajectory.draw();
        let path = format!("trajectory_{tag}.png");
        match anno.save(&path) {
            Ok(()) => println!("annotated frame saved to {path}"),
            Err(e) => eprintln!("failed to save {path}: {e}"),
        }
    });

    let start = SystemTime::now();

    // A bottle-sized box falling with slight horizontal drift.
    for k in 0..40 {
        let t = k as f32;
        let bbox = Bbox::new(300.0 + 1.5 * t, 40.0 + 0.4 * t * t, 24.0, 40.0);
        let timestamp = start + Duration::from_millis(33 * k);
        tracker.update(&[bbox], &frame, Some(timestamp))?;
    }

    // The object has left the view; keep feeding empty frames so the
    // trajectory ends and the callback fires.
    for k in 40..52 {
        let timestamp = start + Duration::from_millis(33 * k);
        tracker.update(&[], &frame, Some(timestamp))?;
    }

    Ok(())
}
