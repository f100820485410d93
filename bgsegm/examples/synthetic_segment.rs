//! Segments a synthetic moving square against a static background.

use bgsegm::{ViBe, ViBeParams, FOREGROUND_LABEL};
use image::{GrayImage, Rgb, RgbImage};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;

fn scene(object_x: u32) -> RgbImage {
    let mut frame = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([96, 112, 128]));
    for y in 40..60 {
        for x in object_x..(object_x + 20).min(WIDTH) {
            frame.put_pixel(x, y, Rgb([230, 60, 40]));
        }
    }
    frame
}

fn main() -> Result<(), bgsegm::BgSegmError> {
    let mut vibe = ViBe::new(
        WIDTH,
        HEIGHT,
        ViBeParams {
            seed: Some(7),
            ..ViBeParams::default()
        },
    );
    let mut fg_mask = GrayImage::new(WIDTH, HEIGHT);

    // Seed from an empty scene.
    let background = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([96, 112, 128]));
    vibe.segment(&background, &mut fg_mask)?;

    for step in 0..10 {
        let frame = scene(10 * step);
        vibe.segment(&frame, &mut fg_mask)?;

        let foreground = fg_mask
            .as_raw()
            .iter()
            .filter(|&&v| v == FOREGROUND_LABEL)
            .count();
        println!("frame {step}: {foreground} foreground pixels");

        // Refresh the model from everything currently labeled background.
        vibe.update(&frame, &fg_mask)?;
    }

    Ok(())
}
