use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use carspotter_contracts::records::BoundingBox;
use image::{Rgb, RgbImage};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;

pub fn annotated_path(image_path: &Path) -> PathBuf {
    let name = image_path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("image.png");
    image_path.with_file_name(format!("annotated_{name}"))
}

/// Writes a copy of `image_path` with the box outlined next to the original.
pub fn write_annotated(image_path: &Path, bounding_box: &BoundingBox) -> Result<PathBuf> {
    let mut canvas = image::open(image_path)
        .with_context(|| format!("failed decoding {}", image_path.display()))?
        .to_rgb8();
    draw_box(&mut canvas, bounding_box);
    let out = annotated_path(image_path);
    canvas
        .save(&out)
        .with_context(|| format!("failed writing {}", out.display()))?;
    Ok(out)
}

/// Outlines the box, clamped to the canvas; boxes fully outside draw nothing.
pub fn draw_box(canvas: &mut RgbImage, bounding_box: &BoundingBox) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let clamp = |value: i64, limit: u32| value.clamp(0, i64::from(limit) - 1) as u32;
    if bounding_box.x1 >= i64::from(width)
        || bounding_box.y1 >= i64::from(height)
        || bounding_box.x2 < 0
        || bounding_box.y2 < 0
    {
        return;
    }
    let x1 = clamp(bounding_box.x1, width);
    let y1 = clamp(bounding_box.y1, height);
    let x2 = clamp(bounding_box.x2, width);
    let y2 = clamp(bounding_box.y2, height);

    for offset in 0..BOX_THICKNESS {
        for x in x1..=x2 {
            put(canvas, x, y1.saturating_add(offset));
            put(canvas, x, y2.saturating_sub(offset));
        }
        for y in y1..=y2 {
            put(canvas, x1.saturating_add(offset), y);
            put(canvas, x2.saturating_sub(offset), y);
        }
    }
}

fn put(canvas: &mut RgbImage, x: u32, y: u32) {
    if x < canvas.width() && y < canvas.height() {
        canvas.put_pixel(x, y, BOX_COLOR);
    }
}
