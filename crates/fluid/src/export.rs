use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::flip_vertical_in_place;
use image::{ImageFormat, Rgba, RgbaImage};

use crate::backend::FieldSnapshot;

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Converts a premultiplied surface into a straight-alpha image, top row first.
pub fn surface_image(snapshot: &FieldSnapshot) -> RgbaImage {
    let mut image = RgbaImage::from_fn(snapshot.width, snapshot.height, |x, y| {
        let [r, g, b, a] = snapshot.texel(x, y);
        let a = a.clamp(0.0, 1.0);
        if a <= 0.0 {
            return Rgba([0, 0, 0, 0]);
        }
        Rgba([to_byte(r / a), to_byte(g / a), to_byte(b / a), to_byte(a)])
    });
    // Snapshots store the bottom row first.
    flip_vertical_in_place(&mut image);
    image
}

pub fn write_png(snapshot: &FieldSnapshot, path: &Path) -> Result<()> {
    surface_image(snapshot)
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write PNG to {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        width = snapshot.width,
        height = snapshot.height,
        "wrote snapshot"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> FieldSnapshot {
        FieldSnapshot {
            width: 2,
            height: 2,
            texels: vec![
                [0.25, 0.0, 0.0, 0.5],
                [0.0; 4],
                [0.0; 4],
                [0.0, 0.0, 1.0, 1.0],
            ],
        }
    }

    #[test]
    fn bottom_row_lands_at_the_bottom_of_the_image() {
        let image = surface_image(&snapshot());
        assert_eq!(image.get_pixel(0, 1), &Rgba([128, 0, 0, 128]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn png_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frame.png");
        write_png(&snapshot(), &path).expect("write png");

        let decoded = image::open(&path).expect("open png").to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.get_pixel(1, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn unwritable_path_reports_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("frame.png");
        let err = write_png(&snapshot(), &path).expect_err("missing directory");
        assert!(err.to_string().contains("failed to write PNG"));
    }
}
