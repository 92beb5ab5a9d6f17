//! Annotated live frames written to disk for an external viewer.

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use rollcall_core::{BoundingBox, UNKNOWN_LABEL};
use std::path::Path;

const KNOWN: Rgb<u8> = Rgb([0, 200, 0]);
const UNKNOWN: Rgb<u8> = Rgb([220, 0, 0]);

/// Draw one box per face: green for a recognized student, red otherwise.
pub fn annotate(image: &mut RgbImage, faces: &[(BoundingBox, String)]) {
    for (face, label) in faces {
        let color = if label == UNKNOWN_LABEL { UNKNOWN } else { KNOWN };
        let rect = Rect::at(face.x.round() as i32, face.y.round() as i32)
            .of_size(face.width.round().max(1.0) as u32, face.height.round().max(1.0) as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Replace the file at `path` with `image`, format chosen by extension.
/// The write goes through a temporary file so viewers never see a partial
/// image.
pub fn write(image: &RgbImage, path: &Path) -> Result<(), image::ImageError> {
    let format = ImageFormat::from_path(path)?;
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    image.save_with_format(&tmp, format)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
