use image::{RgbImage, RgbaImage};
use tiny_skia::{Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::decode::Pos;

const STROKE_WIDTH: f32 = 3.0;

/// Copies `frame` into an RGBA buffer for display and outlines `polygon` on it in lime green.
/// Returns `None` for an empty frame.
pub fn compose(frame: &RgbImage, polygon: Option<&[Pos]>) -> Option<RgbaImage> {
    let (width, height) = frame.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;

    // camera frames are opaque, so premultiplied and straight alpha agree
    for (dst, src) in pixmap.data_mut().chunks_exact_mut(4).zip(frame.pixels()) {
        dst.copy_from_slice(&[src.0[0], src.0[1], src.0[2], 0xFF]);
    }

    if let Some(points) = polygon.filter(|p| p.len() >= 2) {
        outline(&mut pixmap, points);
    }

    RgbaImage::from_raw(width, height, pixmap.take())
}

fn outline(pixmap: &mut Pixmap, points: &[Pos]) {
    let mut builder = PathBuilder::new();
    let mut iter = points.iter();
    if let Some(first) = iter.next() {
        builder.move_to(first.x as f32, first.y as f32);
    }
    for p in iter {
        builder.line_to(p.x as f32, p.y as f32);
    }
    builder.close();

    let Some(path) = builder.finish() else { return };

    let mut paint = Paint::default();
    paint.set_color_rgba8(0x32, 0xCD, 0x32, 0xFF);
    paint.anti_alias = true;
    let stroke = Stroke {
        width: STROKE_WIDTH,
        ..Default::default()
    };
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
}
