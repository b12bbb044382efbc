//! QR detection on captured frames.
//!
//! A frame either yields a [`Detection`] or nothing. Library errors and
//! panics inside the detector are folded into "nothing".

use std::panic::{self, AssertUnwindSafe};

use image::{GrayImage, RgbImage};
use log::trace;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}
impl Pos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Corner points of a detected symbol, in frame pixel coordinates.
pub type Polygon = Vec<Pos>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub text: String,
    pub polygon: Polygon,
}

pub trait Decoder {
    fn decode(&self, frame: &RgbImage) -> Option<Detection>;
}

pub struct QrDecoder {
    /// Retry on the inverted frame when the plain pass finds nothing.
    pub try_harder: bool,
}

impl QrDecoder {
    pub fn new(try_harder: bool) -> Self {
        Self { try_harder }
    }
}

impl Decoder for QrDecoder {
    fn decode(&self, frame: &RgbImage) -> Option<Detection> {
        let gray = image::imageops::grayscale(frame);
        absorb(|| scan(&gray, false).or_else(|| if self.try_harder { scan(&gray, true) } else { None }))
    }
}

/// Runs a detector pass; a panic inside it counts as no detection.
pub fn absorb(pass: impl FnOnce() -> Option<Detection>) -> Option<Detection> {
    match panic::catch_unwind(AssertUnwindSafe(pass)) {
        Ok(found) => found,
        Err(_) => {
            trace!("detector panicked");
            None
        }
    }
}

fn scan(gray: &GrayImage, invert: bool) -> Option<Detection> {
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        gray.width() as usize,
        gray.height() as usize,
        |x, y| {
            let luma = gray.get_pixel(x as u32, y as u32).0[0];
            if invert {
                u8::MAX - luma
            } else {
                luma
            }
        },
    );

    // first grid that decodes wins
    prepared.detect_grids().into_iter().find_map(|grid| match grid.decode() {
        Ok((_meta, content)) => Some(Detection {
            text: content,
            polygon: grid.bounds.iter().map(|p| Pos::new(p.x, p.y)).collect(),
        }),
        Err(e) => {
            trace!("grid found but not decoded: {e}");
            None
        }
    })
}
