//! Bounding-box overlay
//!
//! Reads the `__bbox__` tags from captured HTML and draws each box as a red
//! 2px rectangle on a copy of the screenshot.

use image::{ImageFormat, Rgba, RgbaImage};
use scraper::{Html, Selector};
use std::io::Cursor;
use thiserror::Error;

/// Attribute carrying `left,top,right,bottom` in document coordinates
pub const BBOX_ATTRIBUTE: &str = "__bbox__";

const STROKE: u32 = 2;
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("Failed to decode screenshot: {0}")]
    Decode(image::ImageError),

    #[error("Failed to encode annotated screenshot: {0}")]
    Encode(image::ImageError),
}

/// Element box in document pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl BoundingBox {
    /// Parses `l,t,r,b`, optionally wrapped in parentheses
    pub fn parse(value: &str) -> Option<Self> {
        let inner = value.trim().trim_start_matches('(').trim_end_matches(')');
        let parts: Vec<i64> = inner
            .split(',')
            .map(|p| p.trim().parse::<f64>().ok().map(|v| v.round() as i64))
            .collect::<Option<Vec<_>>>()?;

        match parts.as_slice() {
            [left, top, right, bottom] if right >= left && bottom >= top => Some(Self {
                left: *left,
                top: *top,
                right: *right,
                bottom: *bottom,
            }),
            _ => None,
        }
    }
}

/// Collects the boxes tagged in an HTML document, in document order
pub fn extract_boxes(html: &str) -> Vec<BoundingBox> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("[__bbox__]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr(BBOX_ATTRIBUTE))
        .filter_map(BoundingBox::parse)
        .collect()
}

/// Draws `boxes` on a PNG screenshot and returns the new PNG
pub fn draw_boxes(png: &[u8], boxes: &[BoundingBox]) -> Result<Vec<u8>, AnnotateError> {
    let mut canvas = image::load_from_memory_with_format(png, ImageFormat::Png)
        .map_err(AnnotateError::Decode)?
        .to_rgba8();

    for bbox in boxes {
        stroke_rect(&mut canvas, bbox);
    }

    let mut out = Cursor::new(Vec::new());
    canvas
        .write_to(&mut out, ImageFormat::Png)
        .map_err(AnnotateError::Encode)?;
    Ok(out.into_inner())
}

/// Overlays every box tagged in `html` on `png`
pub fn annotate_screenshot(png: &[u8], html: &str) -> Result<Vec<u8>, AnnotateError> {
    draw_boxes(png, &extract_boxes(html))
}

fn stroke_rect(canvas: &mut RgbaImage, bbox: &BoundingBox) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let clamp_x = |v: i64| v.clamp(0, i64::from(width) - 1) as u32;
    let clamp_y = |v: i64| v.clamp(0, i64::from(height) - 1) as u32;

    if bbox.right < 0 || bbox.bottom < 0 || bbox.left >= i64::from(width) || bbox.top >= i64::from(height) {
        return;
    }

    let (left, right) = (clamp_x(bbox.left), clamp_x(bbox.right));
    let (top, bottom) = (clamp_y(bbox.top), clamp_y(bbox.bottom));

    for x in left..=right {
        for t in 0..STROKE {
            put(canvas, x, top.saturating_add(t));
            put(canvas, x, bottom.saturating_sub(t));
        }
    }
    for y in top..=bottom {
        for t in 0..STROKE {
            put(canvas, left.saturating_add(t), y);
            put(canvas, right.saturating_sub(t), y);
        }
    }
}

fn put(canvas: &mut RgbaImage, x: u32, y: u32) {
    if x < canvas.width() && y < canvas.height() {
        canvas.put_pixel(x, y, RED);
    }
}
