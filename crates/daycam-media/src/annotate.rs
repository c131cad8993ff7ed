//! Detection overlay for the live preview.

use daycam_models::{BoundingBox, Detection};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::Rgb;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::frame::Frame;

/// Text drawn next to every box.
pub const LABEL_TEXT: &str = "Person";

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const BOX_THICKNESS: i64 = 2;
/// 8x8 glyphs drawn at 2x
const LABEL_SCALE: i64 = 2;
const GLYPH_SIZE: i64 = 8;

/// Draw one rectangle and one "Person" label per detection.
///
/// Box coordinates are used verbatim and clipped to the frame; the frame
/// dimensions never change. An empty slice leaves every pixel untouched.
pub fn annotate(frame: &mut Frame, detections: &[Detection]) {
    for detection in detections {
        let bbox = detection.bbox;
        draw_box(frame, bbox);
        let inset = BOX_THICKNESS + 2;
        draw_label(
            frame,
            i64::from(bbox.x) + inset,
            i64::from(bbox.y) + inset,
            LABEL_TEXT,
        );
    }
}

fn draw_box(frame: &mut Frame, bbox: BoundingBox) {
    let (x, y) = (i64::from(bbox.x), i64::from(bbox.y));
    let (w, h) = (i64::from(bbox.width), i64::from(bbox.height));
    if w <= 0 || h <= 0 {
        return;
    }

    let t = BOX_THICKNESS.min(w).min(h);
    let edges = [
        (x, y, w, t),
        (x, y + h - t, w, t),
        (x, y, t, h),
        (x + w - t, y, t, h),
    ];
    for (ex, ey, ew, eh) in edges {
        if let Some(rect) = clip_to_frame(frame, ex, ey, ew, eh) {
            draw_filled_rect_mut(frame, rect, BOX_COLOR);
        }
    }
}

/// Visible part of a rectangle, or `None` when it lies entirely off-frame.
fn clip_to_frame(frame: &Frame, x: i64, y: i64, w: i64, h: i64) -> Option<Rect> {
    let left = x.max(0);
    let top = y.max(0);
    let right = (x + w).min(i64::from(frame.width()));
    let bottom = (y + h).min(i64::from(frame.height()));
    if right <= left || bottom <= top {
        return None;
    }
    Some(Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32))
}

fn draw_label(frame: &mut Frame, x: i64, y: i64, text: &str) {
    let (frame_w, frame_h) = (i64::from(frame.width()), i64::from(frame.height()));
    let advance = GLYPH_SIZE * LABEL_SCALE;

    for (i, c) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(c) else {
            continue;
        };
        let origin_x = x + i as i64 * advance;

        for (row, bits) in glyph.into_iter().enumerate() {
            for col in 0u8..8 {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                let px = origin_x + i64::from(col) * LABEL_SCALE;
                let py = y + row as i64 * LABEL_SCALE;
                for dy in 0..LABEL_SCALE {
                    for dx in 0..LABEL_SCALE {
                        let (fx, fy) = (px + dx, py + dy);
                        if (0..frame_w).contains(&fx) && (0..frame_h).contains(&fy) {
                            frame.put_pixel(fx as u32, fy as u32, LABEL_COLOR);
                        }
                    }
                }
            }
        }
    }
}
