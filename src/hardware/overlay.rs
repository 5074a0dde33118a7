//! Diagnostic text burned into frames.
//!
//! A 5x7 bitmap font covering exactly the characters of the FPS readout.

use crate::hardware::frame::CameraFrame;

const GLYPH_W: usize = 5;
const GLYPH_H: usize = 7;

/// Overlay colour, BGR
pub const OVERLAY_GREEN: [u8; 3] = [0, 255, 0];

// Each row is 5 bits, MSB is the leftmost pixel.
fn glyph(c: char) -> Option<[u8; GLYPH_H]> {
    Some(match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        ' ' => [0; GLYPH_H],
        _ => return None,
    })
}

/// Draw `text` with its top-left corner at (`x`, `y`), each font pixel
/// `scale` frame pixels wide. Characters without a glyph are skipped and
/// anything past the frame edge is clipped.
pub fn draw_text(frame: &mut CameraFrame, text: &str, x: usize, y: usize, scale: usize, color: [u8; 3]) {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let advance = (GLYPH_W + 1) * scale;

    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let origin_x = x + i * advance;

        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let px = origin_x + col * scale + sx;
                        let py = y + row * scale + sy;
                        if px >= width || py >= height {
                            continue;
                        }
                        let idx = (py * width + px) * 3;
                        frame.data[idx..idx + 3].copy_from_slice(&color);
                    }
                }
            }
        }
    }
}

/// Burn `FPS: NN.N` into the top-left corner.
pub fn draw_fps(frame: &mut CameraFrame, fps: f64) {
    draw_text(frame, &format!("FPS: {:.1}", fps), 10, 10, 3, OVERLAY_GREEN);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black(width: u32, height: u32) -> CameraFrame {
        CameraFrame::from_bgr(width, height, vec![0; (width * height * 3) as usize], 0).unwrap()
    }

    #[test]
    fn test_draw_fps_marks_pixels() {
        let mut frame = black(200, 40);
        draw_fps(&mut frame, 29.97);
        let lit = frame.data.chunks_exact(3).filter(|p| *p == OVERLAY_GREEN).count();
        assert!(lit > 0);
        // Nothing drawn above the text origin
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn test_draw_text_clips_at_edges() {
        let mut frame = black(8, 8);
        draw_text(&mut frame, "FPS: 88.8", 4, 4, 2, OVERLAY_GREEN);
        assert_eq!(frame.data.len(), 8 * 8 * 3);
    }

    #[test]
    fn test_unknown_characters_are_skipped() {
        let mut frame = black(20, 10);
        draw_text(&mut frame, "x", 0, 0, 1, OVERLAY_GREEN);
        assert!(frame.data.iter().all(|&b| b == 0));
    }
}
