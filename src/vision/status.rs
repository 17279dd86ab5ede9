//! Pixel status probes

use super::capture::Frame;
use crate::regions::StatusCheck;

/// Check if a pixel matches an expected colour within a per-channel tolerance
pub fn pixel_matches(pixel: [u8; 4], expected: [u8; 3], tolerance: u8) -> bool {
    let dr = (pixel[0] as i16 - expected[0] as i16).abs();
    let dg = (pixel[1] as i16 - expected[1] as i16).abs();
    let db = (pixel[2] as i16 - expected[2] as i16).abs();
    dr <= tolerance as i16 && dg <= tolerance as i16 && db <= tolerance as i16
}

/// Share of pixels in `image` that satisfy the check
pub fn matching_ratio(image: &Frame, check: &StatusCheck) -> f32 {
    let total = (image.width * image.height) as usize;
    if total == 0 {
        return 0.0;
    }

    let hits = image
        .data
        .chunks_exact(4)
        .filter(|px| {
            let px = [px[0], px[1], px[2], px[3]];
            match check {
                StatusCheck::NonBlack { floor, .. } => {
                    px[0] > *floor || px[1] > *floor || px[2] > *floor
                }
                StatusCheck::Color {
                    target, tolerance, ..
                } => pixel_matches(px, *target, *tolerance),
            }
        })
        .count();

    hits as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::Rect;

    #[test]
    fn test_pixel_tolerance() {
        assert!(pixel_matches([100, 100, 100, 255], [105, 95, 100], 5));
        assert!(!pixel_matches([100, 100, 100, 255], [106, 100, 100], 5));
    }

    #[test]
    fn test_non_black_ratio() {
        let mut frame = Frame::solid(10, 10, [0, 0, 0, 255]);
        frame.fill_rect(Rect::new(0, 0, 10, 5), [200, 200, 200, 255]);

        let check = StatusCheck::NonBlack {
            floor: 16,
            min_ratio: 0.4,
        };
        assert_eq!(matching_ratio(&frame, &check), 0.5);
    }

    #[test]
    fn test_colour_ratio() {
        let mut frame = Frame::solid(4, 4, [0, 0, 0, 255]);
        frame.fill_rect(Rect::new(0, 0, 1, 4), [250, 10, 10, 255]);

        let check = StatusCheck::Color {
            target: [255, 0, 0],
            tolerance: 12,
            min_ratio: 0.2,
        };
        assert_eq!(matching_ratio(&frame, &check), 0.25);
    }

    #[test]
    fn test_empty_image() {
        let frame = Frame::new(0, 0, Vec::new());
        let check = StatusCheck::NonBlack {
            floor: 16,
            min_ratio: 0.1,
        };
        assert_eq!(matching_ratio(&frame, &check), 0.0);
    }
}
