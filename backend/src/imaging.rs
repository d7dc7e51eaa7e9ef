use log::warn;
use shared::{AbnormalityClass, ImageQuality, ImageStatistics};

// Classification thresholds. These are design constants shared with the
// heuristic rules; they are intentionally not runtime-tunable.
const DARK_BRIGHTNESS: f32 = 50.0;
const BRIGHT_BRIGHTNESS: f32 = 200.0;
const LOW_CONTRAST: f32 = 0.3;
const HIGH_CONTRAST: f32 = 0.8;

// Quality grading: minimum contrast and edge length for a diagnostically
// useful radiograph.
const QUALITY_MIN_CONTRAST: f32 = 0.2;
const QUALITY_MIN_EDGE: u32 = 224;

/// Computes brightness/contrast/shape statistics for an uploaded image.
///
/// Total function: a buffer that cannot be decoded yields the sentinel
/// statistics (`abnormality_detected: true`, class `Unknown`) so every
/// downstream stage always has a value to reason about.
pub fn analyze(image_bytes: &[u8]) -> ImageStatistics {
    match image::load_from_memory(image_bytes) {
        Ok(img) => compute(&img),
        Err(e) => {
            warn!("image decode failed, emitting sentinel statistics: {e}");
            sentinel()
        }
    }
}

fn compute(img: &image::DynamicImage) -> ImageStatistics {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let samples = (width as u64) * (height as u64) * 3;
    if samples == 0 {
        return sentinel();
    }

    let mut sum: u64 = 0;
    let mut min: u8 = u8::MAX;
    let mut max: u8 = u8::MIN;
    for pixel in rgb.pixels() {
        for &channel in pixel.0.iter() {
            sum += u64::from(channel);
            min = min.min(channel);
            max = max.max(channel);
        }
    }

    let avg_brightness = sum as f32 / samples as f32;
    let contrast = f32::from(max - min) / 255.0;

    let abnormality_detected = contrast < LOW_CONTRAST
        || contrast > HIGH_CONTRAST
        || avg_brightness < DARK_BRIGHTNESS
        || avg_brightness > BRIGHT_BRIGHTNESS;

    let abnormality_class = if !abnormality_detected {
        AbnormalityClass::Normal
    } else if avg_brightness < DARK_BRIGHTNESS {
        AbnormalityClass::Consolidation
    } else if avg_brightness > BRIGHT_BRIGHTNESS {
        AbnormalityClass::Hyperinflation
    } else if contrast < LOW_CONTRAST {
        AbnormalityClass::Effusion
    } else {
        AbnormalityClass::Infiltrate
    };

    ImageStatistics {
        width,
        height,
        avg_brightness,
        contrast,
        abnormality_detected,
        abnormality_class,
    }
}

/// Grades how usable the image is for diagnosis. Brightness in the normal
/// band and adequate contrast each weigh heaviest; resolution adds the
/// rest. Integer scoring keeps the tier boundaries exact.
pub fn quality(stats: &ImageStatistics) -> ImageQuality {
    let mut score = 0u8;
    if (DARK_BRIGHTNESS..=BRIGHT_BRIGHTNESS).contains(&stats.avg_brightness) {
        score += 4;
    }
    if stats.contrast >= QUALITY_MIN_CONTRAST {
        score += 4;
    }
    if stats.width >= QUALITY_MIN_EDGE && stats.height >= QUALITY_MIN_EDGE {
        score += 2;
    }

    if score > 8 {
        ImageQuality::Excellent
    } else if score > 6 {
        ImageQuality::Good
    } else if score > 4 {
        ImageQuality::Fair
    } else {
        ImageQuality::Poor
    }
}

pub(crate) fn sentinel() -> ImageStatistics {
    ImageStatistics {
        width: 0,
        height: 0,
        avg_brightness: 0.0,
        contrast: 0.0,
        abnormality_detected: true,
        abnormality_class: AbnormalityClass::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
        let buf = ImageBuffer::from_fn(width, height, |x, y| Rgb(f(x, y)));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(buf)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn garbage_bytes_yield_sentinel() {
        let stats = analyze(b"definitely not an image");
        assert!(stats.abnormality_detected);
        assert_eq!(stats.abnormality_class, AbnormalityClass::Unknown);
    }

    #[test]
    fn empty_buffer_yields_sentinel() {
        let stats = analyze(&[]);
        assert!(stats.abnormality_detected);
        assert_eq!(stats.abnormality_class, AbnormalityClass::Unknown);
    }

    #[test]
    fn statistics_stay_in_bounds() {
        for png in [
            png_from_fn(8, 8, |_, _| [0, 0, 0]),
            png_from_fn(8, 8, |_, _| [255, 255, 255]),
            png_from_fn(16, 16, |x, y| [(x * 16) as u8, (y * 16) as u8, 128]),
        ] {
            let stats = analyze(&png);
            assert!((0.0..=255.0).contains(&stats.avg_brightness));
            assert!((0.0..=1.0).contains(&stats.contrast));
        }
    }

    #[test]
    fn dark_uniform_image_classifies_as_consolidation() {
        let stats = analyze(&png_from_fn(32, 32, |_, _| [40, 40, 40]));
        assert_eq!(stats.width, 32);
        assert!(stats.avg_brightness < DARK_BRIGHTNESS);
        assert!(stats.contrast < LOW_CONTRAST);
        assert!(stats.abnormality_detected);
        assert_eq!(stats.abnormality_class, AbnormalityClass::Consolidation);
    }

    #[test]
    fn bright_uniform_image_classifies_as_hyperinflation() {
        let stats = analyze(&png_from_fn(32, 32, |_, _| [230, 230, 230]));
        assert_eq!(stats.abnormality_class, AbnormalityClass::Hyperinflation);
    }

    #[test]
    fn flat_midtone_image_classifies_as_effusion() {
        // Brightness inside [50, 200] but near-zero contrast.
        let stats = analyze(&png_from_fn(32, 32, |_, _| [128, 128, 128]));
        assert!(stats.abnormality_detected);
        assert_eq!(stats.abnormality_class, AbnormalityClass::Effusion);
    }

    #[test]
    fn moderate_gradient_is_normal() {
        // Intensities from 100 to 227: brightness ~163, contrast ~0.5.
        let stats = analyze(&png_from_fn(128, 8, |x, _| {
            let v = 100 + x as u8;
            [v, v, v]
        }));
        assert!(!stats.abnormality_detected);
        assert_eq!(stats.abnormality_class, AbnormalityClass::Normal);
    }

    fn stats(width: u32, height: u32, avg_brightness: f32, contrast: f32) -> ImageStatistics {
        ImageStatistics {
            width,
            height,
            avg_brightness,
            contrast,
            abnormality_detected: false,
            abnormality_class: AbnormalityClass::Normal,
        }
    }

    #[test]
    fn quality_grades_span_all_tiers() {
        // Good brightness, good contrast, full resolution.
        assert_eq!(quality(&stats(512, 512, 120.0, 0.5)), ImageQuality::Excellent);
        // Same exposure at thumbnail resolution.
        assert_eq!(quality(&stats(64, 64, 120.0, 0.5)), ImageQuality::Good);
        // Overexposed but sharp and large.
        assert_eq!(quality(&stats(512, 512, 240.0, 0.5)), ImageQuality::Fair);
        // Washed out and tiny.
        assert_eq!(quality(&stats(64, 64, 240.0, 0.05)), ImageQuality::Poor);
    }

    #[test]
    fn sentinel_statistics_grade_as_poor() {
        assert_eq!(quality(&sentinel()), ImageQuality::Poor);
    }

    #[test]
    fn full_range_gradient_flags_high_contrast() {
        let stats = analyze(&png_from_fn(256, 4, |x, _| {
            let v = x as u8;
            [v, v, v]
        }));
        assert!(stats.contrast > HIGH_CONTRAST);
        assert!(stats.abnormality_detected);
        assert_eq!(stats.abnormality_class, AbnormalityClass::Infiltrate);
    }
}
