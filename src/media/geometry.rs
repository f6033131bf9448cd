use std::time::Duration;

/// 视频截帧的最晚时间点
pub const MAX_SEEK: Duration = Duration::from_secs(2);

/// Scales `width × height` down to fit inside `max_width × max_height`,
/// keeping the aspect ratio. Never upscales; each side is at least 1 px.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || max_width == 0 || max_height == 0 {
        return (width.max(1).min(max_width.max(1)), height.max(1).min(max_height.max(1)));
    }

    let scale = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    if scale >= 1.0 {
        return (width, height);
    }

    let scaled_width = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let scaled_height = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    (scaled_width, scaled_height)
}

/// 把帧居中放入画布时的 (x, y, 宽, 高)
pub fn letterbox(
    frame_width: u32,
    frame_height: u32,
    canvas_width: u32,
    canvas_height: u32,
) -> (u32, u32, u32, u32) {
    let scale = (canvas_width as f64 / frame_width.max(1) as f64)
        .min(canvas_height as f64 / frame_height.max(1) as f64);
    let width = ((frame_width as f64 * scale).round() as u32).clamp(1, canvas_width.max(1));
    let height = ((frame_height as f64 * scale).round() as u32).clamp(1, canvas_height.max(1));
    let x = (canvas_width.saturating_sub(width)) / 2;
    let y = (canvas_height.saturating_sub(height)) / 2;
    (x, y, width, height)
}

/// `min(2s, duration / 2)`
pub fn seek_position(duration_seconds: f64) -> Duration {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(duration_seconds / 2.0).min(MAX_SEEK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_exact_ratio() {
        assert_eq!(fit_within(4000, 3000, 480, 360), (480, 360));
    }

    #[test]
    fn test_fit_never_upscales() {
        assert_eq!(fit_within(320, 200, 480, 360), (320, 200));
    }

    #[test]
    fn test_fit_portrait_and_tall() {
        assert_eq!(fit_within(3000, 4000, 480, 360), (270, 360));
        // 仅缩放长边会超出高度上限
        assert_eq!(fit_within(4000, 3900, 480, 360), (369, 360));
    }

    #[test]
    fn test_fit_bounding_property() {
        let sizes = [
            (1, 1),
            (7, 3),
            (1920, 1080),
            (1080, 1920),
            (5000, 17),
            (17, 5000),
            (640, 480),
        ];
        let bounds = [(480, 360), (360, 480), (100, 100), (1, 50)];

        for &(w, h) in &sizes {
            for &(max_w, max_h) in &bounds {
                let (tw, th) = fit_within(w, h, max_w, max_h);
                assert!(tw.max(th) <= max_w.max(max_h), "{w}x{h} -> {tw}x{th}");
                assert!(tw <= max_w && th <= max_h, "{w}x{h} in {max_w}x{max_h} -> {tw}x{th}");

                // 宽高比在取整误差内保持不变
                if tw > 1 && th > 1 {
                    let expected = w as f64 / h as f64;
                    let lo = (tw as f64 - 0.5) / (th as f64 + 0.5);
                    let hi = (tw as f64 + 0.5) / (th as f64 - 0.5);
                    assert!(lo <= expected && expected <= hi, "{w}x{h} -> {tw}x{th}");
                }
            }
        }
    }

    #[test]
    fn test_letterbox_centres_frame() {
        assert_eq!(letterbox(1920, 1080, 480, 360), (0, 45, 480, 270));
        assert_eq!(letterbox(1080, 1920, 480, 360), (138, 0, 203, 360));
        assert_eq!(letterbox(640, 480, 480, 360), (0, 0, 480, 360));
    }

    #[test]
    fn test_seek_position() {
        assert_eq!(seek_position(60.0), Duration::from_secs(2));
        assert_eq!(seek_position(3.0), Duration::from_millis(1500));
        assert_eq!(seek_position(0.0), Duration::ZERO);
        assert_eq!(seek_position(f64::NAN), Duration::ZERO);
    }
}
