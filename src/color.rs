use image::Rgb;
use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Rank colours
// ---------------------------------------------------------------------------

/// Convert an HSL triple to an 8-bit pixel.
fn hsl_pixel(hue: f32, saturation: f32, lightness: f32) -> Rgb<u8> {
    let rgb: Srgb = Hsl::new(hue, saturation, lightness).into_color();
    Rgb([
        (rgb.red * 255.0).round() as u8,
        (rgb.green * 255.0).round() as u8,
        (rgb.blue * 255.0).round() as u8,
    ])
}

/// Curve colour for the `rank`-th of `total` anomalies.
///
/// Rank 1 is pure red; later ranks slide toward orange so a directory of
/// reports reads hottest-first.
pub fn rank_color(rank: usize, total: usize) -> Rgb<u8> {
    let spread = if total > 1 {
        (rank.saturating_sub(1) as f32 / (total - 1) as f32).min(1.0)
    } else {
        0.0
    };
    hsl_pixel(spread * 40.0, 0.85, 0.45)
}

/// Neutral colours used for the plot furniture.
pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
pub const FRAME: Rgb<u8> = Rgb([40, 40, 40]);
pub const GRID: Rgb<u8> = Rgb([228, 228, 228]);
pub const BASELINE: Rgb<u8> = Rgb([150, 150, 150]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_rank_is_red() {
        let Rgb([r, g, b]) = rank_color(1, 5);
        assert!(r > 200);
        assert!(g < 40);
        assert!(b < 40);
    }

    #[test]
    fn later_ranks_shift_toward_orange() {
        let Rgb([_, g_first, _]) = rank_color(1, 5);
        let Rgb([_, g_last, _]) = rank_color(5, 5);
        assert!(g_last > g_first);
    }

    #[test]
    fn single_anomaly_is_red() {
        assert_eq!(rank_color(1, 1), rank_color(1, 10));
    }
}
