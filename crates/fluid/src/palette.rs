use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::Theme;

/// Random source for splat colours and ambient splats.
#[derive(Debug, Clone)]
pub struct Palette {
    rng: StdRng,
}

impl Palette {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// A dim, fully saturated hue for dark pages; a muted, darker one for light pages.
    pub fn next_color(&mut self, theme: Theme) -> [f32; 3] {
        let hue = self.rng.gen::<f32>();
        match theme {
            Theme::Dark => scale(hsv_to_rgb(hue, 1.0, 1.0), 0.15),
            Theme::Light => scale(hsv_to_rgb(hue, 0.55, 0.8), 0.2),
        }
    }

    pub fn unit(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }

    /// Centred random value in `[-0.5, 0.5) * span`.
    pub fn centred(&mut self, span: f32) -> f32 {
        (self.rng.gen::<f32>() - 0.5) * span
    }
}

fn scale(rgb: [f32; 3], factor: f32) -> [f32; 3] {
    rgb.map(|c| c * factor)
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let h = h.rem_euclid(1.0) * 6.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    match sector as u32 % 6 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_hues_convert_exactly() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]);
        assert_eq!(hsv_to_rgb(0.5, 1.0, 1.0), [0.0, 1.0, 1.0]);
        assert_eq!(hsv_to_rgb(0.5, 0.0, 0.5), [0.5, 0.5, 0.5]);
    }

    #[test]
    fn seeded_palettes_repeat() {
        let mut a = Palette::seeded(42);
        let mut b = Palette::seeded(42);
        for _ in 0..8 {
            assert_eq!(a.next_color(Theme::Dark), b.next_color(Theme::Dark));
        }
    }

    #[test]
    fn colours_stay_dim() {
        let mut palette = Palette::seeded(3);
        for theme in [Theme::Dark, Theme::Light] {
            for _ in 0..32 {
                let color = palette.next_color(theme);
                assert!(color.iter().all(|c| (0.0..=0.2).contains(c)), "{color:?}");
            }
        }
    }
}
