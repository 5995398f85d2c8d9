//! Static starfield background, laid out in screen space.

use bevy::math::Vec2;

const STARS_PER_MEGAPIXEL: f32 = 240.0;
const SEED: u64 = 42;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Star {
    /// Screen position in device pixels.
    pub position: Vec2,
    pub radius: f32,
    pub brightness: f32,
}

#[derive(Clone, Debug, Default)]
pub struct Starfield {
    stars: Vec<Star>,
    size: (u32, u32),
}

impl Starfield {
    /// Regenerate for a new surface size. Returns true when the layout changed.
    pub fn resize(&mut self, width_px: u32, height_px: u32) -> bool {
        if self.size == (width_px, height_px) {
            return false;
        }
        self.size = (width_px, height_px);
        self.stars = generate(width_px, height_px);
        true
    }

    pub fn stars(&self) -> &[Star] {
        &self.stars
    }
}

fn generate(width_px: u32, height_px: u32) -> Vec<Star> {
    let mut rng_state = SEED;
    let mut next_random = || -> f32 {
        rng_state = rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let value = (rng_state >> 33) as u32;
        (value as f32) / ((1u64 << 31) as f32)
    };

    let w = width_px as f32;
    let h = height_px as f32;
    let count = ((w * h) / 1_000_000.0 * STARS_PER_MEGAPIXEL).round() as usize;

    (0..count)
        .map(|_| {
            let position = Vec2::new(next_random() * w, next_random() * h);
            // mostly faint pinpricks, a few brighter stars
            let roll = next_random();
            let (radius, brightness) = if roll < 0.85 {
                (0.6 + next_random() * 0.6, 0.25 + next_random() * 0.3)
            } else {
                (1.2 + next_random() * 0.8, 0.6 + next_random() * 0.4)
            };
            Star {
                position,
                radius,
                brightness,
            }
        })
        .collect()
}
