//! Transient particle wake left behind moving ship markers.

use bevy::math::DVec2;
use std::collections::VecDeque;

pub const DEFAULT_PARTICLE_LIFETIME_MS: i64 = 700;
const MAX_PARTICLES: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    /// World position where the particle was emitted.
    pub position: DVec2,
    pub born_ms: i64,
}

impl Particle {
    /// Remaining opacity in `[0, 1]`, fading linearly over `lifetime_ms`.
    pub fn alpha(&self, now_ms: i64, lifetime_ms: i64) -> f32 {
        if lifetime_ms <= 0 {
            return 0.0;
        }
        let age = (now_ms - self.born_ms).max(0) as f32;
        (1.0 - age / lifetime_ms as f32).clamp(0.0, 1.0)
    }
}

/// Particles ordered oldest first, so decay only ever pops from the front.
#[derive(Clone, Debug)]
pub struct ParticleField {
    particles: VecDeque<Particle>,
    lifetime_ms: i64,
}

impl ParticleField {
    pub fn new(lifetime_ms: i64) -> Self {
        Self {
            particles: VecDeque::new(),
            lifetime_ms: lifetime_ms.max(0),
        }
    }

    pub fn lifetime_ms(&self) -> i64 {
        self.lifetime_ms
    }

    pub fn emit(&mut self, position: DVec2, now_ms: i64) {
        if self.lifetime_ms == 0 || !position.is_finite() {
            return;
        }
        self.particles.push_back(Particle {
            position,
            born_ms: now_ms,
        });
        while self.particles.len() > MAX_PARTICLES {
            self.particles.pop_front();
        }
    }

    /// Drop every particle whose lifetime has run out.
    pub fn decay(&mut self, now_ms: i64) {
        while let Some(front) = self.particles.front() {
            if now_ms - front.born_ms >= self.lifetime_ms {
                self.particles.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }
}

impl Default for ParticleField {
    fn default() -> Self {
        Self::new(DEFAULT_PARTICLE_LIFETIME_MS)
    }
}
