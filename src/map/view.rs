//! Screen/world coordinate transform for the fleet map.
//!
//! World space is the simulation's native plane with +Y up. Screen space is
//! device pixels with the origin at the top-left corner and +Y down, so the
//! transform is a uniform scale, a translation and a Y flip:
//!
//! `screen = (x * scale + tx, -y * scale + ty)`

use bevy::math::DVec2;

/// Smallest world extent used when fitting, so a single waypoint or a
/// perfectly flat route never divides by zero.
const MIN_WORLD_EXTENT: f64 = 1.0;

/// Axis-aligned world bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    /// A zero-sized box at `p`.
    pub fn at(p: DVec2) -> Self {
        Self {
            min_x: p.x,
            max_x: p.x,
            min_y: p.y,
            max_y: p.y,
        }
    }

    /// Bounding box of `points`, or `None` when the iterator is empty or
    /// only yields non-finite points.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = DVec2>,
    {
        let mut bounds: Option<Bounds> = None;
        for p in points.into_iter().filter(|p| p.is_finite()) {
            match bounds.as_mut() {
                Some(b) => {
                    b.include(p);
                }
                None => bounds = Some(Bounds::at(p)),
            }
        }
        bounds
    }

    /// Grow the box to contain `p`. Returns true when the box changed.
    pub fn include(&mut self, p: DVec2) -> bool {
        if !p.is_finite() {
            return false;
        }
        let before = *self;
        self.min_x = self.min_x.min(p.x);
        self.max_x = self.max_x.max(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_y = self.max_y.max(p.y);
        *self != before
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

impl Default for Bounds {
    /// Unit box around the origin, used before any waypoint is known.
    fn default() -> Self {
        Self {
            min_x: -0.5,
            max_x: 0.5,
            min_y: -0.5,
            max_y: 0.5,
        }
    }
}

/// Camera state: scale, translation, padding, world bounds and the
/// lazy-fit dirty flag.
#[derive(Clone, Debug)]
pub struct View {
    /// Screen pixels per world unit.
    pub scale: f64,
    pub tx: f64,
    pub ty: f64,
    /// Padding in pixels kept around the bounds when fitting.
    pub pad: f64,
    pub bounds: Bounds,
    pub needs_fit: bool,
    /// Scale produced by the most recent fit.
    pub base_scale: Option<f64>,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl View {
    pub fn new(bounds: Bounds, pad: f64, min_scale: f64, max_scale: f64) -> Self {
        Self {
            scale: 1.0,
            tx: 0.0,
            ty: 0.0,
            pad,
            bounds,
            needs_fit: true,
            base_scale: None,
            min_scale,
            max_scale,
        }
    }

    /// View over the bounding box of `points`; an empty set falls back to a
    /// unit box around the origin.
    pub fn from_points<I>(points: I, pad: f64, min_scale: f64, max_scale: f64) -> Self
    where
        I: IntoIterator<Item = DVec2>,
    {
        let bounds = Bounds::from_points(points).unwrap_or_default();
        Self::new(bounds, pad, min_scale, max_scale)
    }

    /// Fit scale and translation so the padded bounds fill the viewport.
    pub fn fit_to_bounds(&mut self, viewport_w: f64, viewport_h: f64) {
        let world_w = self.bounds.width().max(MIN_WORLD_EXTENT);
        let world_h = self.bounds.height().max(MIN_WORLD_EXTENT);
        let usable_w = (viewport_w - 2.0 * self.pad).max(1.0);
        let usable_h = (viewport_h - 2.0 * self.pad).max(1.0);

        let scale = (usable_w / world_w).min(usable_h / world_h);
        self.scale = scale;
        self.tx = self.pad - self.bounds.min_x * scale;
        self.ty = self.pad + self.bounds.max_y * scale;
        self.base_scale = Some(scale);
        self.needs_fit = false;
    }

    /// Fit only if the view has been marked dirty. Returns true when a fit ran.
    pub fn ensure_fit(&mut self, viewport_w: f64, viewport_h: f64) -> bool {
        if !self.needs_fit {
            return false;
        }
        self.fit_to_bounds(viewport_w, viewport_h);
        true
    }

    pub fn world_to_screen(&self, p: DVec2) -> DVec2 {
        DVec2::new(p.x * self.scale + self.tx, -p.y * self.scale + self.ty)
    }

    pub fn screen_to_world(&self, s: DVec2) -> DVec2 {
        DVec2::new((s.x - self.tx) / self.scale, -(s.y - self.ty) / self.scale)
    }

    /// Multiply the scale by `factor`, keeping the world point under `anchor`
    /// (screen pixels) fixed on screen.
    pub fn zoom_at(&mut self, anchor: DVec2, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let world = self.screen_to_world(anchor);
        self.scale = (self.scale * factor).clamp(self.min_scale, self.max_scale);
        self.tx = anchor.x - world.x * self.scale;
        self.ty = anchor.y + world.y * self.scale;
    }

    /// Translate by a screen-space delta in pixels.
    pub fn pan_by(&mut self, delta: DVec2) {
        self.tx += delta.x;
        self.ty += delta.y;
    }

    /// Widen the world bounds to include `p`. Returns true when they grew.
    pub fn include(&mut self, p: DVec2) -> bool {
        self.bounds.include(p)
    }

    /// Replace the bounds with the box around `points` and mark the view dirty.
    /// An empty set keeps the current bounds.
    pub fn reset_bounds<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = DVec2>,
    {
        if let Some(bounds) = Bounds::from_points(points) {
            self.bounds = bounds;
        }
        self.needs_fit = true;
    }

    /// Current scale relative to the last fit (1.0 when freshly fitted).
    pub fn zoom_ratio(&self) -> f64 {
        match self.base_scale {
            Some(base) if base > 0.0 => self.scale / base,
            _ => 1.0,
        }
    }
}
