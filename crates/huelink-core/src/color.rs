// ── RGB <-> CIE xy conversion ──
//
// Hue lamps take color as a CIE 1931 xy point restricted to the lamp's
// gamut triangle. Conversion uses the Wide RGB D65 matrices published for
// the Hue API; points outside the gamut snap to the closest edge point.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

/// A CIE 1931 chromaticity coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XyPoint {
    pub x: f64,
    pub y: f64,
}

impl XyPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }

    fn cross(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    fn distance(self, other: Self) -> f64 {
        let d = self.sub(other);
        d.x.hypot(d.y)
    }
}

/// Triangle of colors a lamp can reproduce: red, green and blue corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gamut {
    pub red: XyPoint,
    pub green: XyPoint,
    pub blue: XyPoint,
}

impl Gamut {
    pub const A: Self = Self {
        red: XyPoint::new(0.704, 0.296),
        green: XyPoint::new(0.2151, 0.7106),
        blue: XyPoint::new(0.138, 0.08),
    };

    pub const B: Self = Self {
        red: XyPoint::new(0.675, 0.322),
        green: XyPoint::new(0.4091, 0.518),
        blue: XyPoint::new(0.167, 0.04),
    };

    pub const C: Self = Self {
        red: XyPoint::new(0.692, 0.308),
        green: XyPoint::new(0.17, 0.7),
        blue: XyPoint::new(0.153, 0.048),
    };

    /// Gamut for a known model id, `None` for models not in the table.
    pub fn for_model(model_id: &str) -> Option<Self> {
        match model_id {
            "LCT001" | "LCT007" | "LCT002" | "LCT003" | "LLM001" => Some(Self::B),
            "LCT010" | "LCT014" | "LCT015" | "LCT016" | "LCT011" | "LLC020" | "LST002"
            | "LCT012" | "LCT024" => Some(Self::C),
            "LLC010" | "LLC006" | "LST001" | "LLC011" | "LLC012" | "LLC005" | "LLC007"
            | "LLC014" => Some(Self::A),
            _ => None,
        }
    }

    pub fn contains(&self, p: XyPoint) -> bool {
        let v1 = self.green.sub(self.red);
        let v2 = self.blue.sub(self.red);
        let q = p.sub(self.red);
        let denom = v1.cross(v2);
        let s = q.cross(v2) / denom;
        let t = v1.cross(q) / denom;
        s >= 0.0 && t >= 0.0 && s + t <= 1.0
    }

    /// Closest point on the triangle's edges.
    pub fn closest_point(&self, p: XyPoint) -> XyPoint {
        let candidates = [
            closest_on_segment(self.red, self.green, p),
            closest_on_segment(self.blue, self.red, p),
            closest_on_segment(self.green, self.blue, p),
        ];
        let mut best = candidates[0];
        for c in &candidates[1..] {
            if c.distance(p) < best.distance(p) {
                best = *c;
            }
        }
        best
    }

    fn clamp(&self, p: XyPoint) -> XyPoint {
        if self.contains(p) {
            p
        } else {
            self.closest_point(p)
        }
    }
}

fn closest_on_segment(a: XyPoint, b: XyPoint, p: XyPoint) -> XyPoint {
    let ap = p.sub(a);
    let ab = b.sub(a);
    let t = ((ap.x * ab.x + ap.y * ab.y) / (ab.x * ab.x + ab.y * ab.y)).clamp(0.0, 1.0);
    XyPoint::new(a.x + ab.x * t, a.y + ab.y * t)
}

// ── Converter ────────────────────────────────────────────────────────

/// Converts between 8-bit sRGB and xy within one gamut.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorConverter {
    gamut: Gamut,
}

impl ColorConverter {
    pub fn new(gamut: Gamut) -> Self {
        Self { gamut }
    }

    pub fn gamut(&self) -> Gamut {
        self.gamut
    }

    /// `None` for black, which has no chromaticity.
    pub fn rgb_to_xy(&self, red: u8, green: u8, blue: u8) -> Option<XyPoint> {
        let [r, g, b] = [red, green, blue].map(|c| linearize(f64::from(c) / 255.0));

        let x = r * 0.664_511 + g * 0.154_324 + b * 0.162_028;
        let y = r * 0.283_881 + g * 0.668_433 + b * 0.047_685;
        let z = r * 0.000_088 + g * 0.072_310 + b * 0.986_039;
        let sum = x + y + z;
        if sum <= 0.0 {
            return None;
        }

        Some(self.gamut.clamp(XyPoint::new(x / sum, y / sum)))
    }

    /// Full-brightness RGB for an xy point.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn xy_to_rgb(&self, x: f64, y: f64) -> (u8, u8, u8) {
        let p = self.gamut.clamp(XyPoint::new(x, y));

        let big_y = 1.0;
        let big_x = (big_y / p.y) * p.x;
        let big_z = (big_y / p.y) * (1.0 - p.x - p.y);

        let r = big_x * 1.656_492 - big_y * 0.354_851 - big_z * 0.255_038;
        let g = -big_x * 0.707_196 + big_y * 1.655_397 + big_z * 0.036_152;
        let b = big_x * 0.051_713 - big_y * 0.121_364 + big_z * 1.011_530;

        let mut rgb = [r, g, b].map(|c| gamma(c).max(0.0));
        let max = rgb.iter().copied().fold(0.0_f64, f64::max);
        if max > 1.0 {
            rgb = rgb.map(|c| c / max);
        }

        let [r, g, b] = rgb.map(|c| (c * 255.0) as u8);
        (r, g, b)
    }
}

fn linearize(c: f64) -> f64 {
    if c > 0.040_45 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

fn gamma(c: f64) -> f64 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

// ── Per-model cache ──────────────────────────────────────────────────

/// Converter per model id, built on first use.
#[derive(Debug, Default)]
pub struct ConverterCache {
    converters: DashMap<String, Arc<ColorConverter>>,
}

impl ConverterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model_id: &str) -> Arc<ColorConverter> {
        if let Some(c) = self.converters.get(model_id) {
            return Arc::clone(c.value());
        }

        let gamut = Gamut::for_model(model_id).unwrap_or_else(|| {
            warn!(model_id, "model not in gamut table, defaulting to gamut C");
            Gamut::C
        });
        let converter = Arc::new(ColorConverter::new(gamut));
        Arc::clone(
            self.converters
                .entry(model_id.to_owned())
                .or_insert(converter)
                .value(),
        )
    }
}
