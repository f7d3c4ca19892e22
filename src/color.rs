use std::collections::BTreeMap;

use eframe::egui::Color32;
use palette::{FromColor, Hsl, Srgb};
use segment_dash::data::model::CellValue;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    let step = 360.0 / n as f32;
    (0..n).map(|i| hsl(i as f32 * step, 0.65, 0.55)).collect()
}

/// Sequential shades of one hue, light to dark, for ordered buckets.
pub fn sequential_palette(n: usize, hue: f32) -> Vec<Color32> {
    (0..n)
        .map(|i| {
            let t = if n > 1 { i as f32 / (n - 1) as f32 } else { 0.0 };
            hsl(hue, 0.6, 0.75 - 0.4 * t)
        })
        .collect()
}

fn hsl(hue: f32, saturation: f32, lightness: f32) -> Color32 {
    let rgb: Srgb<u8> = Srgb::<f32>::from_color(Hsl::new(hue, saturation, lightness)).into_format();
    Color32::from_rgb(rgb.red, rgb.green, rgb.blue)
}

// ---------------------------------------------------------------------------
// Color mapping: category value → Color32
// ---------------------------------------------------------------------------

/// Maps the distinct values of a column to stable colours, so a sector keeps
/// its colour whatever the current filter selection.
#[derive(Debug, Clone)]
pub struct ColorMap {
    mapping: BTreeMap<CellValue, Color32>,
    default_color: Color32,
}

impl ColorMap {
    pub fn new(values: &[CellValue]) -> Self {
        let palette = generate_palette(values.len());
        ColorMap {
            mapping: values.iter().cloned().zip(palette).collect(),
            default_color: Color32::GRAY,
        }
    }

    pub fn color_for(&self, value: &CellValue) -> Color32 {
        self.mapping
            .get(value)
            .copied()
            .unwrap_or(self.default_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_has_requested_size() {
        assert_eq!(generate_palette(7).len(), 7);
        assert!(generate_palette(0).is_empty());
        assert_eq!(sequential_palette(6, 210.0).len(), 6);
    }

    #[test]
    fn unknown_value_gets_default_colour() {
        let map = ColorMap::new(&[CellValue::String("Varejo".into())]);
        assert_eq!(map.color_for(&CellValue::Null), Color32::GRAY);
        assert_ne!(map.color_for(&CellValue::String("Varejo".into())), Color32::GRAY);
    }
}
