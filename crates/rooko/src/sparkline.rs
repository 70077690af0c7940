// Unicode sparkline for the rating trend shown in the overlay.

/// Ordered glyph ramp, lowest first.
pub const GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render `values` as one glyph per value, scaled between the series min and
/// max. Returns an empty string when disabled or when there is nothing to
/// draw. A flat series renders entirely as the lowest glyph.
pub fn render(values: &[i64], enabled: bool) -> String {
    if !enabled || values.is_empty() {
        return String::new();
    }

    let lo = values.iter().copied().min().unwrap_or_default();
    let hi = values.iter().copied().max().unwrap_or_default();
    let top = GLYPHS.len() - 1;

    values
        .iter()
        .map(|&v| {
            if lo == hi {
                return GLYPHS[0];
            }
            // Widened so the span of any two i64 values fits.
            let scaled = (i128::from(v) - i128::from(lo)) as f64
                / (i128::from(hi) - i128::from(lo)) as f64
                * top as f64;
            let idx = (scaled.floor() as usize).min(top);
            GLYPHS[idx]
        })
        .collect()
}
