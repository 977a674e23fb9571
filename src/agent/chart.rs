//! Pure SVG line-chart rendering for historical prices.

use crate::market::PricePoint;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 360.0;
const MARGIN: f64 = 40.0;

/// Render a price series as a standalone SVG document. Pure function: no IO,
/// no dependency on where the points came from.
pub fn render_line_chart(title: &str, points: &[PricePoint]) -> String {
    let mut svg = String::with_capacity(1024);
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 {WIDTH} {HEIGHT}\">"
    ));
    svg.push_str(&format!(
        "<text x=\"{}\" y=\"24\" text-anchor=\"middle\" font-size=\"16\">{}</text>",
        WIDTH / 2.0,
        escape(title)
    ));

    if points.len() < 2 {
        svg.push_str(&format!(
            "<text x=\"{}\" y=\"{}\" text-anchor=\"middle\">no data</text>",
            WIDTH / 2.0,
            HEIGHT / 2.0
        ));
        svg.push_str("</svg>");
        return svg;
    }

    let (t_min, t_max) = min_max(points.iter().map(|p| p.time as f64));
    let (v_min, v_max) = min_max(points.iter().map(|p| p.value));
    let t_span = (t_max - t_min).max(1.0);
    let v_span = (v_max - v_min).max(f64::EPSILON);

    let coords: Vec<String> = points
        .iter()
        .map(|p| {
            let x = MARGIN + (p.time as f64 - t_min) / t_span * (WIDTH - 2.0 * MARGIN);
            let y = HEIGHT - MARGIN - (p.value - v_min) / v_span * (HEIGHT - 2.0 * MARGIN);
            format!("{x:.1},{y:.1}")
        })
        .collect();

    svg.push_str(&format!(
        "<polyline fill=\"none\" stroke=\"#2563eb\" stroke-width=\"2\" points=\"{}\"/>",
        coords.join(" ")
    ));
    svg.push_str(&format!(
        "<text x=\"{MARGIN}\" y=\"{}\" font-size=\"12\">{v_min:.6}</text>",
        HEIGHT - MARGIN / 2.0
    ));
    svg.push_str(&format!(
        "<text x=\"{MARGIN}\" y=\"{}\" font-size=\"12\">{v_max:.6}</text>",
        MARGIN / 2.0 + 8.0
    ));
    svg.push_str("</svg>");
    svg
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
