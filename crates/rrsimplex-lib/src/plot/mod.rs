use serde::{Deserialize, Serialize};

use crate::metrics::triplets::SimplexPoint;

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

/// Straight segment in canvas pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub from: [f64; 2],
    pub to: [f64; 2],
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    pub at: [f64; 2],
    pub size: f64,
}

/// Ternary (simplex) scatter plot laid out in canvas pixel coordinates,
/// origin top-left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimplexFigure {
    pub title: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Corners A (top, first component), B (bottom-left), C (bottom-right).
    pub vertices: [[f64; 2]; 3],
    pub outline: Style,
    pub grid: Vec<Segment>,
    pub ticks: Vec<Label>,
    pub points: Vec<[f64; 2]>,
    pub point_radius: f64,
    pub point_color: Color,
}

#[derive(Debug, Clone, Copy)]
pub struct SimplexLayout {
    pub width: u32,
    pub height: u32,
    pub margin: f64,
    /// Grid lines every `1 / divisions` of each axis.
    pub divisions: usize,
    pub max_points: usize,
}

impl Default for SimplexLayout {
    fn default() -> Self {
        Self {
            width: 500,
            height: 450,
            margin: 60.0,
            divisions: 10,
            max_points: 5000,
        }
    }
}

fn lerp(p1: [f64; 2], p2: [f64; 2], t: f64) -> [f64; 2] {
    [
        (1.0 - t) * p1[0] + t * p2[0],
        (1.0 - t) * p1[1] + t * p2[1],
    ]
}

impl SimplexFigure {
    pub fn new(title: impl Into<Option<String>>, layout: &SimplexLayout) -> Self {
        let (w, h, m) = (layout.width as f64, layout.height as f64, layout.margin);
        let a = [w / 2.0, m];
        let b = [m, h - m];
        let c = [w - m, h - m];

        let grid_style = Style {
            width: 1.0,
            dash: Some([4.0, 4.0]),
            color: Color(0xCCCCCC),
        };
        let mut grid = Vec::new();
        let mut ticks = Vec::new();
        for i in 1..layout.divisions {
            let t = i as f64 / layout.divisions as f64;
            for (from, to) in [
                (lerp(a, b, t), lerp(a, c, t)),
                (lerp(b, a, t), lerp(b, c, t)),
                (lerp(c, a, t), lerp(c, b, t)),
            ] {
                grid.push(Segment {
                    from,
                    to,
                    style: grid_style.clone(),
                });
            }
            let text = format!("{t:.1}");
            let ab = lerp(a, b, t);
            let bc = lerp(b, c, t);
            let ca = lerp(c, a, t);
            for at in [
                [ab[0] - 18.0, ab[1] - 4.0],
                [bc[0], bc[1] + 15.0],
                [ca[0] + 5.0, ca[1] - 5.0],
            ] {
                ticks.push(Label {
                    text: text.clone(),
                    at,
                    size: 10.0,
                });
            }
        }

        Self {
            title: title.into(),
            width: layout.width,
            height: layout.height,
            vertices: [a, b, c],
            outline: Style {
                width: 1.0,
                dash: None,
                color: Color(0x000000),
            },
            grid,
            ticks,
            points: Vec::new(),
            point_radius: 3.0,
            point_color: Color(0x4682B4),
        }
    }

    /// Barycentric → canvas coordinates.
    pub fn project(&self, p: &SimplexPoint) -> [f64; 2] {
        let [w1, w2, w3] = p.components();
        let [a, b, c] = self.vertices;
        [
            w1 * a[0] + w2 * b[0] + w3 * c[0],
            w1 * a[1] + w2 * b[1] + w3 * c[1],
        ]
    }
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| (i as f64 * bucket_size).floor() as usize)
        .take_while(|&start| start < points.len())
        .map(|start| points[start])
        .collect()
}

pub fn figure_from_simplex(
    title: &str,
    points: &[SimplexPoint],
    layout: &SimplexLayout,
) -> SimplexFigure {
    let mut fig = SimplexFigure::new(Some(title.to_string()), layout);
    let projected: Vec<[f64; 2]> = points.iter().map(|p| fig.project(p)).collect();
    fig.points = decimate_points(&projected, layout.max_points);
    fig
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 2], b: [f64; 2]) -> bool {
        (a[0] - b[0]).abs() < 1e-9 && (a[1] - b[1]).abs() < 1e-9
    }

    #[test]
    fn pure_components_map_to_vertices() {
        let fig = SimplexFigure::new(None, &SimplexLayout::default());
        assert!(close(fig.project(&SimplexPoint([1.0, 0.0, 0.0])), [250.0, 60.0]));
        assert!(close(fig.project(&SimplexPoint([0.0, 1.0, 0.0])), [60.0, 390.0]));
        assert!(close(fig.project(&SimplexPoint([0.0, 0.0, 1.0])), [440.0, 390.0]));
    }

    #[test]
    fn centroid_is_inside_the_triangle() {
        let fig = SimplexFigure::new(None, &SimplexLayout::default());
        let p = fig.project(&SimplexPoint([1.0 / 3.0; 3]));
        assert!(close(p, [250.0, 280.0]));
    }

    #[test]
    fn grid_has_three_lines_per_division() {
        let fig = figure_from_simplex("rr", &[], &SimplexLayout::default());
        assert_eq!(fig.grid.len(), 27);
        assert_eq!(fig.ticks.len(), 27);
        assert_eq!(fig.ticks[0].text, "0.1");
        assert!(fig.points.is_empty());
    }

    #[test]
    fn large_point_sets_are_decimated() {
        let layout = SimplexLayout {
            max_points: 10,
            ..Default::default()
        };
        let points = vec![SimplexPoint([0.2, 0.3, 0.5]); 95];
        let fig = figure_from_simplex("rr", &points, &layout);
        assert_eq!(fig.points.len(), 10);
    }

    #[test]
    fn color_splits_into_channels() {
        assert_eq!(Color(0x4682B4).rgb(), (0x46, 0x82, 0xB4));
    }
}
