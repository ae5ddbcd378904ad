//! PNG line chart of a monthly series.

use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ReportError;
use crate::timeseries::TimeSeries;

pub const WIDTH: u32 = 960;
pub const HEIGHT: u32 = 480;
const MARGIN: u32 = 48;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const LINE: Rgb<u8> = Rgb([0, 123, 255]);
const MARKER: Rgb<u8> = Rgb([0, 64, 160]);

pub fn chart_file_name(place: &str, year: i32) -> String {
    format!("GeoSense_Chart_{}_{}.png", crate::analysis::slug(place), year)
}

/// Pixel position of each point. Months run along x, values are scaled
/// to the series range along y (top is the maximum).
pub fn plot_points(series: &TimeSeries, width: u32, height: u32) -> Vec<(u32, u32)> {
    let (lo, hi) = series
        .points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| {
            (lo.min(*v), hi.max(*v))
        });
    let span = if hi > lo { hi - lo } else { 1.0 };
    let plot_w = f64::from(width - 2 * MARGIN);
    let plot_h = f64::from(height - 2 * MARGIN);

    series
        .points
        .iter()
        .map(|(month, value)| {
            let x = MARGIN as f64 + plot_w * f64::from(month - 1) / 11.0;
            let y = if hi > lo {
                MARGIN as f64 + plot_h * (1.0 - (value - lo) / span)
            } else {
                MARGIN as f64 + plot_h / 2.0
            };
            (x.round() as u32, y.round() as u32)
        })
        .collect()
}

fn draw_line(img: &mut RgbImage, from: (u32, u32), to: (u32, u32), color: Rgb<u8>) {
    let (x0, y0) = (from.0 as f64, from.1 as f64);
    let (x1, y1) = (to.0 as f64, to.1 as f64);
    let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0) as u32;
    for i in 0..=steps {
        let t = f64::from(i) / f64::from(steps);
        let x = (x0 + (x1 - x0) * t).round() as u32;
        let y = (y0 + (y1 - y0) * t).round() as u32;
        for (dx, dy) in [(0, 0), (1, 0), (0, 1)] {
            if x + dx < img.width() && y + dy < img.height() {
                img.put_pixel(x + dx, y + dy, color);
            }
        }
    }
}

fn draw_marker(img: &mut RgbImage, at: (u32, u32)) {
    for x in at.0.saturating_sub(3)..=at.0 + 3 {
        for y in at.1.saturating_sub(3)..=at.1 + 3 {
            if x < img.width() && y < img.height() {
                img.put_pixel(x, y, MARKER);
            }
        }
    }
}

pub fn render(series: &TimeSeries) -> RgbImage {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
    let (left, right) = (MARGIN, WIDTH - MARGIN);
    let (top, bottom) = (MARGIN, HEIGHT - MARGIN);

    for month in 0..12 {
        let x = left + (right - left) * month / 11;
        draw_line(&mut img, (x, top), (x, bottom), GRID);
    }
    for row in 0..=4 {
        let y = top + (bottom - top) * row / 4;
        draw_line(&mut img, (left, y), (right, y), GRID);
    }
    draw_line(&mut img, (left, bottom), (right, bottom), AXIS);
    draw_line(&mut img, (left, top), (left, bottom), AXIS);

    let points = plot_points(series, WIDTH, HEIGHT);
    for pair in points.windows(2) {
        draw_line(&mut img, pair[0], pair[1], LINE);
    }
    for point in &points {
        draw_marker(&mut img, *point);
    }
    img
}

/// Renders `series` into `dir` and returns the written path.
pub fn write_chart(series: &TimeSeries, place: &str, dir: &Path) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(chart_file_name(place, series.year));
    render(series).save(&path)?;
    info!(
        action = "write",
        component = "chart",
        path = %path.display(),
        points = series.points.len(),
        "Chart written"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: Vec<(u32, f64)>) -> TimeSeries {
        TimeSeries {
            label: "Surface Temperature (K)".to_string(),
            year: 2023,
            points,
        }
    }

    #[test]
    fn points_span_the_plot_area() {
        let s = series(vec![(1, 290.0), (7, 310.0), (12, 300.0)]);
        let points = plot_points(&s, WIDTH, HEIGHT);
        assert_eq!(points[0], (MARGIN, HEIGHT - MARGIN));
        assert_eq!(points[1].1, MARGIN);
        assert_eq!(points[2], (WIDTH - MARGIN, HEIGHT / 2));
    }

    #[test]
    fn flat_series_sits_mid_height() {
        let s = series(vec![(2, 0.4), (3, 0.4)]);
        for (_, y) in plot_points(&s, WIDTH, HEIGHT) {
            assert_eq!(y, HEIGHT / 2);
        }
    }

    #[test]
    fn chart_is_written_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let s = series(vec![(1, 0.1), (2, 0.3), (5, 0.2)]);
        let path = write_chart(&s, "Ma'an", dir.path()).unwrap();

        assert_eq!(path.file_name().unwrap(), "GeoSense_Chart_Maan_2023.png");
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (WIDTH, HEIGHT));
        let first = plot_points(&s, WIDTH, HEIGHT)[0];
        assert_eq!(*img.get_pixel(first.0, first.1), MARKER);
    }
}
