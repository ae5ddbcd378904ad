//! PDF report built from the cached run.
//!
//! [`layout`] decides what goes on which page and has no side effects;
//! [`render`] draws that layout with `printpdf`.

use chrono::{Local, NaiveDate};
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfLayerReference, Point, Rgb,
};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::analysis::slug;
use crate::error::ReportError;
use crate::session::CachedRun;

const TITLE: &str = "GeoSense-Jordan: Scientific Report";
const PROJECT: &str = "Project Title: Advanced Satellite Observation Dashboard";
const FOOTER: &str = "Generated by: GeoSense-Jordan System";
const METHODOLOGY: &str = "This analysis utilizes multi-spectral and radar satellite imagery \
processed via Google Earth Engine. Data sources include Sentinel-2 (Optical), Sentinel-1 (SAR), \
Landsat 8-9, MODIS, Sentinel-5P, NASA FIRMS, GPM IMERG and ALOS/SRTM digital elevation models. \
The processing involves cloud masking, atmospheric correction, zonal statistics and geospatial \
index calculation.";

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 20.0;
const LINE_CHARS: usize = 95;
const ROW_H: f32 = 7.0;
const VALUE_CHARS: usize = 45;
const VALUE_LINE_H: f32 = 5.0;
const FIRST_PAGE_ROWS: usize = 12;
const PAGE_ROWS: usize = 30;
const CHART_DPI: f32 = 150.0;

/// Everything the report shows, already split into pages.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    pub file_name: String,
    pub metadata: Vec<(String, String)>,
    pub methodology: Vec<String>,
    pub summary: Vec<String>,
    /// Metric rows per page, split by drawn height; never empty.
    pub metric_pages: Vec<Vec<(String, String)>>,
    pub chart: Option<PathBuf>,
}

impl ReportLayout {
    pub fn page_count(&self) -> usize {
        self.metric_pages.len() + usize::from(self.chart.is_some())
    }

    pub fn metric_rows(&self) -> impl Iterator<Item = &(String, String)> {
        self.metric_pages.iter().flatten()
    }
}

pub fn report_file_name(place: &str, year: i32) -> String {
    format!("GeoSense_Report_{}_{}.pdf", slug(place), year)
}

/// Greedy word wrap at `width` characters. Longer words are cut.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(width.max(1)) {
            if !line.is_empty() && line.chars().count() + 1 + piece.len() > width {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.extend(piece);
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Builtin PDF fonts only cover Latin-1; units are spelled out instead.
pub fn pdf_safe(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '°' => out.push_str("deg"),
            '²' | '₂' => out.push('2'),
            '³' | '₃' => out.push('3'),
            '–' | '—' => out.push('-'),
            '‘' | '’' => out.push('\''),
            c if c.is_ascii() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

pub fn layout(run: &CachedRun, today: NaiveDate) -> ReportLayout {
    let request = &run.request;
    let place = &request.region.name;
    let metadata = vec![
        ("Governorate".to_string(), place.clone()),
        (
            "Observation Period".to_string(),
            format!("{}/{}", request.period.month_name(), request.period.year()),
        ),
        ("Analysis Module".to_string(), request.module.to_string()),
        ("Region Match".to_string(), request.region.matched.to_string()),
        ("Date of Report".to_string(), today.format("%Y-%m-%d").to_string()),
    ];
    let summary = wrap(
        &format!(
            "The analysis for {place} computed the following statistics for {}. \
             Interactive layers are available in the map viewer.",
            request.module
        ),
        LINE_CHARS,
    );

    let mut metric_pages = Vec::new();
    let mut page = Vec::new();
    let mut budget = FIRST_PAGE_ROWS as f32 * ROW_H;
    let mut used = 0.0;
    for (label, value) in run.metrics.iter() {
        let height = row_height(value);
        if !page.is_empty() && used + height > budget {
            metric_pages.push(std::mem::take(&mut page));
            budget = PAGE_ROWS as f32 * ROW_H;
            used = 0.0;
        }
        used += height;
        page.push((label.to_string(), value.to_string()));
    }
    metric_pages.push(page);

    ReportLayout {
        file_name: report_file_name(place, request.period.year()),
        metadata,
        methodology: wrap(METHODOLOGY, LINE_CHARS),
        summary,
        metric_pages,
        chart: run.chart.clone(),
    }
}

/// A value wider than its column wraps onto extra lines within the row.
fn row_height(value: &str) -> f32 {
    let extra = wrap(value, VALUE_CHARS).len().saturating_sub(1);
    ROW_H + extra as f32 * VALUE_LINE_H
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ))
}

fn rule(layer: &PdfLayerReference, y: f32, color: Color, thickness: f32) {
    layer.set_outline_color(color);
    layer.set_outline_thickness(thickness);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN), Mm(y)), false),
            (Point::new(Mm(PAGE_W - MARGIN), Mm(y)), false),
        ],
        is_closed: false,
    });
}

fn text(layer: &PdfLayerReference, s: &str, size: f32, x: f32, y: f32, font: &IndirectFontRef) {
    layer.use_text(pdf_safe(s), size, Mm(x), Mm(y), font);
}

fn header(layer: &PdfLayerReference, fonts: &Fonts) -> f32 {
    layer.set_fill_color(rgb(26, 82, 118));
    text(layer, TITLE, 20.0, MARGIN, PAGE_H - MARGIN - 5.0, &fonts.bold);
    rule(layer, PAGE_H - MARGIN - 10.0, rgb(17, 122, 101), 1.0);
    layer.set_fill_color(rgb(0, 0, 0));
    PAGE_H - MARGIN - 20.0
}

fn footer(layer: &PdfLayerReference, fonts: &Fonts, page: usize, total: usize) {
    rule(layer, 16.0, rgb(200, 200, 200), 0.5);
    layer.set_fill_color(rgb(90, 90, 90));
    text(
        layer,
        &format!("{FOOTER} | Page {page} of {total}"),
        8.0,
        MARGIN,
        10.0,
        &fonts.italic,
    );
    layer.set_fill_color(rgb(0, 0, 0));
}

fn metrics_table(
    layer: &PdfLayerReference,
    fonts: &Fonts,
    rows: &[(String, String)],
    mut y: f32,
) -> f32 {
    text(layer, "Metric", 11.0, MARGIN, y, &fonts.bold);
    text(layer, "Value", 11.0, PAGE_W / 2.0, y, &fonts.bold);
    rule(layer, y - 2.0, rgb(17, 122, 101), 0.75);
    y -= ROW_H;
    for (label, value) in rows {
        text(layer, label, 10.0, MARGIN, y, &fonts.regular);
        let lines = wrap(value, VALUE_CHARS);
        for (i, line) in lines.iter().enumerate() {
            let line_y = y - i as f32 * VALUE_LINE_H;
            text(layer, line, 10.0, PAGE_W / 2.0, line_y, &fonts.regular);
        }
        let last = y - lines.len().saturating_sub(1) as f32 * VALUE_LINE_H;
        rule(layer, last - 2.0, rgb(225, 225, 225), 0.25);
        y = last - ROW_H;
    }
    y
}

fn embed_chart(layer: PdfLayerReference, path: &Path, y: f32) -> Result<(), ReportError> {
    let chart_error =
        |e: &dyn std::fmt::Display| ReportError::ChartImage(path.to_path_buf(), e.to_string());
    let mut reader = BufReader::new(File::open(path)?);
    let decoder = PngDecoder::new(&mut reader).map_err(|e| chart_error(&e))?;
    let image = Image::try_from(decoder).map_err(|e| chart_error(&e))?;
    let height_mm = crate::chart::HEIGHT as f32 / CHART_DPI * 25.4;
    image.add_to_layer(
        layer,
        ImageTransform {
            translate_x: Some(Mm(MARGIN)),
            translate_y: Some(Mm(y - height_mm)),
            dpi: Some(CHART_DPI),
            ..Default::default()
        },
    );
    Ok(())
}

/// Draws `layout` into `out_dir` and returns the written path.
pub fn render(layout: &ReportLayout, out_dir: &Path) -> Result<PathBuf, ReportError> {
    let start_time = Instant::now();
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(&layout.file_name);

    let (doc, first_page, first_layer) =
        PdfDocument::new(TITLE, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold)?,
        italic: doc.add_builtin_font(BuiltinFont::HelveticaOblique)?,
    };
    let total = layout.page_count();

    let layer = doc.get_page(first_page).get_layer(first_layer);
    let mut y = header(&layer, &fonts);
    text(&layer, PROJECT, 12.0, MARGIN, y, &fonts.bold);
    y -= ROW_H + 1.0;
    for (label, value) in &layout.metadata {
        text(&layer, &format!("{label}: {value}"), 11.0, MARGIN, y, &fonts.regular);
        y -= ROW_H;
    }
    y -= 4.0;
    text(&layer, "1. Methodology & Data Sources", 14.0, MARGIN, y, &fonts.bold);
    y -= ROW_H;
    for line in &layout.methodology {
        text(&layer, line, 10.0, MARGIN, y, &fonts.regular);
        y -= 5.5;
    }
    y -= 4.0;
    text(&layer, "2. Results Summary", 14.0, MARGIN, y, &fonts.bold);
    y -= ROW_H;
    for line in &layout.summary {
        text(&layer, line, 10.0, MARGIN, y, &fonts.italic);
        y -= 5.5;
    }
    y -= 3.0;

    let mut page_no = 1;
    for (i, rows) in layout.metric_pages.iter().enumerate() {
        let layer = if i == 0 {
            layer.clone()
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
            let layer = doc.get_page(page).get_layer(layer);
            y = header(&layer, &fonts);
            text(&layer, "2. Results Summary (continued)", 14.0, MARGIN, y, &fonts.bold);
            y -= ROW_H + 3.0;
            layer
        };
        metrics_table(&layer, &fonts, rows, y);
        footer(&layer, &fonts, page_no, total);
        page_no += 1;
    }

    if let Some(chart) = &layout.chart {
        let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let y = header(&layer, &fonts);
        text(&layer, "3. Monthly Time Series", 14.0, MARGIN, y, &fonts.bold);
        footer(&layer, &fonts, page_no, total);
        embed_chart(layer, chart, y - ROW_H)?;
    }

    doc.save(&mut BufWriter::new(File::create(&path)?))?;
    info!(
        action = "write",
        component = "report",
        path = %path.display(),
        pages = total,
        duration_ms = start_time.elapsed().as_millis(),
        "Report written"
    );
    Ok(path)
}

/// Builds the report for the last completed run.
pub fn compile(run: Option<&CachedRun>, out_dir: &Path) -> Result<PathBuf, ReportError> {
    let run = run.ok_or(ReportError::NoCachedRun)?;
    render(&layout(run, Local::now().date_naive()), out_dir)
}
