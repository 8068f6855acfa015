//! Audit report rendering.
//!
//! A report is built in two steps: [`build_layout`] turns a request into plain table
//! rows (capped at [`MAX_TABLE_ROWS`] per table), then [`render_pdf`] draws that layout
//! onto A4 pages.

use crate::models::{ReportRequest, ReportRow};
use chrono::{DateTime, TimeZone};
use printpdf::path::PaintMode;
use printpdf::*;
use std::fmt::Display;

pub const MAX_TABLE_ROWS: usize = 20;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 10.0;
const CONTENT_W: f32 = 190.0;
const PT_TO_MM: f32 = 0.3528;

const FLAGGED_HEADERS: [&str; 5] = ["Amount", "Sender Bal", "Risk", "Status", "Reason"];
const FLAGGED_WIDTHS: [f32; 5] = [20.0, 20.0, 18.0, 22.0, 30.0];
const CLEARED_HEADERS: [&str; 5] = ["Amount", "Sender Bal", "Risk", "XGB", "Analyst Notes"];
const CLEARED_WIDTHS: [f32; 5] = [20.0, 20.0, 18.0, 18.0, 34.0];

const RED: (u8, u8, u8) = (220, 20, 20);
const ORANGE: (u8, u8, u8) = (245, 130, 0);
const BLACK: (u8, u8, u8) = (0, 0, 0);
const WHITE: (u8, u8, u8) = (255, 255, 255);
const GRAY: (u8, u8, u8) = (128, 128, 128);

/// Everything printed on a report, already formatted
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    pub report_id: String,
    pub date_line: String,
    pub summary_line: String,
    pub flagged: Vec<[String; 5]>,
    pub cleared: Vec<[String; 5]>,
}

impl ReportLayout {
    pub fn file_name(&self) -> String {
        format!("FraudSentry_Report_{}.pdf", self.report_id)
    }
}

pub fn build_layout<Tz>(req: &ReportRequest, now: &DateTime<Tz>) -> ReportLayout
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let confirmed = req.confirmed();
    let file: String = req.filename.chars().take(25).collect();

    let flagged = confirmed
        .iter()
        .take(MAX_TABLE_ROWS)
        .map(|row| {
            let status = if row.rf_prediction == 1 {
                "HIGH PRIORITY"
            } else {
                "WARNING"
            };
            [
                format!("${:.0}", row.amount),
                format!("${:.0}", row.old_balance_orig),
                format!("{:.2}", row.xgb_risk_score),
                status.to_string(),
                fraud_reason(row).chars().take(15).collect::<String>(),
            ]
        })
        .collect();

    let cleared = req
        .false_alarms
        .iter()
        .take(MAX_TABLE_ROWS)
        .map(|row| {
            [
                format!("${:.0}", row.amount),
                format!("${:.0}", row.old_balance_orig),
                format!("{:.2}", row.xgb_risk_score),
                if row.xgb_prediction == 1 { "Yes" } else { "No" }.to_string(),
                "Reviewed & Cleared".to_string(),
            ]
        })
        .collect();

    ReportLayout {
        report_id: now.format("%Y%m%d_%H%M%S").to_string(),
        date_line: now.format("%A, %d %b %Y").to_string(),
        summary_line: format!(
            "  Confirmed Frauds: {}  |  Total Scanned: {}  |  File: {}",
            confirmed.len(),
            req.total,
            file
        ),
        flagged,
        cleared,
    }
}

/// Short label for why a confirmed row looks fraudulent; first matching pattern wins.
pub fn fraud_reason(row: &ReportRow) -> &'static str {
    if row.amount > 50_000.0 && row.new_balance_orig < 1_000.0 {
        return "Account Draining";
    }
    if (row.new_balance_orig - row.old_balance_orig).abs() > 100_000.0 {
        return "Rapid Transfer";
    }
    if (row.new_balance_dest - row.old_balance_dest).abs() > 150_000.0 {
        return "Unusual Recipient";
    }
    if row.amount > 10_000.0 && row.amount < 50_000.0 && row.old_balance_orig > row.new_balance_orig {
        return "Structuring Pattern";
    }
    "Anomalous Activity"
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Center,
    Right,
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

/// Top-down writer over A4 pages; `y` is the top edge of the next line in mm.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl PageWriter {
    fn ensure_space(&mut self, height: f32) {
        if self.y - height < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_H - MARGIN;
        }
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    #[allow(clippy::too_many_arguments)]
    fn cell(
        &self,
        x: f32,
        width: f32,
        height: f32,
        text: &str,
        font: &IndirectFontRef,
        size: f32,
        align: Align,
        text_color: (u8, u8, u8),
        fill: Option<(u8, u8, u8)>,
        border: bool,
    ) {
        let rect = Rect::new(Mm(x), Mm(self.y - height), Mm(x + width), Mm(self.y));
        match (fill, border) {
            (Some(color), true) => {
                self.layer.set_fill_color(rgb(color));
                self.layer.set_outline_color(rgb(BLACK));
                self.layer.add_rect(rect.with_mode(PaintMode::FillStroke));
            }
            (Some(color), false) => {
                self.layer.set_fill_color(rgb(color));
                self.layer.add_rect(rect.with_mode(PaintMode::Fill));
            }
            (None, true) => {
                self.layer.set_outline_color(rgb(BLACK));
                self.layer.add_rect(rect.with_mode(PaintMode::Stroke));
            }
            (None, false) => {}
        }

        if text.is_empty() {
            return;
        }
        let text_w = approx_text_width(text, size);
        let tx = match align {
            Align::Left => x + 1.0,
            Align::Center => x + (width - text_w) / 2.0,
            Align::Right => x + width - 1.0 - text_w,
        };
        let baseline = self.y - height / 2.0 - size * PT_TO_MM * 0.35;
        self.layer.set_fill_color(rgb(text_color));
        self.layer.use_text(text, size, Mm(tx), Mm(baseline), font);
    }

    /// Full-width line that advances the cursor.
    #[allow(clippy::too_many_arguments)]
    fn line(
        &mut self,
        height: f32,
        text: &str,
        font: &IndirectFontRef,
        size: f32,
        align: Align,
        text_color: (u8, u8, u8),
        fill: Option<(u8, u8, u8)>,
        border: bool,
    ) {
        self.ensure_space(height);
        self.cell(MARGIN, CONTENT_W, height, text, font, size, align, text_color, fill, border);
        self.gap(height);
    }

    #[allow(clippy::too_many_arguments)]
    fn row(
        &mut self,
        height: f32,
        cells: &[String],
        widths: &[f32],
        aligns: &[Align],
        font: &IndirectFontRef,
        size: f32,
        text_color: (u8, u8, u8),
        fill: (u8, u8, u8),
    ) {
        self.ensure_space(height);
        let mut x = MARGIN;
        for ((text, width), align) in cells.iter().zip(widths).zip(aligns) {
            self.cell(x, *width, height, text, font, size, *align, text_color, Some(fill), true);
            x += width;
        }
        self.gap(height);
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ))
}

// Built-in fonts carry no metrics here; half an em per glyph is close enough to center.
fn approx_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5 * PT_TO_MM
}

#[allow(clippy::too_many_arguments)]
fn draw_table(
    w: &mut PageWriter,
    fonts: &Fonts,
    title: &str,
    accent: (u8, u8, u8),
    headers: &[&str; 5],
    widths: &[f32; 5],
    aligns: &[Align; 5],
    rows: &[[String; 5]],
    row_fill: (u8, u8, u8),
) {
    w.line(10.0, title, &fonts.bold, 12.0, Align::Left, accent, None, false);

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let centered = [Align::Center; 5];
    w.row(7.0, &header_cells, widths, &centered, &fonts.bold, 8.0, WHITE, accent);

    for cells in rows {
        w.row(6.0, cells, widths, aligns, &fonts.regular, 7.0, BLACK, row_fill);
    }
    w.gap(4.0);
}

/// Draw the layout as a PDF document and return its bytes.
pub fn render_pdf(layout: &ReportLayout) -> eyre::Result<Vec<u8>> {
    let (doc, page, layer) =
        PdfDocument::new("FraudSentry Audit Report", Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let font = |f: BuiltinFont| {
        doc.add_builtin_font(f)
            .map_err(|e| eyre::eyre!("failed to load built-in font: {}", e))
    };
    let fonts = Fonts {
        regular: font(BuiltinFont::Helvetica)?,
        bold: font(BuiltinFont::HelveticaBold)?,
        italic: font(BuiltinFont::HelveticaOblique)?,
    };
    let layer = doc.get_page(page).get_layer(layer);
    let mut w = PageWriter {
        doc,
        layer,
        y: PAGE_H - MARGIN,
    };

    // Header
    w.line(10.0, "FraudSentry Audit Report", &fonts.bold, 16.0, Align::Center, BLACK, None, false);
    w.line(6.0, &layout.date_line, &fonts.regular, 9.0, Align::Center, BLACK, None, false);
    w.gap(3.0);

    // Summary box
    w.line(7.0, "SCAN SUMMARY", &fonts.bold, 10.0, Align::Left, BLACK, Some((200, 220, 240)), true);
    w.line(6.0, &layout.summary_line, &fonts.regular, 9.0, Align::Left, BLACK, Some((245, 245, 245)), true);
    w.gap(4.0);

    if !layout.flagged.is_empty() {
        draw_table(
            &mut w,
            &fonts,
            "TABLE 1: CONFIRMED FRAUD TRANSACTIONS",
            RED,
            &FLAGGED_HEADERS,
            &FLAGGED_WIDTHS,
            &[Align::Right, Align::Right, Align::Center, Align::Center, Align::Left],
            &layout.flagged,
            (255, 240, 240),
        );
    }

    if !layout.cleared.is_empty() {
        draw_table(
            &mut w,
            &fonts,
            "TABLE 2: FALSE ALARM CANDIDATES (ANALYST REVIEWED)",
            ORANGE,
            &CLEARED_HEADERS,
            &CLEARED_WIDTHS,
            &[Align::Right, Align::Right, Align::Center, Align::Center, Align::Left],
            &layout.cleared,
            (255, 250, 240),
        );
    }

    // Footer
    w.gap(10.0);
    w.line(
        6.0,
        "Generated by FraudSentry - Intelligent Fraud Detection System",
        &fonts.italic,
        8.0,
        Align::Center,
        GRAY,
        None,
        false,
    );
    w.line(
        4.0,
        &format!("Report ID: {}  |  Status: AUDIT REPORT", layout.report_id),
        &fonts.italic,
        8.0,
        Align::Center,
        GRAY,
        None,
        false,
    );

    w.doc
        .save_to_bytes()
        .map_err(|e| eyre::eyre!("failed to write PDF: {}", e))
}
