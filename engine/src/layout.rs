//! FILENAME: engine/src/layout.rs
//! PURPOSE: Assigns worksheets and KPI tiles to dashboard grid zones.
//! CONTEXT: Runs once after all worksheets exist. Each style selects a
//! grid template; placement is fully deterministic: KPI tiles first in
//! supplied order, then worksheets by descending priority (stable on
//! ties), filled row-major. Overflow creates additional dashboard pages
//! instead of dropping items.

use crate::config::EngineConfig;
use crate::viz::{KpiTile, VisualizationSpec};
use serde::{Deserialize, Serialize};

/// The overall dashboard arrangement the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardStyle {
    /// KPI band on top, 2x2 chart grid below.
    Executive,
    /// Dense N x M grid sized to the chart count.
    Detailed,
    /// One dominant chart plus small multiples.
    Operational,
    /// One chart per page.
    Exploratory,
}

impl Default for DashboardStyle {
    fn default() -> Self {
        DashboardStyle::Executive
    }
}

/// A zone rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }

    pub fn within(&self, width: u32, height: u32) -> bool {
        self.x + self.w <= width && self.y + self.h <= height
    }
}

/// What a zone displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZoneItem {
    Worksheet { name: String },
    Kpi { name: String },
}

impl ZoneItem {
    /// The worksheet name the zone references in the document (KPI tiles
    /// are backed by text worksheets of the same name).
    pub fn worksheet_name(&self) -> &str {
        match self {
            ZoneItem::Worksheet { name } => name,
            ZoneItem::Kpi { name } => name,
        }
    }
}

/// One placed zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub item: ZoneItem,
    pub rect: Rect,
}

/// One dashboard page: canvas dimensions plus its zones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardPage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub zones: Vec<Zone>,
}

/// Lays out tiles and worksheets into one or more dashboard pages.
pub fn lay_out_dashboards(
    tiles: &[KpiTile],
    specs: &[VisualizationSpec],
    style: DashboardStyle,
    config: &EngineConfig,
) -> Vec<DashboardPage> {
    // Worksheets ordered by descending priority; stable sort keeps the
    // recommendation order on ties.
    let mut ordered: Vec<&VisualizationSpec> = specs.iter().collect();
    ordered.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let pages = match style {
        DashboardStyle::Executive => lay_out_executive(tiles, &ordered, config),
        DashboardStyle::Detailed => lay_out_detailed(tiles, &ordered, config),
        DashboardStyle::Operational => lay_out_operational(tiles, &ordered, config),
        DashboardStyle::Exploratory => lay_out_exploratory(tiles, &ordered, config),
    };

    tracing::debug!(pages = pages.len(), "dashboard layout computed");
    pages
}

fn page_name(index: usize) -> String {
    if index == 0 {
        "Dashboard".to_string()
    } else {
        format!("Dashboard {}", index + 1)
    }
}

fn new_page(index: usize, config: &EngineConfig) -> DashboardPage {
    DashboardPage {
        name: page_name(index),
        width: config.canvas_width,
        height: config.canvas_height,
        zones: Vec::new(),
    }
}

/// Fills a rectangular region with `items` in row-major order on a
/// cols x rows grid. The caller guarantees items fit.
fn fill_grid(
    page: &mut DashboardPage,
    items: &[ZoneItem],
    region: Rect,
    cols: u32,
    rows: u32,
) {
    let cell_w = region.w / cols;
    let cell_h = region.h / rows;
    for (i, item) in items.iter().enumerate() {
        let col = (i as u32) % cols;
        let row = (i as u32) / cols;
        page.zones.push(Zone {
            item: item.clone(),
            rect: Rect {
                x: region.x + col * cell_w,
                y: region.y + row * cell_h,
                w: cell_w,
                h: cell_h,
            },
        });
    }
}

/// Executive: the first page reserves a top band for KPI tiles, then every
/// page carries up to four charts in a 2x2 grid.
fn lay_out_executive(
    tiles: &[KpiTile],
    ordered: &[&VisualizationSpec],
    config: &EngineConfig,
) -> Vec<DashboardPage> {
    let mut pages = Vec::new();
    let mut page = new_page(0, config);

    let mut chart_top = 0u32;
    if !tiles.is_empty() {
        let band_h = config.kpi_band_height.min(config.canvas_height / 2);
        let tile_w = config.canvas_width / tiles.len() as u32;
        for (i, tile) in tiles.iter().enumerate() {
            page.zones.push(Zone {
                item: ZoneItem::Kpi {
                    name: tile.name.clone(),
                },
                rect: Rect {
                    x: i as u32 * tile_w,
                    y: 0,
                    w: tile_w,
                    h: band_h,
                },
            });
        }
        chart_top = band_h;
    }

    for chunk in ordered.chunks(4) {
        let region = Rect {
            x: 0,
            y: chart_top,
            w: config.canvas_width,
            h: config.canvas_height - chart_top,
        };
        let items: Vec<ZoneItem> = chunk
            .iter()
            .map(|s| ZoneItem::Worksheet {
                name: s.name.clone(),
            })
            .collect();
        fill_grid(&mut page, &items, region, 2, 2);

        pages.push(page);
        page = new_page(pages.len(), config);
        chart_top = 0; // KPI band only on the first page
    }

    if pages.is_empty() {
        // Tiles but no charts (or nothing at all): keep the single page.
        pages.push(page);
    }
    pages
}

/// Detailed: every page is an N x M grid sized to its item count, with
/// cols = ceil(sqrt(n)) so the grid wastes as few cells as possible.
/// KPI tiles are ordinary grid items here, placed first.
fn lay_out_detailed(
    tiles: &[KpiTile],
    ordered: &[&VisualizationSpec],
    config: &EngineConfig,
) -> Vec<DashboardPage> {
    let mut items: Vec<ZoneItem> = tiles
        .iter()
        .map(|t| ZoneItem::Kpi {
            name: t.name.clone(),
        })
        .collect();
    items.extend(ordered.iter().map(|s| ZoneItem::Worksheet {
        name: s.name.clone(),
    }));

    if items.is_empty() {
        return vec![new_page(0, config)];
    }

    let capacity = config.max_charts_per_page.max(1);
    let mut pages = Vec::new();
    for chunk in items.chunks(capacity) {
        let n = chunk.len() as u32;
        let cols = (n as f64).sqrt().ceil() as u32;
        let rows = n.div_ceil(cols);
        let mut page = new_page(pages.len(), config);
        let region = Rect {
            x: 0,
            y: 0,
            w: config.canvas_width,
            h: config.canvas_height,
        };
        fill_grid(&mut page, chunk, region, cols, rows);
        pages.push(page);
    }
    pages
}

/// Operational: one dominant zone on the left two thirds of the canvas,
/// small-multiple zones stacked in the right column. KPI tiles count as
/// small multiples.
fn lay_out_operational(
    tiles: &[KpiTile],
    ordered: &[&VisualizationSpec],
    config: &EngineConfig,
) -> Vec<DashboardPage> {
    let mut items: Vec<ZoneItem> = tiles
        .iter()
        .map(|t| ZoneItem::Kpi {
            name: t.name.clone(),
        })
        .collect();
    items.extend(ordered.iter().map(|s| ZoneItem::Worksheet {
        name: s.name.clone(),
    }));

    if items.is_empty() {
        return vec![new_page(0, config)];
    }

    let capacity = 1 + config.operational_small_zones.max(1);
    let mut pages = Vec::new();
    for chunk in items.chunks(capacity) {
        let mut page = new_page(pages.len(), config);
        let dominant_w = config.canvas_width * 2 / 3;

        page.zones.push(Zone {
            item: chunk[0].clone(),
            rect: Rect {
                x: 0,
                y: 0,
                w: dominant_w,
                h: config.canvas_height,
            },
        });

        let smalls = &chunk[1..];
        if !smalls.is_empty() {
            let region = Rect {
                x: dominant_w,
                y: 0,
                w: config.canvas_width - dominant_w,
                h: config.canvas_height,
            };
            fill_grid(&mut page, smalls, region, 1, smalls.len() as u32);
        }
        pages.push(page);
    }
    pages
}

/// Exploratory: every item is its own full-canvas page, the closest
/// dashboard equivalent of a tab per analysis thread.
fn lay_out_exploratory(
    tiles: &[KpiTile],
    ordered: &[&VisualizationSpec],
    config: &EngineConfig,
) -> Vec<DashboardPage> {
    let mut items: Vec<ZoneItem> = tiles
        .iter()
        .map(|t| ZoneItem::Kpi {
            name: t.name.clone(),
        })
        .collect();
    items.extend(ordered.iter().map(|s| ZoneItem::Worksheet {
        name: s.name.clone(),
    }));

    if items.is_empty() {
        return vec![new_page(0, config)];
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let mut page = new_page(i, config);
            page.zones.push(Zone {
                item,
                rect: Rect {
                    x: 0,
                    y: 0,
                    w: config.canvas_width,
                    h: config.canvas_height,
                },
            });
            page
        })
        .collect()
}
