use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Row, Table};
use std::fmt;

use crate::automation::{ClipboardMeasurement, DelaySettings, RecommendedDelays};

const DASH: &str = "—";

/// Terminal summary of a successful calibration run next to the delays that
/// were active when it started.
pub struct CalibrationReport {
    measured: ClipboardMeasurement,
    recommended: RecommendedDelays,
    current_sync_ms: u64,
    current_selection_ms: u64,
}

impl CalibrationReport {
    pub fn new(
        measured: &ClipboardMeasurement,
        recommended: &RecommendedDelays,
        current: &DelaySettings,
    ) -> Self {
        Self {
            measured: measured.clone(),
            recommended: *recommended,
            current_sync_ms: current.clipboard_sync_delay_ms(),
            current_selection_ms: current.selection_delay_ms(),
        }
    }
}

fn ms_cell(value: f64) -> Cell {
    Cell::new(format!("{value:.1}")).set_alignment(CellAlignment::Right)
}

fn delay_cell(value: u64) -> Cell {
    Cell::new(value).set_alignment(CellAlignment::Right)
}

fn empty_cell() -> Cell {
    Cell::new(DASH).set_alignment(CellAlignment::Right)
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::DynamicFullWidth)
            .force_no_tty();

        table.set_header(vec![
            Cell::new("Calibration"),
            Cell::new("Measured (ms)"),
            Cell::new("Current (ms)"),
            Cell::new("Recommended (ms)"),
        ]);

        for column in 1..4 {
            if let Some(col) = table.column_mut(column) {
                col.set_cell_alignment(CellAlignment::Right);
            }
        }

        for (index, sample) in self.measured.samples_ms.iter().enumerate() {
            table.add_row(Row::from(vec![
                Cell::new(format!("Trial {}", index + 1)),
                ms_cell(*sample),
                empty_cell(),
                empty_cell(),
            ]));
        }

        table.add_row(Row::from(vec![
            Cell::new("p95"),
            ms_cell(self.measured.p95_ms),
            empty_cell(),
            empty_cell(),
        ]));

        table.add_row(Row::from(vec![
            Cell::new("Max"),
            ms_cell(self.measured.max_ms),
            empty_cell(),
            empty_cell(),
        ]));

        table.add_row(Row::from(vec![
            Cell::new("Clipboard sync delay"),
            empty_cell(),
            delay_cell(self.current_sync_ms),
            delay_cell(self.recommended.clipboard_sync_delay_ms),
        ]));

        table.add_row(Row::from(vec![
            Cell::new("Selection delay"),
            empty_cell(),
            delay_cell(self.current_selection_ms),
            delay_cell(self.recommended.selection_delay_ms),
        ]));

        let rendered = table.trim_fmt();
        f.write_str(&rendered)
    }
}
