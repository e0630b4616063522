//! Workbook model used by the export and import engines, plus the xlsx
//! codec behind it.
//!
//! The engines only ever see [`Workbook`]/[`Sheet`]/[`Row`]; the xlsx
//! details (fonts, styles) stay inside the codec. Bold is tracked per row:
//! export always bolds whole rows, and import's header detection ("first
//! three cells bold") collapses to the same flag on read.

use std::path::Path;

use confloc_core::{ConflocError, Result};

/// Wide sheet holding performance-review form templates.
pub const SHEET_PERFORMANCE_TEMPLATES: &str = "Performance_Review_Templates";
/// Wide sheet holding goal and development plan templates.
pub const SHEET_GOAL_DEV_TEMPLATES: &str = "Goal&Development_Plan_Templates";
/// Header of the column import appends to every processed sheet.
pub const CHANGE_LOG_HEADER: &str = "Change Log Identified During Import";
/// Base name of the per-language flat sheets.
pub const FLAT_SHEET_PREFIX: &str = "DataModel";

pub fn flat_sheet_name(lang: &str) -> String {
    format!("{FLAT_SHEET_PREFIX} ({lang})")
}

/// Language code carried in a flat sheet name.
pub fn lang_of_flat_sheet(name: &str) -> Option<&str> {
    name.strip_prefix("DataModel (")?.strip_suffix(')')
}

/// Per-language column header; the parenthesized code is what import
/// parses back out.
pub fn lang_header(lang: &str) -> String {
    format!("Label ({lang})")
}

/// Language code carried in a per-language column header.
pub fn lang_of_header(header: &str) -> Option<&str> {
    let open = header.rfind('(')?;
    let close = header.rfind(')')?;
    (open < close).then(|| &header[open + 1..close])
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<String>,
    pub bold: bool,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: &str, headers: &[String]) -> Self {
        Sheet {
            name: name.to_string(),
            rows: vec![Row {
                cells: headers.to_vec(),
                bold: true,
            }],
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn append(&mut self, cells: Vec<String>) {
        self.rows.push(Row { cells, bold: false });
    }

    /// Append a bold header/anchor row.
    pub fn append_bold(&mut self, cells: Vec<String>) {
        self.rows.push(Row { cells, bold: true });
    }

    /// Cell text at 0-based (row, column); empty when out of range.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.cells.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: &str) {
        while self.rows.len() <= row {
            self.rows.push(Row::default());
        }
        let cells = &mut self.rows[row].cells;
        while cells.len() <= col {
            cells.push(String::new());
        }
        cells[col] = value.to_string();
    }

    pub fn is_bold(&self, row: usize) -> bool {
        self.rows.get(row).map(|r| r.bold).unwrap_or(false)
    }

    /// Number of populated header cells up to the first empty one.
    pub fn header_width(&self) -> usize {
        match self.rows.first() {
            Some(header) => header
                .cells
                .iter()
                .position(|c| c.is_empty())
                .unwrap_or(header.cells.len()),
            None => 0,
        }
    }

    /// Insert the change-log column at the first empty header cell and
    /// return its 0-based index.
    pub fn add_change_log_column(&mut self) -> usize {
        let col = self.header_width();
        self.set_cell(0, col, CHANGE_LOG_HEADER);
        col
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn add_sheet(&mut self, name: &str, headers: &[String]) -> &mut Sheet {
        if let Some(pos) = self.sheets.iter().position(|s| s.name == name) {
            return &mut self.sheets[pos];
        }
        self.sheets.push(Sheet::new(name, headers));
        self.sheets.last_mut().expect("just pushed")
    }

    /// One sheet per language, named `<base> (<lang>)`, with the base
    /// headers plus that language's label column.
    pub fn create_lang_sheets(&mut self, base: &str, langs: &[String], base_headers: &[&str]) {
        for lang in langs {
            let name = format!("{base} ({lang})");
            if self.sheet(&name).is_some() {
                continue;
            }
            let mut headers: Vec<String> =
                base_headers.iter().map(|h| h.to_string()).collect();
            headers.push(lang_header(lang));
            self.add_sheet(&name, &headers);
        }
    }
}

/// Write the workbook to an xlsx file.
pub fn write_xlsx(workbook: &Workbook, path: &Path) -> Result<()> {
    let mut book = umya_spreadsheet::new_file();
    let _ = book.remove_sheet_by_name("Sheet1");

    for sheet in &workbook.sheets {
        let ws = book
            .new_sheet(&sheet.name)
            .map_err(|e| ConflocError::Workbook(e.to_string()))?;
        for (r, row) in sheet.rows.iter().enumerate() {
            for (c, value) in row.cells.iter().enumerate() {
                let cell = ws.get_cell_mut(((c + 1) as u32, (r + 1) as u32));
                cell.set_value(value);
                if row.bold {
                    cell.get_style_mut().get_font_mut().set_bold(true);
                }
            }
        }
    }

    umya_spreadsheet::writer::xlsx::write(&book, path)
        .map_err(|e| ConflocError::Workbook(e.to_string()))?;
    Ok(())
}

/// Read an xlsx file into the workbook model. A row is flagged bold when
/// its first three cells all carry a bold font.
pub fn read_xlsx(path: &Path) -> Result<Workbook> {
    let book = umya_spreadsheet::reader::xlsx::read(path)
        .map_err(|e| ConflocError::Workbook(e.to_string()))?;

    let mut workbook = Workbook::new();
    for ws in book.get_sheet_collection() {
        let mut sheet = Sheet {
            name: ws.get_name().to_string(),
            rows: Vec::new(),
        };
        let max_row = ws.get_highest_row();
        let max_col = ws.get_highest_column();
        for r in 1..=max_row {
            let mut cells = Vec::with_capacity(max_col as usize);
            for c in 1..=max_col {
                cells.push(ws.get_value((c, r)));
            }
            while cells.last().map(|s| s.is_empty()).unwrap_or(false) {
                cells.pop();
            }
            let bold = (1..=3).all(|c| {
                ws.get_cell((c, r))
                    .and_then(|cell| {
                        cell.get_style()
                            .get_font()
                            .as_ref()
                            .map(|f| *f.get_bold())
                    })
                    .unwrap_or(false)
            });
            sheet.rows.push(Row { cells, bold });
        }
        workbook.sheets.push(sheet);
    }
    Ok(workbook)
}
