//! Tab-separated source rows.

use std::mem;

use crate::constants::SOURCE_COLUMNS;

/// One parsed row of a tabular source file. Empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRow {
    pub reaction_number: Option<String>,
    pub reaction_name: Option<String>,
    pub formula_latex: Option<String>,
    pub ph: Option<String>,
    pub rate_value: Option<String>,
    pub notes: Option<String>,
    pub reference_code: Option<String>,
}

/// Parse every row of a tab-separated document. Rows shorter than
/// [`SOURCE_COLUMNS`] are padded; extra columns are ignored. Blank rows are
/// dropped.
///
/// A cell that starts with `"` is quoted: tabs and line breaks inside it are
/// part of the cell and `""` stands for one quote. Quotes elsewhere are
/// literal.
pub fn parse_rows(text: &str) -> Vec<SourceRow> {
    split_records(text)
        .iter()
        .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .map(|cells| row_from_cells(cells))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RecordStart,
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut state = State::RecordStart;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        state = match (state, ch) {
            (State::Quoted, '"') => State::QuoteInQuoted,
            (State::Quoted, _) => {
                field.push(ch);
                State::Quoted
            }
            (State::QuoteInQuoted, '"') => {
                field.push('"');
                State::Quoted
            }
            (_, '\t') => {
                fields.push(mem::take(&mut field));
                State::FieldStart
            }
            (_, '\n' | '\r') => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                if state != State::RecordStart {
                    fields.push(mem::take(&mut field));
                }
                records.push(mem::take(&mut fields));
                State::RecordStart
            }
            (State::RecordStart | State::FieldStart, '"') => State::Quoted,
            _ => {
                field.push(ch);
                State::Unquoted
            }
        };
    }
    if state != State::RecordStart {
        fields.push(field);
        records.push(fields);
    }
    records
}

fn row_from_cells(cells: &[String]) -> SourceRow {
    let mut cells = cells
        .iter()
        .map(|raw| cell(raw))
        .chain(std::iter::repeat(None))
        .take(SOURCE_COLUMNS);
    let mut next = || cells.next().flatten();
    SourceRow {
        reaction_number: next(),
        reaction_name: next(),
        formula_latex: next(),
        ph: next(),
        rate_value: next(),
        notes: next(),
        reference_code: next(),
    }
}

fn cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
