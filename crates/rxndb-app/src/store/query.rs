//! Read-side queries over the store.

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::constants::CLEAR_ORDER;
use crate::store::StoreError;

/// Row counts reported after a run and by `db stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub reactions: u64,
    pub measurements: u64,
    pub references: u64,
    pub validated: u64,
}

impl StoreCounts {
    pub fn load(conn: &Connection) -> Result<Self, StoreError> {
        let validated: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reactions WHERE validated = 1",
            [],
            |r| r.get(0),
        )?;
        Ok(Self {
            reactions: count_rows(conn, "reactions")?,
            measurements: count_rows(conn, "measurements")?,
            references: count_rows(conn, "references_map")?,
            validated: validated.max(0) as u64,
        })
    }
}

/// Count rows of a managed table. Table names outside the managed set are
/// rejected rather than interpolated.
pub fn count_rows(conn: &Connection, table: &str) -> Result<u64, StoreError> {
    if !CLEAR_ORDER.contains(&table) {
        return Err(StoreError::UnknownTable(table.to_string()));
    }
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
    Ok(count.max(0) as u64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionRow {
    pub id: i64,
    pub table_no: u32,
    pub reaction_name: Option<String>,
    pub formula_canonical: String,
    pub notes: Option<String>,
    pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRow {
    pub ph: Option<String>,
    pub rate_value: String,
    pub rate_value_num: Option<f64>,
    pub conditions: Option<String>,
    pub reference_code: Option<String>,
    pub source_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionDetail {
    #[serde(flatten)]
    pub reaction: ReactionRow,
    pub measurements: Vec<MeasurementRow>,
}

/// Full-text search over reaction name, canonical formula and notes.
pub fn search_reactions(
    conn: &Connection,
    query: &str,
    table_no: Option<u32>,
    limit: usize,
) -> Result<Vec<ReactionRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.table_no, r.reaction_name, r.formula_canonical, r.notes, r.validated
           FROM reactions_fts
           JOIN reactions r ON r.id = reactions_fts.rowid
          WHERE reactions_fts MATCH ?1
            AND (?2 IS NULL OR r.table_no = ?2)
          ORDER BY reactions_fts.rank
          LIMIT ?3",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map(params![query, table_no, limit], reaction_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// A reaction with all of its measurements, or `None` if the id is unknown.
pub fn reaction_with_measurements(
    conn: &Connection,
    id: i64,
) -> Result<Option<ReactionDetail>, StoreError> {
    let reaction = conn
        .query_row(
            "SELECT id, table_no, reaction_name, formula_canonical, notes, validated
               FROM reactions WHERE id = ?1",
            params![id],
            reaction_row,
        )
        .optional()?;
    let Some(reaction) = reaction else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT m.pH, m.rate_value, m.rate_value_num, m.conditions, rm.buxton_code, m.source_path
           FROM measurements m
           LEFT JOIN references_map rm ON rm.id = m.reference_id
          WHERE m.reaction_id = ?1
          ORDER BY m.id",
    )?;
    let measurements = stmt
        .query_map(params![id], |r| {
            Ok(MeasurementRow {
                ph: r.get(0)?,
                rate_value: r.get(1)?,
                rate_value_num: r.get(2)?,
                conditions: r.get(3)?,
                reference_code: r.get(4)?,
                source_path: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(ReactionDetail {
        reaction,
        measurements,
    }))
}

fn reaction_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        id: r.get(0)?,
        table_no: r.get(1)?,
        reaction_name: r.get(2)?,
        formula_canonical: r.get(3)?,
        notes: r.get(4)?,
        validated: r.get(5)?,
    })
}
