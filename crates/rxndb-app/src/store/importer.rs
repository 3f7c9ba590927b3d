//! Idempotent import of one tabular source file into the store.
//!
//! Reactions are keyed by `(table_no, formula_canonical)` and refreshed in
//! place when they already exist. Measurements are keyed by the file they came
//! from: every import first drops the measurements recorded for the file and
//! then inserts the freshly parsed ones, all in one transaction. Importing the
//! same file twice therefore leaves the same rows behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use thiserror::Error;

use crate::constants::table_category;
use crate::ingestion::{SourceRow, parse_rows};
use crate::store::canonical::{CanonicalFormula, canonicalize, parse_rate_value};
use crate::store::{StoreError, source_identity};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read source `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Store(StoreError::Sqlite(err))
    }
}

/// Row counts produced by one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Source rows that carried a formula and were written.
    pub rows: usize,
    /// Reactions newly created by this import.
    pub reactions_created: usize,
    /// Measurements inserted for this source.
    pub measurements: usize,
}

/// Loads one source file into a store connection.
///
/// Implementations must be idempotent for a given `(source, collection)`.
pub trait SourceImporter {
    fn import(
        &self,
        conn: &mut Connection,
        source: &Path,
        collection: u32,
    ) -> Result<ImportOutcome, ImportError>;
}

/// Importer for tab-separated source files.
#[derive(Debug, Default, Clone, Copy)]
pub struct TabularImporter;

impl SourceImporter for TabularImporter {
    fn import(
        &self,
        conn: &mut Connection,
        source: &Path,
        collection: u32,
    ) -> Result<ImportOutcome, ImportError> {
        let text = fs::read_to_string(source).map_err(|err| ImportError::Read {
            path: source.to_path_buf(),
            source: err,
        })?;
        let rows = parse_rows(&text);
        let identity = source_identity(source);

        let tx = conn.transaction()?;
        let dropped = tx.execute(
            "DELETE FROM measurements WHERE source_path = ?1",
            params![identity],
        )?;

        let mut outcome = ImportOutcome::default();
        for row in &rows {
            let Some(formula) = row.formula_latex.as_deref() else {
                continue;
            };
            let canonical = canonicalize(formula);
            let (reaction_id, created) =
                upsert_reaction(&tx, collection, row, formula, &canonical, &identity)?;
            let reference_id = match row.reference_code.as_deref() {
                Some(code) => Some(upsert_reference(&tx, code)?),
                None => None,
            };
            insert_measurement(&tx, reaction_id, row, reference_id, &identity)?;

            outcome.rows += 1;
            outcome.measurements += 1;
            if created {
                outcome.reactions_created += 1;
            }
        }
        tx.commit()?;

        tracing::debug!(
            source = %identity,
            table = collection,
            rows = outcome.rows,
            created = outcome.reactions_created,
            replaced = dropped,
            "imported source"
        );
        Ok(outcome)
    }
}

fn upsert_reaction(
    tx: &Transaction<'_>,
    table_no: u32,
    row: &SourceRow,
    formula_latex: &str,
    canonical: &CanonicalFormula,
    identity: &str,
) -> Result<(i64, bool), rusqlite::Error> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM reactions WHERE table_no = ?1 AND formula_canonical = ?2",
            params![table_no, canonical.canonical],
            |r| r.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        tx.execute(
            "UPDATE reactions
                SET reaction_name = COALESCE(?1, reaction_name),
                    notes = COALESCE(?2, notes),
                    source_path = COALESCE(?3, source_path),
                    updated_at = datetime('now')
              WHERE id = ?4",
            params![row.reaction_name, row.notes, identity, id],
        )?;
        return Ok((id, false));
    }

    tx.execute(
        "INSERT INTO reactions(
            table_no, table_category, buxton_reaction_number, reaction_name,
            formula_latex, formula_canonical, reactants, products,
            reactant_species, product_species, notes, source_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            table_no,
            table_category(table_no),
            row.reaction_number,
            row.reaction_name,
            formula_latex,
            canonical.canonical,
            canonical.reactants,
            canonical.products,
            species_json(&canonical.reactant_species),
            species_json(&canonical.product_species),
            row.notes,
            identity,
        ],
    )?;
    Ok((tx.last_insert_rowid(), true))
}

fn upsert_reference(tx: &Transaction<'_>, code: &str) -> Result<i64, rusqlite::Error> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM references_map WHERE buxton_code = ?1",
            params![code],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    tx.execute(
        "INSERT INTO references_map(buxton_code) VALUES (?1)",
        params![code],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_measurement(
    tx: &Transaction<'_>,
    reaction_id: i64,
    row: &SourceRow,
    reference_id: Option<i64>,
    identity: &str,
) -> Result<(), rusqlite::Error> {
    let rate_value = row.rate_value.as_deref().unwrap_or("");
    let rate_value_num = row.rate_value.as_deref().and_then(parse_rate_value);
    tx.execute(
        "INSERT INTO measurements(
            reaction_id, pH, rate_value, rate_value_num, conditions, reference_id, source_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            reaction_id,
            row.ph,
            rate_value,
            rate_value_num,
            row.notes,
            reference_id,
            identity,
        ],
    )?;
    Ok(())
}

fn species_json(species: &[String]) -> String {
    serde_json::Value::from(species.to_vec()).to_string()
}
