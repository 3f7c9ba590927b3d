use rusqlite::{Connection, params};

use crate::store::StoreError;

/// Stamp the validation status onto every reaction imported from `source`.
///
/// `source` is a [`source_identity`](crate::store::source_identity) string.
/// Returns the number of reactions updated.
pub fn set_validated_by_source(
    conn: &Connection,
    source: &str,
    validated: bool,
    by: Option<&str>,
    at: Option<&str>,
) -> Result<usize, StoreError> {
    let updated = conn.execute(
        "UPDATE reactions
            SET validated = ?1, validated_by = ?2, validated_at = ?3, updated_at = datetime('now')
          WHERE source_path = ?4",
        params![validated, by, at, source],
    )?;
    Ok(updated)
}
