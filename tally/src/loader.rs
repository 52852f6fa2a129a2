//! Transactional, chunked loading of resolved rows into the store.

use log::{error, info};
use rusqlite::params_from_iter;

use crate::store::Store;
use crate::{Error, Row};

/// Number of inserts grouped into one transaction. Commits exist to bound
/// transaction size and surface progress, not for concurrency.
const BATCH_SIZE: u64 = 100;

/// Insert the given rows into the named table.
///
/// Duplicate-key conflicts are skipped (`INSERT OR IGNORE`), individual row
/// failures are logged and swallowed, and the transaction is committed and
/// reopened every [`BATCH_SIZE`] rows, with a final commit for the
/// remainder. The column set is taken from the first row; every value is
/// bound as a statement parameter.
///
/// Returns the number of rows processed, which can exceed the number of
/// rows actually persisted.
pub fn batch_load<I>(store: &Store, table: &str, rows: I) -> Result<u64, Error>
where
    I: IntoIterator<Item = Result<Row, Error>>,
{
    let mut rows = rows.into_iter();

    // The first readable row decides the column set for the whole load.
    let first = loop {
        match rows.next() {
            None => {
                info!("Total records inserted into '{}': 0", table);
                return Ok(0);
            }
            Some(Err(e)) => error!("Skipping unreadable record for '{}': {}", table, e),
            Some(Ok(row)) => break row,
        }
    };
    let columns: Vec<&str> = first.iter().map(|(field, _)| field.as_str()).collect();
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        vec!["?"; columns.len()].join(", ")
    );
    let mut stmt = store.prepare(&sql)?;

    let mut tx = store.transaction()?;
    let mut count = 0_u64;
    let mut in_batch = false;
    for row in std::iter::once(Ok(first)).chain(rows) {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                error!("Skipping unreadable record for '{}': {}", table, e);
                continue;
            }
        };
        if let Err(e) = stmt.execute(params_from_iter(row.iter().map(|(_, value)| value.as_str())))
        {
            error!("Failed to insert record into '{}': {}", table, e);
        }
        count += 1;
        in_batch = true;
        if count % BATCH_SIZE == 0 {
            tx.commit()?;
            info!("Inserted {} records...", count);
            tx = store.transaction()?;
            in_batch = false;
        }
    }
    // For N rows exactly ceil(N / BATCH_SIZE) commits occur; an empty
    // trailing transaction is dropped, not committed.
    if in_batch {
        tx.commit()?;
    }
    info!("Total records inserted into '{}': {}", table, count);
    Ok(count)
}
