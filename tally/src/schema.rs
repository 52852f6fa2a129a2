//! Database refresh: backup, table recreation and data loading.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use eyre::Result;
use log::{debug, error, info};

use crate::loader::batch_load;
use crate::mapper::FieldMap;
use crate::source::{CsvRows, Source};
use crate::store::Store;
use crate::xml::Document;
use crate::{Config, Error, TableLayout};

/// Rebuild the database from the configured layout and data sources.
///
/// The backing database file is backed up first; a backup failure aborts the
/// refresh before any destructive change. Every step after the backup runs
/// under a continue-on-error policy: statement failures, unusable sources
/// and invalid layouts are logged and skip only the table concerned, so a
/// refresh is always best-effort over the full layout list. XML layouts read
/// from `xml_files`, each file parsed once per refresh.
pub fn refresh(store: &Store, config: &Config, xml_files: &[PathBuf]) -> Result<()> {
    backup(store)?;

    // Delete all tables from the existing database, except excluded ones.
    match store.tables() {
        Ok(tables) => {
            for table in tables {
                if config.data.exclude_from_refresh.contains(&table) {
                    info!("Leaving table '{}' untouched", table);
                } else {
                    info!("Deleting table '{}'", table);
                    if let Err(e) = store.execute(&format!("DROP TABLE {}", table)) {
                        error!("Failed to delete table '{}': {}", table, e);
                    }
                }
            }
        }
        Err(e) => error!("Failed to list existing tables: {}", e),
    }

    for layout in &config.data.layout {
        info!("Creating table '{}'", layout.name);
        let columns = layout.columns.replace('\n', "");
        if let Err(e) = store.execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            layout.name, columns
        )) {
            error!("Failed to create table '{}': {}", layout.name, e);
            continue;
        }

        debug!("Using data source '{}'", layout.data_source);
        match Source::parse(&layout.data_source) {
            Ok(Source::Csv(path)) => load_csv(store, layout, &path),
            Ok(Source::Xml(selector)) => load_xml(store, layout, &selector, xml_files),
            Err(e) => error!("Skipping table '{}': {}", layout.name, e),
        }
    }
    Ok(())
}

// Copy the backing database file to a `<name>.<epoch-seconds>.bak` sibling.
// An in-memory store has no backing file and nothing to back up.
fn backup(store: &Store) -> Result<(), Error> {
    let path = match store.path() {
        Some(path) => path,
        None => {
            debug!("Store has no backing file, skipping backup");
            return Ok(());
        }
    };
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let epoch_seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    let backup_name = format!("{}.{}.bak", file_name, epoch_seconds);
    let backup_path = path.with_file_name(&backup_name);
    info!("Backup database '{}' as '{}'", path.display(), backup_name);
    fs::copy(path, &backup_path).map_err(|e| Error::Backup(backup_path.clone(), e))?;
    Ok(())
}

fn load_csv(store: &Store, layout: &TableLayout, path: &Path) {
    info!("Inserting data from CSV file '{}'", path.display());
    let rows = match CsvRows::open(path) {
        Ok(rows) => rows,
        Err(e) => {
            error!("Skipping table '{}': {}", layout.name, e);
            return;
        }
    };
    if let Err(e) = batch_load(store, &layout.name, rows) {
        error!("Failed to load table '{}': {}", layout.name, e);
    }
}

fn load_xml(store: &Store, layout: &TableLayout, selector: &str, xml_files: &[PathBuf]) {
    if xml_files.is_empty() {
        error!("{}", Error::NoInputFiles(layout.name.clone()));
        return;
    }
    let map = FieldMap::new(&layout.input_map, &layout.input_map_parametrized);
    if let Err(e) = map.validate() {
        error!("Skipping table '{}': {}", layout.name, e);
        return;
    }
    for file in xml_files {
        info!("Inserting data from XML file '{}'", file.display());
        let content = match fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to read '{}': {}", file.display(), e);
                continue;
            }
        };
        let doc = match Document::parse(&content) {
            Ok(doc) => doc,
            Err(e) => {
                error!("Failed to parse '{}': {}", file.display(), e);
                continue;
            }
        };
        let root = doc.root();
        info!("Finding all elements matching selector '{}'", selector);
        let nodes = match root.find_all(selector) {
            Ok(nodes) => nodes,
            Err(e) => {
                error!("Skipping table '{}': {}", layout.name, e);
                continue;
            }
        };
        info!("Found {} elements", nodes.len());
        let rows = nodes.into_iter().map(|node| map.resolve(node, root));
        if let Err(e) = batch_load(store, &layout.name, rows) {
            error!("Failed to load table '{}': {}", layout.name, e);
        }
    }
}
