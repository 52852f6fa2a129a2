//! Tally loads declaratively configured data sources into an embedded
//! SQLite database and renders named, parametrized SQL reports through text
//! templates.
//!
//! This crate provides an API that allows for embedding Tally into another
//! application. For Tally's command line interface, see the `tally-cli`
//! crate.

mod config;
mod error;
mod loader;
mod mapper;
mod report;
mod schema;
mod source;
mod store;
mod template;
mod xml;

pub use config::{Config, DataConfig, Report, TableLayout, TemplateParam};
pub use error::Error;
pub use loader::batch_load;
pub use mapper::FieldMap;
pub use report::run_report;
pub use schema::refresh;
pub use source::{CsvRows, Row, Source};
pub use store::{QueryResult, Store};
pub use template::{placeholders, substitute};
pub use xml::{Document, NodeRef};
