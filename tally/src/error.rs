use std::path::PathBuf;

use thiserror::Error;

/// The primary error type that can be produced by Tally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error {0}: {1}")]
    Io(String, std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML document has no root element")]
    EmptyXmlDocument,
    #[error("unsupported selector expression: {0}")]
    InvalidSelector(String),
    #[error("malformed data source descriptor \"{0}\", expected \"kind:locator\"")]
    InvalidDataSource(String),
    #[error("unknown data source kind \"{0}\"")]
    UnknownSourceKind(String),
    #[error("no input files supplied for table \"{0}\"")]
    NoInputFiles(String),
    #[error("parametrized field \"{0}\" references field \"{1}\", which is not declared before it")]
    UndeclaredField(String, String),
    #[error("template \"{0}\" contains an unterminated or empty placeholder")]
    InvalidPlaceholder(String),
    #[error("no value supplied for placeholder \"{0}\" in template \"{1}\"")]
    UnresolvedPlaceholder(String, String),
    #[error("malformed parameter \"{0}\", expected KEY=VALUE")]
    MalformedParam(String),
    #[error("unknown report name \"{0}\", available reports are: {1}")]
    UnknownReport(String, String),
    #[error("failed to back up database to {0}: {1}")]
    Backup(PathBuf, std::io::Error),
    #[error("template error: {0}")]
    Template(#[from] handlebars::TemplateError),
    #[error("failed to render template \"{0}\": {1}")]
    TemplateRender(String, handlebars::RenderError),
}
