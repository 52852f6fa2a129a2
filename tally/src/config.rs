//! Configuration-related functionality for Tally.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value as YamlValue};

use crate::Error;

/// Top-level Tally configuration, loaded once per process from a YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub reports: Vec<Report>,
}

/// Database location, template directory and table layout declarations.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Path to the SQLite database file. A `file:` prefix is accepted and
    /// stripped when the store is opened.
    pub db_uri: String,
    /// Directory containing report template files.
    #[serde(default)]
    pub template_dir: String,
    /// Tables exempt from drop-and-recreate during a refresh.
    #[serde(default)]
    pub exclude_from_refresh: Vec<String>,
    /// Destination tables in declaration order.
    #[serde(default)]
    pub layout: Vec<TableLayout>,
}

/// Declarative definition of one destination table plus its data source and
/// field mapping. Declaration order of the maps is significant: parametrized
/// locators may only reference fields declared before them.
#[derive(Debug, Clone, Deserialize)]
pub struct TableLayout {
    pub name: String,
    /// Column list portion of the table DDL.
    pub columns: String,
    /// `kind:locator` data source descriptor (`csv:<path>` or
    /// `xml:<selector>`).
    pub data_source: String,
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub input_map: Vec<(String, String)>,
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub input_map_parametrized: Vec<(String, String)>,
}

/// A named report definition: a template file plus the queries that feed it.
#[derive(Debug, Clone, Deserialize)]
pub struct Report {
    pub name: String,
    /// Template file name, resolved under the configured template directory.
    pub template_file: String,
    #[serde(default)]
    pub template_params: Vec<TemplateParam>,
}

/// One query of a report and the rules binding its results to template
/// variables. A `"*"` mapping binds the full result list; a field name binds
/// that field's value from the first result row.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateParam {
    pub query: String,
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub var_mapping: Vec<(String, String)>,
}

impl Config {
    /// Load the configuration from the given YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Io(path.display().to_string(), e))?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Look up a report definition by name.
    pub fn report(&self, name: &str) -> Option<&Report> {
        self.reports.iter().find(|report| report.name == name)
    }

    /// The names of all configured reports, in declaration order.
    pub fn report_names(&self) -> Vec<&str> {
        self.reports.iter().map(|report| report.name.as_str()).collect()
    }
}

// YAML mappings preserve document order, which plain `HashMap` fields would
// lose. Field maps deserialize through `serde_yaml::Mapping` into ordered
// pair vectors instead.
fn ordered_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let mapping = Mapping::deserialize(deserializer)?;
    mapping
        .into_iter()
        .map(|(key, value)| match (key, value) {
            (YamlValue::String(key), YamlValue::String(value)) => Ok((key, value)),
            (key, _) => Err(serde::de::Error::custom(format!(
                "expected string keys and values in mapping, got key {:?}",
                key
            ))),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    const CONFIG: &str = r#"
data:
  db_uri: "file:data/tally.db"
  template_dir: templates
  exclude_from_refresh:
    - persistent
  layout:
    - name: person
      columns: "id INTEGER PRIMARY KEY, name TEXT"
      data_source: "csv:data/person.csv"
    - name: finding
      columns: "id TEXT, title TEXT, severity TEXT"
      data_source: "xml:.//finding"
      input_map:
        id: id
        title: title
      input_map_parametrized:
        severity: ".//severity[finding-id='{id}']/level"
reports:
  - name: summary
    template_file: summary.hbs
    template_params:
      - query: "SELECT * FROM finding WHERE severity = '{level}'"
        var_mapping:
          findings: "*"
          first_title: title
"#;

    #[test]
    fn parse_full_config() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        assert_eq!(config.data.db_uri, "file:data/tally.db");
        assert_eq!(config.data.exclude_from_refresh, vec!["persistent"]);
        assert_eq!(config.data.layout.len(), 2);
        assert_eq!(config.reports.len(), 1);
    }

    #[test]
    fn field_maps_preserve_declaration_order() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        let finding = &config.data.layout[1];
        let fields: Vec<&str> = finding.input_map.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(fields, vec!["id", "title"]);
        assert_eq!(finding.input_map_parametrized[0].0, "severity");

        let report = &config.reports[0];
        let vars: Vec<&str> = report.template_params[0]
            .var_mapping
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(vars, vec!["findings", "first_title"]);
    }

    #[test]
    fn optional_sections_default_to_empty() {
        let config: Config =
            serde_yaml::from_str("data:\n  db_uri: test.db\n").unwrap();
        assert!(config.data.layout.is_empty());
        assert!(config.data.exclude_from_refresh.is_empty());
        assert!(config.reports.is_empty());
        assert!(config.report("anything").is_none());
    }

    #[test]
    fn report_lookup_by_name() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        assert!(config.report("summary").is_some());
        assert!(config.report("missing").is_none());
        assert_eq!(config.report_names(), vec!["summary"]);
    }
}
