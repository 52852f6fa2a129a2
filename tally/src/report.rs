//! Report execution: parametrized queries folded into a rendered template.

use std::fs;
use std::path::Path;

use eyre::Result;
use handlebars::Handlebars;
use log::{debug, error, info};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::store::Store;
use crate::template;
use crate::{Config, Error, Report};

/// Execute the named report and return the rendered document.
///
/// `raw_params` are `KEY=VALUE` pairs substituted into each query template;
/// duplicate keys resolve last-wins. A query placeholder with no supplied
/// value aborts the report. Each query's results are bound into the shared
/// render context according to its var mapping: `"*"` binds the full list
/// of result rows, a field name binds that field's value from the first
/// row. Later bindings overwrite earlier ones with the same name.
///
/// Given identical parameters and store contents, the output is
/// byte-identical across runs.
pub fn run_report(
    store: &Store,
    config: &Config,
    report_name: &str,
    raw_params: &[String],
) -> Result<String> {
    let report = config.report(report_name).ok_or_else(|| {
        Error::UnknownReport(
            report_name.to_string(),
            config.report_names().join(", "),
        )
    })?;
    let params = parse_params(raw_params)?;
    debug!("Query parameters: {:?}", params);

    info!("Executing report template '{}'", report.name);
    let mut context = JsonMap::new();
    for param in &report.template_params {
        debug!("Preparing query '{}'", param.query);
        let tokens = template::placeholders(&param.query)?;
        debug!("Tokens used by query: {:?}", tokens);
        let sql = template::substitute(&param.query, &params)?;

        let result = match store.query(&sql) {
            Ok(result) => result,
            Err(e) => {
                // A failing query skips its bindings but not the report.
                error!("Query failed: {}", e);
                continue;
            }
        };
        let records: Vec<JsonValue> = result
            .rows
            .iter()
            .map(|row| {
                JsonValue::Object(
                    result
                        .header
                        .iter()
                        .zip(row.iter())
                        .map(|(field, value)| (field.clone(), value.clone()))
                        .collect(),
                )
            })
            .collect();
        debug!("Resulting data: {:?}", records);

        for (var, mapping) in &param.var_mapping {
            let value = if mapping == "*" {
                JsonValue::Array(records.clone())
            } else {
                records
                    .first()
                    .and_then(|record| record.get(mapping))
                    .cloned()
                    .unwrap_or(JsonValue::Null)
            };
            context.insert(var.clone(), value);
        }
    }

    let rendered = render(config, report, JsonValue::Object(context))?;
    info!("Finished report template '{}'", report.name);
    Ok(rendered)
}

// Convert CLI-style KEY=VALUE strings into substitution pairs.
fn parse_params(raw_params: &[String]) -> Result<Vec<(String, String)>, Error> {
    raw_params
        .iter()
        .map(|raw| {
            raw.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| Error::MalformedParam(raw.clone()))
        })
        .collect()
}

fn render(config: &Config, report: &Report, context: JsonValue) -> Result<String, Error> {
    let template_path = Path::new(&config.data.template_dir).join(&report.template_file);
    let content = fs::read_to_string(&template_path)
        .map_err(|e| Error::Io(template_path.display().to_string(), e))?;
    let mut hb = Handlebars::new();
    // Reports are plain text, not HTML.
    hb.register_escape_fn(handlebars::no_escape);
    hb.register_template_string(&report.name, content)?;
    hb.render(&report.name, &context)
        .map_err(|e| Error::TemplateRender(report.name.clone(), e))
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    fn fixture(template: &str, config_yaml: &str) -> (tempfile::TempDir, Config, Store) {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("report.hbs")).unwrap();
        write!(file, "{}", template).unwrap();
        let mut config: Config = serde_yaml::from_str(config_yaml).unwrap();
        config.data.template_dir = dir.path().display().to_string();

        let store = Store::open_in_memory().unwrap();
        store
            .execute("CREATE TABLE finding (id TEXT, severity TEXT)")
            .unwrap();
        for (id, severity) in [("F-1", "high"), ("F-2", "high"), ("F-3", "low")] {
            store
                .execute(&format!(
                    "INSERT INTO finding VALUES ('{}', '{}')",
                    id, severity
                ))
                .unwrap();
        }
        (dir, config, store)
    }

    const CONFIG: &str = r#"
data:
  db_uri: unused.db
reports:
  - name: summary
    template_file: report.hbs
    template_params:
      - query: "SELECT id, severity FROM finding WHERE severity = '{level}' ORDER BY id"
        var_mapping:
          findings: "*"
          first_id: id
"#;

    #[test]
    fn wildcard_binds_the_full_result_list() {
        let (_dir, config, store) =
            fixture("{{#each findings}}{{id}};{{/each}}", CONFIG);
        let out = run_report(
            &store,
            &config,
            "summary",
            &["level=high".to_string()],
        )
        .unwrap();
        assert_eq!(out, "F-1;F-2;");
    }

    #[test]
    fn scalar_binds_from_the_first_row_only() {
        let (_dir, config, store) = fixture("first={{first_id}}", CONFIG);
        let out = run_report(
            &store,
            &config,
            "summary",
            &["level=high".to_string()],
        )
        .unwrap();
        assert_eq!(out, "first=F-1");
    }

    #[test]
    fn empty_result_binds_an_empty_list_and_null_scalar() {
        let (_dir, config, store) = fixture(
            "[{{#each findings}}{{id}}{{/each}}] first={{first_id}}",
            CONFIG,
        );
        let out = run_report(
            &store,
            &config,
            "summary",
            &["level=nothing".to_string()],
        )
        .unwrap();
        assert_eq!(out, "[] first=");
    }

    #[test]
    fn duplicate_params_resolve_last_wins() {
        let (_dir, config, store) = fixture("{{#each findings}}{{id}};{{/each}}", CONFIG);
        let out = run_report(
            &store,
            &config,
            "summary",
            &["level=high".to_string(), "level=low".to_string()],
        )
        .unwrap();
        assert_eq!(out, "F-3;");
    }

    #[test]
    fn unknown_report_names_the_available_ones() {
        let (_dir, config, store) = fixture("x", CONFIG);
        let err = run_report(&store, &config, "nope", &[]).unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        match err {
            Error::UnknownReport(name, available) => {
                assert_eq!(name, "nope");
                assert!(available.contains("summary"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn missing_placeholder_value_is_fatal() {
        let (_dir, config, store) = fixture("x", CONFIG);
        let err = run_report(&store, &config, "summary", &[]).unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        assert!(matches!(err, Error::UnresolvedPlaceholder(name, _) if name == "level"));
    }

    #[test]
    fn malformed_param_is_rejected() {
        let (_dir, config, store) = fixture("x", CONFIG);
        let err = run_report(&store, &config, "summary", &["no-equals".to_string()])
            .unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        assert!(matches!(err, Error::MalformedParam(_)));
    }

    #[test]
    fn rendering_is_not_html_escaped() {
        let (_dir, config, store) = fixture("{{first_id}}", CONFIG);
        store
            .execute("INSERT INTO finding VALUES ('<&>', 'raw')")
            .unwrap();
        let out = run_report(
            &store,
            &config,
            "summary",
            &["level=raw".to_string()],
        )
        .unwrap();
        assert_eq!(out, "<&>");
    }

    #[test]
    fn repeated_runs_render_identical_output() {
        let (_dir, config, store) =
            fixture("{{#each findings}}{{id}}:{{severity}};{{/each}}", CONFIG);
        let params = vec!["level=high".to_string()];
        let first = run_report(&store, &config, "summary", &params).unwrap();
        let second = run_report(&store, &config, "summary", &params).unwrap();
        assert_eq!(first, second);
    }
}
