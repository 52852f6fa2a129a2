//! Per-row field resolution for hierarchical sources.

use log::debug;

use crate::template;
use crate::xml::NodeRef;
use crate::{Error, Row};

/// The literal value stored for a field whose locator matches nothing. This
/// sentinel can collide with real data; the collision is a known, accepted
/// ambiguity of the configuration contract.
const UNDEFINED: &str = "undefined";

/// The ordered field mappings of one table layout.
///
/// Direct fields are located relative to the matched node. Parametrized
/// fields have their locator template expanded with already-resolved field
/// values first, then are located relative to the document root.
#[derive(Debug)]
pub struct FieldMap<'a> {
    direct: &'a [(String, String)],
    parametrized: &'a [(String, String)],
}

impl<'a> FieldMap<'a> {
    /// Constructor.
    pub fn new(
        direct: &'a [(String, String)],
        parametrized: &'a [(String, String)],
    ) -> Self {
        Self {
            direct,
            parametrized,
        }
    }

    /// Check that every parametrized locator only references fields declared
    /// before it, either in the direct map or earlier in the parametrized
    /// map. Resolution relies on this ordering.
    pub fn validate(&self) -> Result<(), Error> {
        let mut declared: Vec<&str> = self
            .direct
            .iter()
            .map(|(field, _)| field.as_str())
            .collect();
        for (field, locator) in self.parametrized {
            for reference in template::placeholders(locator)? {
                if !declared.contains(&reference.as_str()) {
                    return Err(Error::UndeclaredField(field.clone(), reference));
                }
            }
            declared.push(field);
        }
        Ok(())
    }

    /// Resolve one matched node into a row.
    pub fn resolve(&self, node: NodeRef<'_>, root: NodeRef<'_>) -> Result<Row, Error> {
        let mut row = Row::with_capacity(self.direct.len() + self.parametrized.len());
        for (field, locator) in self.direct {
            let value = match node.find(locator)? {
                Some(element) => element.text().to_string(),
                None => UNDEFINED.to_string(),
            };
            row.push((field.clone(), value));
        }
        for (field, locator) in self.parametrized {
            let expanded = template::substitute(locator, &row)?;
            debug!("Expanded locator for field '{}': '{}'", field, expanded);
            let value = match root.find(&expanded)? {
                Some(element) => element.text().to_string(),
                None => UNDEFINED.to_string(),
            };
            row.push((field.clone(), value));
        }
        Ok(row)
    }
}
