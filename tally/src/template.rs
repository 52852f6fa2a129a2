//! Template-related utility methods.
//!
//! Query templates and parametrized field locators both use `{name}`
//! placeholders. `{{` and `}}` escape literal braces.

use crate::Error;

/// Extract the placeholder names referenced by the given template, in order
/// of appearance. Duplicates are preserved.
pub fn placeholders(template: &str) -> Result<Vec<String>, Error> {
    let mut names = Vec::new();
    scan(template, |name| {
        names.push(name.to_string());
        Ok(String::new())
    })?;
    Ok(names)
}

/// Expand every placeholder in the given template using the supplied
/// `(name, value)` pairs. When a name occurs more than once among the pairs,
/// the last occurrence wins. A placeholder with no matching pair produces
/// [`Error::UnresolvedPlaceholder`].
pub fn substitute(template: &str, values: &[(String, String)]) -> Result<String, Error> {
    scan(template, |name| {
        values
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| Error::UnresolvedPlaceholder(name.to_string(), template.to_string()))
    })
}

// Walks the template, invoking `resolve` for each placeholder and splicing
// its result into the output.
fn scan<F>(template: &str, mut resolve: F) -> Result<String, Error>
where
    F: FnMut(&str) -> Result<String, Error>,
{
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    output.push('{');
                    continue;
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(Error::InvalidPlaceholder(template.to_string()));
                        }
                    }
                }
                if name.is_empty() {
                    return Err(Error::InvalidPlaceholder(template.to_string()));
                }
                output.push_str(&resolve(&name)?);
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                output.push('}');
            }
            _ => output.push(c),
        }
    }
    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn extract_placeholders_in_order() {
        let names =
            placeholders("SELECT * FROM t WHERE a = '{first}' AND b = '{second}'").unwrap();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn extract_preserves_duplicates() {
        let names = placeholders("{x} and {x}").unwrap();
        assert_eq!(names, vec!["x", "x"]);
    }

    #[test]
    fn escaped_braces_are_not_placeholders() {
        assert!(placeholders("{{not_one}}").unwrap().is_empty());
        let out = substitute("{{raw}} {value}", &pairs(&[("value", "v")])).unwrap();
        assert_eq!(out, "{raw} v");
    }

    #[test]
    fn unterminated_placeholder_fails() {
        assert!(matches!(
            placeholders("SELECT {oops"),
            Err(Error::InvalidPlaceholder(_))
        ));
        assert!(matches!(
            placeholders("SELECT {}"),
            Err(Error::InvalidPlaceholder(_))
        ));
    }

    #[test]
    fn substitute_last_value_wins() {
        let values = pairs(&[("key", "first"), ("key", "second")]);
        assert_eq!(substitute("{key}", &values).unwrap(), "second");
    }

    #[test]
    fn substitute_missing_value_fails() {
        let err = substitute("{missing}", &[]).unwrap_err();
        match err {
            Error::UnresolvedPlaceholder(name, _) => assert_eq!(name, "missing"),
            other => panic!("unexpected error: {}", other),
        }
    }
}
