//! Whole-document cleanup passes over the rendered text.

use std::collections::BTreeSet;

use regex::{Captures, Regex};

use crate::error::Result;
use crate::notation::MmlSymbols;

/// Run every pass in order.
pub fn post_process(text: &str, symbols: &MmlSymbols) -> Result<String> {
    let text = remove_unused_macros(text)?;
    let text = collapse_expression(&text, &symbols.volume_macro)?;
    collapse_velocity(&text, &symbols.volume_macro)
}

/// Drop definition lines whose macro name is never invoked.
pub fn remove_unused_macros(text: &str) -> Result<String> {
    let definition = Regex::new(r#"(?m)^"([^"=\s]+)\s*=[^"\n]*"\n"#)?;
    let unused: BTreeSet<&str> = definition
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str())
        .filter(|name| text.matches(name).count() <= 1)
        .collect();
    if unused.is_empty() {
        return Ok(text.to_string());
    }
    tracing::debug!(?unused, "removing unused macros");

    let pruned = definition.replace_all(text, |caps: &Captures| {
        if unused.contains(&caps[1]) {
            String::new()
        } else {
            caps[0].to_string()
        }
    });
    Ok(pruned.into_owned())
}

/// Remove the `E..` field from volume macro names when every name shares it.
pub fn collapse_expression(text: &str, volume_macro: &str) -> Result<String> {
    let prefix = regex::escape(volume_macro);
    let pattern = Regex::new(&format!(
        "({prefix}[0-9A-F]{{2}})(Q[0-9A-F]{{2}})(E[0-9A-F]{{2}})"
    ))?;
    collapse(text, &pattern, 3, "$1$2")
}

/// Remove the `Q..` field from volume macro names when every name shares it.
pub fn collapse_velocity(text: &str, volume_macro: &str) -> Result<String> {
    let prefix = regex::escape(volume_macro);
    let pattern = Regex::new(&format!("({prefix}[0-9A-F]{{2}})(Q[0-9A-F]{{2}})"))?;
    collapse(text, &pattern, 2, "$1")
}

fn collapse(text: &str, pattern: &Regex, field: usize, replacement: &str) -> Result<String> {
    let values: BTreeSet<&str> = pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(field))
        .map(|m| m.as_str())
        .collect();
    if values.len() > 1 {
        return Ok(text.to_string());
    }
    Ok(pattern.replace_all(text, replacement).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = "; Instrument macros\n\"I05 = @30\"\n\"I06 = @31\"\n\n; Pan macros\n\n; Volume macros\n\"V64Q64E7FP40 = v158\"\n\"V50Q64E7FP40 = v126\"\n\nI05V64Q64E7FP40o3c4V50Q64E7FP40c4\n";

    #[test]
    fn test_unused_macro_removed() {
        let out = remove_unused_macros(DOCUMENT).unwrap();
        assert!(!out.contains("I06"));
        assert!(out.contains("\"I05 = @30\"\n"));
        assert!(out.contains("\"V50Q64E7FP40 = v126\"\n"));
    }

    #[test]
    fn test_shared_fields_collapse() {
        let out = post_process(DOCUMENT, &MmlSymbols::default()).unwrap();
        assert!(out.contains("\"V64P40 = v158\"\n"));
        assert!(out.ends_with("I05V64P40o3c4V50P40c4\n"));
        assert!(!out.contains("E7F"));
    }

    #[test]
    fn test_distinct_fields_kept() {
        let text = "V64Q64E7FP40c4V64Q50E70P40c4\n";
        let out = collapse_expression(text, "V").unwrap();
        assert_eq!(out, text);
        let out = collapse_velocity(text, "V").unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_velocity_collapses_after_expression() {
        let text = "V64Q64E7Fc4V64Q64E70c4\n";
        let out = post_process(text, &MmlSymbols::default()).unwrap();
        assert_eq!(out, "V64E7Fc4V64E70c4\n");
    }
}
