use serde_json::Value;

/// Named roots a field path may start with. Any other first segment is
/// looked up under `proposal`.
pub const ROOTS: [&str; 6] = ["proposal", "element", "sub_item", "invoice", "planning", "run"];

#[derive(Debug, Default, Clone, Copy)]
pub struct PathRoots<'a> {
    pub proposal: Option<&'a Value>,
    pub element: Option<&'a Value>,
    pub sub_item: Option<&'a Value>,
    pub invoice: Option<&'a Value>,
    pub planning: Option<&'a Value>,
    pub run: Option<&'a Value>,
}

impl<'a> PathRoots<'a> {
    fn get(&self, root: &str) -> Option<&'a Value> {
        match root {
            "proposal" => self.proposal,
            "element" => self.element,
            "sub_item" => self.sub_item,
            "invoice" => self.invoice,
            "planning" => self.planning,
            "run" => self.run,
            _ => None,
        }
    }
}

/// Resolve a dotted path such as `counterparty.name` or `element.specs.glazing.label`.
/// Numeric segments index arrays. Missing values and nulls resolve to `None`.
pub fn resolve<'a>(roots: &PathRoots<'a>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.').map(str::trim).filter(|s| !s.is_empty()).peekable();
    let first = *segments.peek()?;
    let mut current = if ROOTS.contains(&first) {
        segments.next();
        roots.get(first)?
    } else {
        roots.proposal?
    };

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_paths_resolve_against_proposal() {
        let proposal = json!({"number": "Q1", "counterparty": {"name": "Jansen", "city": null}});
        let roots = PathRoots {
            proposal: Some(&proposal),
            ..Default::default()
        };
        assert_eq!(resolve(&roots, "counterparty.name"), Some(&json!("Jansen")));
        assert_eq!(resolve(&roots, "proposal.number"), Some(&json!("Q1")));
        assert_eq!(resolve(&roots, "counterparty.city"), None);
        assert_eq!(resolve(&roots, "counterparty.street.name"), None);
    }

    #[test]
    fn numeric_segments_index_arrays() {
        let proposal = json!({"contacts": [{"name": "A"}, {"name": "B"}]});
        let roots = PathRoots {
            proposal: Some(&proposal),
            ..Default::default()
        };
        assert_eq!(resolve(&roots, "contacts.1.name"), Some(&json!("B")));
        assert_eq!(resolve(&roots, "contacts.5.name"), None);
    }

    #[test]
    fn absent_root_is_missing() {
        let proposal = json!({});
        let roots = PathRoots {
            proposal: Some(&proposal),
            ..Default::default()
        };
        assert_eq!(resolve(&roots, "element.name"), None);
    }
}
