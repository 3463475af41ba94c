use indexmap::IndexMap;

/// Maps each domain to the trigger terms exclusive to it. When a query
/// mentions a domain-exclusive term, step generation is restricted to the
/// matching domains; when nothing matches, every candidate domain is kept.
/// The table is data, not scattered conditionals, so deployments can extend
/// it.
#[derive(Debug, Clone)]
pub struct TriggerTable {
    terms: IndexMap<String, Vec<String>>,
}

impl Default for TriggerTable {
    fn default() -> Self {
        let mut table = Self {
            terms: IndexMap::new(),
        };
        table.insert(
            "email",
            &["inbox", "unread", "sender", "attachment", "email", "mail"],
        );
        table.insert(
            "calendar",
            &["meeting", "schedule", "appointment", "event", "calendar", "agenda"],
        );
        table.insert(
            "tasks",
            &["todo", "deadline", "task", "due", "checklist"],
        );
        table
    }
}

impl TriggerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            terms: IndexMap::new(),
        }
    }

    /// Registers (or replaces) the exclusive terms for a domain.
    pub fn insert(&mut self, domain: impl Into<String>, terms: &[&str]) {
        self.terms.insert(
            domain.into(),
            terms.iter().map(ToString::to_string).collect(),
        );
    }

    /// Whether the query mentions one of the domain's exclusive terms.
    #[must_use]
    pub fn matches(&self, query: &str, domain: &str) -> bool {
        let lowered = query.to_lowercase();
        self.terms
            .get(domain)
            .map_or(false, |terms| terms.iter().any(|term| lowered.contains(term)))
    }

    /// Restricts candidate domains to those whose exclusive terms matched
    /// the query; with no matches at all, every candidate is kept.
    #[must_use]
    pub fn filter(&self, query: &str, candidates: &[String]) -> Vec<String> {
        let matched: Vec<String> = candidates
            .iter()
            .filter(|domain| self.matches(query, domain))
            .cloned()
            .collect();
        if matched.is_empty() {
            candidates.to_vec()
        } else {
            matched
        }
    }
}
