//! Named SQL fragment catalog.
//!
//! Query text lives in `src/sql/*.sql` files embedded at compile time. A
//! directive line `-- :name <ident>` starts a fragment; `-- :clause <ident>`
//! and `-- :endclause` delimit an optional section inside it, letting one
//! template yield several related query variants (for example `get_page`
//! with and without the content body). Unknown fragment or clause names fail
//! when services render their queries at construction, before any command
//! runs.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{file}:{line}: malformed directive: {text:?}")]
    MalformedDirective { file: String, line: usize, text: String },

    #[error("{file}:{line}: duplicate query name {name:?}")]
    DuplicateName { file: String, line: usize, name: String },

    #[error("{file}:{line}: SQL text before the first :name directive")]
    TextBeforeName { file: String, line: usize },

    #[error("{file}:{line}: :clause directive outside a query")]
    ClauseOutsideQuery { file: String, line: usize },

    #[error("{file}:{line}: nested :clause directive")]
    NestedClause { file: String, line: usize },

    #[error("{file}:{line}: :endclause without an open clause")]
    UnmatchedEndClause { file: String, line: usize },

    #[error("{file}: unterminated clause {name:?} in query {query:?}")]
    UnterminatedClause { file: String, name: String, query: String },

    #[error("{file}: unknown query {name:?}")]
    UnknownQuery { file: String, name: String },

    #[error("{file}: query {query:?} has no clause {clause:?}")]
    UnknownClause { file: String, query: String, clause: String },
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Clause { name: String, text: String },
}

/// One named fragment, possibly containing optional clauses.
#[derive(Debug, Clone)]
pub struct Query {
    file: String,
    name: String,
    segments: Vec<Segment>,
    clause_names: BTreeSet<String>,
}

impl Query {
    /// Render with every optional clause included.
    pub fn sql(&self) -> String {
        self.render(|_| true)
    }

    /// Render including only the named clauses. Fails on a clause name the
    /// query does not define.
    pub fn with(&self, clauses: &[&str]) -> Result<String, CatalogError> {
        for clause in clauses {
            if !self.clause_names.contains(*clause) {
                return Err(CatalogError::UnknownClause {
                    file: self.file.clone(),
                    query: self.name.clone(),
                    clause: (*clause).to_string(),
                });
            }
        }
        Ok(self.render(|name| clauses.contains(&name)))
    }

    fn render(&self, include: impl Fn(&str) -> bool) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Clause { name, text } if include(name) => out.push_str(text),
                Segment::Clause { .. } => {}
            }
        }
        out.trim_end().to_string()
    }
}

/// A parsed catalog of named queries from one source file.
#[derive(Debug)]
pub struct Catalog {
    file: String,
    queries: BTreeMap<String, Query>,
}

impl Catalog {
    pub fn parse(file: &str, source: &str) -> Result<Self, CatalogError> {
        let mut queries: BTreeMap<String, Query> = BTreeMap::new();
        let mut current: Option<Query> = None;
        let mut open_clause: Option<String> = None;

        let finish = |queries: &mut BTreeMap<String, Query>, query: Query| {
            queries.insert(query.name.clone(), query);
        };

        for (idx, raw) in source.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();

            if let Some(directive) = trimmed.strip_prefix("-- :") {
                let mut words = directive.split_whitespace();
                match words.next() {
                    Some("name") => {
                        let name = words.next().ok_or_else(|| CatalogError::MalformedDirective {
                            file: file.to_string(),
                            line,
                            text: raw.to_string(),
                        })?;
                        if words.next().is_some() || !is_identifier(name) {
                            return Err(CatalogError::MalformedDirective {
                                file: file.to_string(),
                                line,
                                text: raw.to_string(),
                            });
                        }
                        if let Some(clause) = open_clause.take() {
                            let query = current.as_ref().map(|q| q.name.clone()).unwrap_or_default();
                            return Err(CatalogError::UnterminatedClause {
                                file: file.to_string(),
                                name: clause,
                                query,
                            });
                        }
                        if let Some(done) = current.take() {
                            finish(&mut queries, done);
                        }
                        if queries.contains_key(name) {
                            return Err(CatalogError::DuplicateName {
                                file: file.to_string(),
                                line,
                                name: name.to_string(),
                            });
                        }
                        current = Some(Query {
                            file: file.to_string(),
                            name: name.to_string(),
                            segments: Vec::new(),
                            clause_names: BTreeSet::new(),
                        });
                    }
                    Some("clause") => {
                        let name = words.next().ok_or_else(|| CatalogError::MalformedDirective {
                            file: file.to_string(),
                            line,
                            text: raw.to_string(),
                        })?;
                        if words.next().is_some() || !is_identifier(name) {
                            return Err(CatalogError::MalformedDirective {
                                file: file.to_string(),
                                line,
                                text: raw.to_string(),
                            });
                        }
                        if current.is_none() {
                            return Err(CatalogError::ClauseOutsideQuery {
                                file: file.to_string(),
                                line,
                            });
                        }
                        if open_clause.is_some() {
                            return Err(CatalogError::NestedClause { file: file.to_string(), line });
                        }
                        open_clause = Some(name.to_string());
                    }
                    Some("endclause") => {
                        let name = open_clause.take().ok_or(CatalogError::UnmatchedEndClause {
                            file: file.to_string(),
                            line,
                        })?;
                        if let Some(query) = current.as_mut() {
                            query.clause_names.insert(name);
                        }
                    }
                    _ => {
                        return Err(CatalogError::MalformedDirective {
                            file: file.to_string(),
                            line,
                            text: raw.to_string(),
                        });
                    }
                }
                continue;
            }

            match current.as_mut() {
                Some(query) => {
                    let text = format!("{raw}\n");
                    match &open_clause {
                        Some(name) => match query.segments.last_mut() {
                            Some(Segment::Clause { name: last, text: body })
                                if last.as_str() == name.as_str()
                                    && !query.clause_names.contains(name) =>
                            {
                                body.push_str(&text);
                            }
                            _ => query.segments.push(Segment::Clause {
                                name: name.clone(),
                                text,
                            }),
                        },
                        None => match query.segments.last_mut() {
                            Some(Segment::Text(body)) => body.push_str(&text),
                            _ => query.segments.push(Segment::Text(text)),
                        },
                    }
                }
                // Leading blank lines and plain comments are fine; real SQL
                // outside a fragment is not.
                None if trimmed.is_empty() || trimmed.starts_with("--") => {}
                None => {
                    return Err(CatalogError::TextBeforeName { file: file.to_string(), line });
                }
            }
        }

        if let Some(clause) = open_clause {
            let query = current.as_ref().map(|q| q.name.clone()).unwrap_or_default();
            return Err(CatalogError::UnterminatedClause {
                file: file.to_string(),
                name: clause,
                query,
            });
        }
        if let Some(done) = current {
            finish(&mut queries, done);
        }

        Ok(Self { file: file.to_string(), queries })
    }

    pub fn get(&self, name: &str) -> Result<&Query, CatalogError> {
        self.queries.get(name).ok_or_else(|| CatalogError::UnknownQuery {
            file: self.file.clone(),
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
-- a file comment

-- :name get_thing
SELECT id, name
-- :clause detail
, detail
-- :endclause
FROM things
-- :clause detail
JOIN details USING (thing_id)
-- :endclause
WHERE id = $1

-- :name count_things
SELECT COUNT(*) FROM things
";

    #[test]
    fn parses_fragments_by_name() {
        let catalog = Catalog::parse("sample.sql", SAMPLE).unwrap();
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(names, vec!["count_things", "get_thing"]);
        assert_eq!(catalog.get("count_things").unwrap().sql(), "SELECT COUNT(*) FROM things");
    }

    #[test]
    fn unknown_name_fails() {
        let catalog = Catalog::parse("sample.sql", SAMPLE).unwrap();
        assert!(matches!(
            catalog.get("missing"),
            Err(CatalogError::UnknownQuery { .. })
        ));
    }

    #[test]
    fn sql_includes_all_clauses() {
        let catalog = Catalog::parse("sample.sql", SAMPLE).unwrap();
        let sql = catalog.get("get_thing").unwrap().sql();
        assert!(sql.contains(", detail"));
        assert!(sql.contains("JOIN details USING (thing_id)"));
    }

    #[test]
    fn with_empty_excludes_every_clause() {
        let catalog = Catalog::parse("sample.sql", SAMPLE).unwrap();
        let sql = catalog.get("get_thing").unwrap().with(&[]).unwrap();
        assert!(!sql.contains("detail"));
        assert!(sql.contains("SELECT id, name"));
        assert!(sql.contains("WHERE id = $1"));
    }

    #[test]
    fn repeated_clause_name_toggles_both_sections() {
        let catalog = Catalog::parse("sample.sql", SAMPLE).unwrap();
        let sql = catalog.get("get_thing").unwrap().with(&["detail"]).unwrap();
        assert!(sql.contains(", detail"));
        assert!(sql.contains("JOIN details USING (thing_id)"));
        assert_eq!(sql, catalog.get("get_thing").unwrap().sql());
    }

    #[test]
    fn unknown_clause_fails() {
        let catalog = Catalog::parse("sample.sql", SAMPLE).unwrap();
        assert!(matches!(
            catalog.get("get_thing").unwrap().with(&["nope"]),
            Err(CatalogError::UnknownClause { .. })
        ));
    }

    #[test]
    fn duplicate_names_fail() {
        let src = "-- :name a\nSELECT 1\n-- :name a\nSELECT 2\n";
        assert!(matches!(
            Catalog::parse("dup.sql", src),
            Err(CatalogError::DuplicateName { line: 3, .. })
        ));
    }

    #[test]
    fn text_before_first_name_fails() {
        let src = "SELECT 1\n-- :name a\nSELECT 2\n";
        assert!(matches!(
            Catalog::parse("bad.sql", src),
            Err(CatalogError::TextBeforeName { line: 1, .. })
        ));
    }

    #[test]
    fn unterminated_clause_fails() {
        let src = "-- :name a\nSELECT 1\n-- :clause c\n, extra\n";
        assert!(matches!(
            Catalog::parse("bad.sql", src),
            Err(CatalogError::UnterminatedClause { .. })
        ));
    }

    #[test]
    fn malformed_directive_fails() {
        let src = "-- :name\nSELECT 1\n";
        assert!(matches!(
            Catalog::parse("bad.sql", src),
            Err(CatalogError::MalformedDirective { line: 1, .. })
        ));
        let src = "-- :frobnicate x\n";
        assert!(matches!(
            Catalog::parse("bad.sql", src),
            Err(CatalogError::MalformedDirective { line: 1, .. })
        ));
    }

    #[test]
    fn embedded_catalogs_parse_and_expose_expected_names() {
        let wiki = Catalog::parse("wiki.sql", include_str!("sql/wiki.sql")).unwrap();
        for name in [
            "get_page",
            "get_alias",
            "get_page_no_alias",
            "create_page",
            "create_content",
            "create_revision",
            "alias_page",
            "rename_page",
            "get_content_id",
            "delete_page",
            "delete_alias",
            "get_page_revisions",
            "get_all_pages",
            "get_recent_revisions",
            "search_pages",
            "get_individual_revisions",
            "page_count",
            "revisions_count",
            "page_revisions_count",
            "page_uses",
            "total_page_uses",
            "top_pages",
            "top_editors",
            "top_page_editors",
            "log_page_use",
            "prune_page_uses",
        ] {
            wiki.get(name).unwrap();
        }
        // the partial variant leaves the contents join out
        let partial = wiki.get("get_page").unwrap().with(&[]).unwrap();
        assert!(!partial.contains("contents"));
        let full = wiki.get("get_page").unwrap().sql();
        assert!(full.contains("c.body AS content"));

        let perms = Catalog::parse("permissions.sql", include_str!("sql/permissions.sql")).unwrap();
        perms.get("permissions_for").unwrap();
        let watch = Catalog::parse("watch_lists.sql", include_str!("sql/watch_lists.sql")).unwrap();
        watch.get("get_revision_and_previous").unwrap();
        let bindings = Catalog::parse("bindings.sql", include_str!("sql/bindings.sql")).unwrap();
        bindings.get("get_bound_page").unwrap();
    }
}
