//! Per record-type query templates.
//!
//! Templates use the `{{.Name}}` / `{{.Type}}` action syntax. The leading dot and
//! whitespace inside the braces are optional, so `{{Name}}` and `{{ .Type }}` are
//! accepted too.

use std::collections::BTreeMap;
use std::fmt;

use hickory_proto::rr::RecordType;
use serde::Deserialize;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Errors raised while parsing or rendering a query template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("unclosed action starting at offset {offset}")]
    Unclosed { offset: usize },

    #[error("unexpected '}}}}' at offset {offset}")]
    StrayClose { offset: usize },

    #[error("empty action at offset {offset}")]
    EmptyAction { offset: usize },

    #[error("unknown template variable {name:?} at offset {offset}")]
    UnknownVariable { name: String, offset: usize },

    #[error("name placeholder at offset {offset} is part of a larger quoted literal and cannot be bound")]
    QuotedPlaceholder { offset: usize },
}

/// How the query name is placed into the rendered statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Pass the name as a bound parameter.
    #[default]
    Bind,

    /// Substitute the name text directly into the SQL, without escaping.
    Interpolate,
}

/// Positional parameter marker used by a database driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `$1`, `$2`, ... (PostgreSQL)
    Dollar,

    /// `?` (MySQL, SQLite)
    Question,
}

impl Placeholder {
    fn marker(self, index: usize) -> String {
        match self {
            Placeholder::Dollar => format!("${index}"),
            Placeholder::Question => "?".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    Name,
    Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'t> {
    Text(&'t str),
    Var { variable: Variable, offset: usize },
}

fn parse(source: &str) -> Result<Vec<Segment<'_>>, RenderError> {
    let mut segments = Vec::new();
    let mut position = 0;

    while position < source.len() {
        let rest = &source[position..];
        let Some(start) = rest.find(OPEN) else {
            check_stray_close(rest, position)?;
            segments.push(Segment::Text(rest));
            break;
        };

        if start > 0 {
            check_stray_close(&rest[..start], position)?;
            segments.push(Segment::Text(&rest[..start]));
        }

        let offset = position + start;
        let inner_start = offset + OPEN.len();
        let Some(length) = source[inner_start..].find(CLOSE) else {
            return Err(RenderError::Unclosed { offset });
        };

        let action = source[inner_start..inner_start + length].trim();
        let action = action.strip_prefix('.').unwrap_or(action);
        let variable = match action {
            "" => return Err(RenderError::EmptyAction { offset }),
            "Name" => Variable::Name,
            "Type" => Variable::Type,
            other => {
                return Err(RenderError::UnknownVariable {
                    name: other.to_owned(),
                    offset,
                });
            }
        };
        segments.push(Segment::Var { variable, offset });
        position = inner_start + length + CLOSE.len();
    }

    Ok(segments)
}

fn check_stray_close(text: &str, position: usize) -> Result<(), RenderError> {
    match text.find(CLOSE) {
        Some(index) => Err(RenderError::StrayClose {
            offset: position + index,
        }),
        None => Ok(()),
    }
}

/// A query ready to be executed: SQL text and the values bound to its markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    binds: Vec<String>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Values for the positional markers, in order.
    pub fn binds(&self) -> &[String] {
        &self.binds
    }

    pub fn is_parameterized(&self) -> bool {
        !self.binds.is_empty()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A single query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    source: String,
}

impl QueryTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check that the template renders in `mode`.
    ///
    /// Rendering failures depend only on the template and the mode, never on the
    /// queried name, so a template that passes here renders for every query.
    pub fn validate(&self, mode: QueryMode) -> Result<(), RenderError> {
        self.render(".", RecordType::A, mode, Placeholder::Question)
            .map(|_| ())
    }

    /// Render the template for a query name and type.
    ///
    /// In [`QueryMode::Bind`] every `Name` action becomes a positional marker and the
    /// name is recorded as a bind value. When the action is the whole content of a
    /// quoted literal (`'{{.Name}}'` or `"{{.Name}}"`) the quotes are removed along
    /// with it.
    /// `Type` is always written as its numeric code.
    pub fn render(
        &self,
        name: &str,
        record_type: RecordType,
        mode: QueryMode,
        placeholder: Placeholder,
    ) -> Result<Statement, RenderError> {
        let segments = parse(&self.source)?;
        let mut sql = String::with_capacity(self.source.len() + name.len());
        let mut binds = Vec::new();
        let mut skip_quote = false;

        for (index, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Text(text) => {
                    let text = if skip_quote {
                        skip_quote = false;
                        &text[1..]
                    } else {
                        text
                    };
                    sql.push_str(text);
                }
                Segment::Var {
                    variable: Variable::Type,
                    ..
                } => {
                    sql.push_str(&u16::from(record_type).to_string());
                }
                Segment::Var {
                    variable: Variable::Name,
                    ..
                } if mode == QueryMode::Interpolate => {
                    sql.push_str(name);
                }
                Segment::Var {
                    variable: Variable::Name,
                    offset,
                } => {
                    if let Some(quote) = open_quote(&sql) {
                        let closes = match segments.get(index + 1) {
                            Some(Segment::Text(next)) => {
                                next.starts_with(quote) && !next[1..].starts_with(quote)
                            }
                            _ => false,
                        };
                        if !closes || !sql.ends_with(quote) {
                            return Err(RenderError::QuotedPlaceholder { offset: *offset });
                        }
                        sql.pop();
                        if sql.ends_with(quote) {
                            return Err(RenderError::QuotedPlaceholder { offset: *offset });
                        }
                        skip_quote = true;
                    }
                    binds.push(name.to_owned());
                    sql.push_str(&placeholder.marker(binds.len()));
                }
            }
        }

        Ok(Statement { sql, binds })
    }
}

/// The quote character of the literal left open at the end of `sql`, if any.
///
/// A doubled quote inside a literal closes and reopens it, which leaves the
/// state unchanged.
fn open_quote(sql: &str) -> Option<char> {
    let mut open = None;
    for c in sql.chars() {
        match open {
            None if c == '\'' || c == '"' => open = Some(c),
            Some(quote) if c == quote => open = None,
            _ => {}
        }
    }
    open
}

impl From<&str> for QueryTemplate {
    fn from(value: &str) -> Self {
        QueryTemplate::new(value)
    }
}

impl From<String> for QueryTemplate {
    fn from(value: String) -> Self {
        QueryTemplate::new(value)
    }
}

/// The set of templates, at most one per record type.
#[derive(Debug, Clone, Default)]
pub struct QueryTemplates {
    templates: BTreeMap<RecordType, QueryTemplate>,
}

impl QueryTemplates {
    pub const DEFAULT_A: &'static str =
        "SELECT name, ttl, addr FROM a_record WHERE name = '{{.Name}}'";
    pub const DEFAULT_AAAA: &'static str =
        "SELECT name, ttl, addr FROM aaaa_record WHERE name = '{{.Name}}'";
    pub const DEFAULT_CNAME: &'static str =
        "SELECT name, ttl, target FROM cname_record WHERE name = '{{.Name}}'";

    pub fn new() -> Self {
        Self::default()
    }

    /// Templates for A, AAAA and CNAME against the conventional `*_record` tables.
    pub fn with_defaults() -> Self {
        let mut templates = Self::new();
        templates.insert(RecordType::A, Self::DEFAULT_A);
        templates.insert(RecordType::AAAA, Self::DEFAULT_AAAA);
        templates.insert(RecordType::CNAME, Self::DEFAULT_CNAME);
        templates
    }

    /// Set the template for a record type, returning the one it replaces.
    pub fn insert(
        &mut self,
        record_type: RecordType,
        template: impl Into<QueryTemplate>,
    ) -> Option<QueryTemplate> {
        self.templates.insert(record_type, template.into())
    }

    pub fn get(&self, record_type: RecordType) -> Option<&QueryTemplate> {
        self.templates.get(&record_type)
    }

    pub fn types(&self) -> impl Iterator<Item = RecordType> + '_ {
        self.templates.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = "www.example.org.";

    fn render(source: &str, mode: QueryMode) -> Result<Statement, RenderError> {
        QueryTemplate::new(source).render(NAME, RecordType::A, mode, Placeholder::Dollar)
    }

    #[test]
    fn interpolate_substitutes_name_and_type() {
        let statement = render(
            "SELECT name, ttl, addr FROM records WHERE name = '{{.Name}}' AND type = {{.Type}}",
            QueryMode::Interpolate,
        )
        .unwrap();

        assert_eq!(
            statement.sql(),
            "SELECT name, ttl, addr FROM records WHERE name = 'www.example.org.' AND type = 1"
        );
        assert!(!statement.is_parameterized());
    }

    #[test]
    fn action_spelling_variants() {
        for source in ["'{{Name}}'", "'{{.Name}}'", "'{{ .Name }}'", "'{{  Name\t}}'"] {
            let statement = render(source, QueryMode::Interpolate).unwrap();
            assert_eq!(statement.sql(), "'www.example.org.'", "{source}");
        }
    }

    #[test]
    fn render_is_deterministic() {
        let template = QueryTemplate::new(QueryTemplates::DEFAULT_A);
        for mode in [QueryMode::Bind, QueryMode::Interpolate] {
            let first = template.render(NAME, RecordType::A, mode, Placeholder::Dollar);
            let second = template.render(NAME, RecordType::A, mode, Placeholder::Dollar);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn bind_replaces_quoted_literal() {
        let statement = render(QueryTemplates::DEFAULT_A, QueryMode::Bind).unwrap();
        assert_eq!(
            statement.sql(),
            "SELECT name, ttl, addr FROM a_record WHERE name = $1"
        );
        assert_eq!(statement.binds(), [NAME.to_owned()]);
    }

    #[test]
    fn bind_numbers_markers_for_postgres() {
        let statement = render(
            "SELECT n, t, a FROM r WHERE name = {{.Name}} OR alias = '{{.Name}}' AND t = '{{.Type}}'",
            QueryMode::Bind,
        )
        .unwrap();
        assert_eq!(
            statement.sql(),
            "SELECT n, t, a FROM r WHERE name = $1 OR alias = $2 AND t = '1'"
        );
        assert_eq!(statement.binds().len(), 2);
    }

    #[test]
    fn bind_question_markers() {
        let statement = QueryTemplate::new(QueryTemplates::DEFAULT_CNAME)
            .render(NAME, RecordType::CNAME, QueryMode::Bind, Placeholder::Question)
            .unwrap();
        assert_eq!(
            statement.sql(),
            "SELECT name, ttl, target FROM cname_record WHERE name = ?"
        );
    }

    #[test]
    fn bind_never_places_name_in_sql() {
        let hostile = "x' OR '1'='1.example.org.";
        let statement = QueryTemplate::new(QueryTemplates::DEFAULT_A)
            .render(hostile, RecordType::A, QueryMode::Bind, Placeholder::Question)
            .unwrap();
        assert!(!statement.sql().contains(hostile));
        assert_eq!(statement.binds(), [hostile.to_owned()]);
    }

    #[test]
    fn bind_replaces_double_quoted_literal() {
        let template = QueryTemplate::new("SELECT name, ttl, addr FROM a WHERE name = \"{{.Name}}\"");
        let statement = template
            .render(NAME, RecordType::A, QueryMode::Bind, Placeholder::Question)
            .unwrap();
        assert_eq!(statement.sql(), "SELECT name, ttl, addr FROM a WHERE name = ?");
        assert_eq!(statement.binds(), [NAME.to_owned()]);

        // Quotes of the other kind inside a literal do not open one.
        let statement = render(
            "SELECT \"it's\" FROM r WHERE name = '{{.Name}}'",
            QueryMode::Bind,
        )
        .unwrap();
        assert_eq!(statement.sql(), "SELECT \"it's\" FROM r WHERE name = $1");

        let error = render(
            "SELECT name FROM r WHERE name LIKE \"%{{.Name}}\"",
            QueryMode::Bind,
        )
        .unwrap_err();
        assert!(matches!(error, RenderError::QuotedPlaceholder { .. }));
    }

    #[test]
    fn bind_rejects_embedded_placeholder() {
        let error = render(
            "SELECT name FROM r WHERE name LIKE '%{{.Name}}'",
            QueryMode::Bind,
        )
        .unwrap_err();
        assert_eq!(error, RenderError::QuotedPlaceholder { offset: 37 });

        let error = render("SELECT 'it''{{.Name}}'", QueryMode::Bind).unwrap_err();
        assert!(matches!(error, RenderError::QuotedPlaceholder { .. }));

        // Interpolation has no such restriction.
        assert!(
            render("SELECT name FROM r WHERE name LIKE '%{{.Name}}'", QueryMode::Interpolate)
                .is_ok()
        );
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(
            render("SELECT '{{.Name'", QueryMode::Bind).unwrap_err(),
            RenderError::Unclosed { offset: 8 }
        );
        assert_eq!(
            render("SELECT {{ }}", QueryMode::Bind).unwrap_err(),
            RenderError::EmptyAction { offset: 7 }
        );
        assert_eq!(
            render("SELECT {{.Zone}}", QueryMode::Bind).unwrap_err(),
            RenderError::UnknownVariable {
                name: "Zone".into(),
                offset: 7
            }
        );
        assert_eq!(
            render("SELECT }} {{.Name}}", QueryMode::Bind).unwrap_err(),
            RenderError::StrayClose { offset: 7 }
        );
    }

    #[test]
    fn validate_matches_render() {
        for mode in [QueryMode::Bind, QueryMode::Interpolate] {
            assert!(QueryTemplate::new(QueryTemplates::DEFAULT_AAAA).validate(mode).is_ok());
            assert!(QueryTemplate::new("SELECT {{.Nope}}").validate(mode).is_err());
            assert!(QueryTemplate::new("SELECT 1").validate(mode).is_ok());
        }

        let suffix = QueryTemplate::new("SELECT name FROM r WHERE name LIKE '%{{.Name}}'");
        assert_eq!(
            suffix.validate(QueryMode::Bind),
            Err(RenderError::QuotedPlaceholder { offset: 37 })
        );
        assert!(suffix.validate(QueryMode::Interpolate).is_ok());
    }

    #[test]
    fn defaults() {
        let templates = QueryTemplates::with_defaults();
        assert_eq!(templates.len(), 3);
        for record_type in [RecordType::A, RecordType::AAAA, RecordType::CNAME] {
            assert!(templates.types().any(|t| t == record_type), "{record_type}");
        }
        assert!(templates.get(RecordType::MX).is_none());
    }
}
