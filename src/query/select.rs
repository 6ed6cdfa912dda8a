use thiserror::Error;

/// A statement that cannot be rendered. Never send these to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Select statement must have at least one field")]
    NoFields,
    #[error("Select statement must have at least one target table")]
    NoTables,
}

/// One selected column, optionally aliased: `html_url url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub key: String,
    pub label: Option<String>,
}

impl Column {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            label: None,
        }
    }

    pub fn labeled(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: Some(label.to_string()),
        }
    }
}

impl From<(&str, &str)> for Column {
    fn from((key, label): (&str, &str)) -> Self {
        if label.is_empty() {
            Column::new(key)
        } else {
            Column::labeled(key, label)
        }
    }
}

/// Legacy-SQL `SELECT` statement assembled one clause at a time.
///
/// Every method borrows the builder and hands back a new value, so a partly
/// built query can be branched into several variants:
///
/// ```
/// use issue_digest::query::select::{select_all, in_list};
///
/// let base = select_all().from(["githubarchive.day.20170801"]);
/// let issues = base.filter(&in_list("type", ["IssuesEvent"]));
/// let comments = base.filter(&in_list("type", ["IssueCommentEvent"]));
/// assert_ne!(issues.sql().unwrap(), comments.sql().unwrap());
/// assert_eq!(base.sql().unwrap(), "SELECT * FROM githubarchive.day.20170801");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectBuilder {
    fields: Vec<String>,
    tables: Vec<String>,
    conditions: Vec<String>,
    order_bys: Vec<String>,
    limit: Option<u64>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append columns. With `json_source` set, each key becomes
    /// `JSON_EXTRACT_SCALAR(<json_source>,'$.<key>')`.
    pub fn select<C>(&self, columns: &[C], json_source: Option<&str>) -> Self
    where
        C: Clone + Into<Column>,
    {
        let mut next = self.clone();
        for column in columns {
            let column: Column = column.clone().into();
            let mut field = match json_source {
                Some(source) => json_extract(source, &column.key),
                None => column.key,
            };
            if let Some(label) = column.label.filter(|l| !l.is_empty()) {
                field.push(' ');
                field.push_str(&label);
            }
            next.fields.push(field);
        }
        next
    }

    /// Replace any selected columns with `*`.
    pub fn select_all(&self) -> Self {
        let mut next = self.clone();
        next.fields = vec!["*".to_string()];
        next
    }

    /// Append source tables; empty names are ignored.
    pub fn from<I, S>(&self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.tables.extend(
            tables
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty()),
        );
        next
    }

    /// Set the first condition. Once any condition exists this is `and`.
    pub fn filter(&self, condition: &str) -> Self {
        self.and([condition])
    }

    pub fn and<I, S>(&self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_conditions("AND ", conditions)
    }

    pub fn or<I, S>(&self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_conditions("OR ", conditions)
    }

    fn add_conditions<I, S>(&self, operator: &str, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        for condition in conditions.into_iter().map(Into::into) {
            if condition.is_empty() {
                continue;
            }
            if next.conditions.is_empty() {
                next.conditions.push(condition);
            } else {
                next.conditions.push(format!("{}{}", operator, condition));
            }
        }
        next
    }

    pub fn order_by<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.order_bys.extend(fields.into_iter().map(Into::into));
        next
    }

    pub fn limit(&self, limit: u64) -> Self {
        let mut next = self.clone();
        next.limit = Some(limit);
        next
    }

    /// True when neither columns nor tables have been chosen yet.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.tables.is_empty()
    }

    /// Render `SELECT .. FROM .. [WHERE ..] [ORDER BY ..] [LIMIT n]`.
    pub fn sql(&self) -> Result<String, QueryError> {
        if self.fields.is_empty() {
            return Err(QueryError::NoFields);
        }
        if self.tables.is_empty() {
            return Err(QueryError::NoTables);
        }

        let mut query = format!(
            "SELECT {} FROM {}",
            self.fields.join(", "),
            self.tables.join(", ")
        );
        if !self.conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&self.conditions.join(" "));
        }
        if !self.order_bys.is_empty() {
            query.push_str(" ORDER BY ");
            query.push_str(&self.order_bys.join(", "));
        }
        if let Some(limit) = self.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(query)
    }
}

/// Start a builder with the given columns.
pub fn select<C>(columns: &[C], json_source: Option<&str>) -> SelectBuilder
where
    C: Clone + Into<Column>,
{
    SelectBuilder::new().select(columns, json_source)
}

pub fn select_all() -> SelectBuilder {
    SelectBuilder::new().select_all()
}

/// `json_extract("payload", "action")` -> `JSON_EXTRACT_SCALAR(payload,'$.action')`
pub fn json_extract(source: &str, path: &str) -> String {
    format!("JSON_EXTRACT_SCALAR({},'$.{}')", source, path)
}

// ── Predicates ───────────────────────────────────────────────────────

fn list_predicate<I, S>(prefix: String, values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let quoted: Vec<String> = values
        .into_iter()
        .map(|v| format!("'{}'", v.as_ref().replace('\'', "\\'")))
        .collect();
    format!("{} ({})", prefix, quoted.join(","))
}

/// `field IN ('a','b')`
pub fn in_list<I, S>(field: &str, values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    list_predicate(format!("{} IN", field), values)
}

pub fn not_in<I, S>(field: &str, values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    list_predicate(format!("{} NOT IN", field), values)
}

pub fn like<I, S>(field: &str, values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    list_predicate(format!("{} LIKE", field), values)
}

pub fn not_like<I, S>(field: &str, values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    list_predicate(format!("{} NOT LIKE", field), values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_with_label() {
        let sql = select(&[("html_url", "url")], None).from(["issues"]).sql().unwrap();
        assert_eq!(sql, "SELECT html_url url FROM issues");
    }

    #[test]
    fn test_select_json_extract() {
        let sql = select(&[("issue.id", "id"), ("action", "")], Some("payload"))
            .from(["events"])
            .sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT JSON_EXTRACT_SCALAR(payload,'$.issue.id') id, JSON_EXTRACT_SCALAR(payload,'$.action') FROM events"
        );
    }

    #[test]
    fn test_from_skips_empty_names() {
        let sql = select_all().from(["", "a", "", "b"]).sql().unwrap();
        assert_eq!(sql, "SELECT * FROM a, b");
    }

    #[test]
    fn test_select_all_replaces_fields() {
        let sql = select(&[Column::new("id")], None)
            .select_all()
            .from(["t"])
            .sql()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM t");
    }

    #[test]
    fn test_first_condition_has_no_operator() {
        let via_and = select_all().from(["t"]).and(["a = 1", "b = 2"]).sql().unwrap();
        let via_or = select_all().from(["t"]).or(["a = 1", "b = 2"]).sql().unwrap();
        assert_eq!(via_and, "SELECT * FROM t WHERE a = 1 AND b = 2");
        assert_eq!(via_or, "SELECT * FROM t WHERE a = 1 OR b = 2");
    }

    #[test]
    fn test_filter_after_condition_behaves_as_and() {
        let sql = select_all()
            .from(["t"])
            .filter("a = 1")
            .filter("b = 2")
            .or(["c = 3"])
            .sql()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = 1 AND b = 2 OR c = 3");
    }

    #[test]
    fn test_empty_conditions_ignored() {
        let sql = select_all().from(["t"]).and(["", "a = 1"]).sql().unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = 1");
    }

    #[test]
    fn test_order_and_limit() {
        let sql = select_all()
            .from(["t"])
            .order_by(["id DESC", "author"])
            .limit(5)
            .sql()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM t ORDER BY id DESC, author LIMIT 5");
    }

    #[test]
    fn test_missing_fields_or_tables() {
        assert_eq!(SelectBuilder::new().from(["t"]).sql(), Err(QueryError::NoFields));
        assert_eq!(
            select_all().filter("a = 1").limit(3).sql(),
            Err(QueryError::NoTables)
        );
        assert_eq!(
            QueryError::NoTables.to_string(),
            "Select statement must have at least one target table"
        );
    }

    #[test]
    fn test_builder_values_are_independent() {
        let base = select_all().from(["t"]);
        let limited = base.limit(1);
        let filtered = base.filter("x = 1");
        assert_eq!(base.sql().unwrap(), "SELECT * FROM t");
        assert_eq!(limited.sql().unwrap(), "SELECT * FROM t LIMIT 1");
        assert_eq!(filtered.sql().unwrap(), "SELECT * FROM t WHERE x = 1");
    }

    #[test]
    fn test_is_empty() {
        assert!(SelectBuilder::new().is_empty());
        assert!(!select_all().is_empty());
        assert!(!SelectBuilder::new().from(["t"]).is_empty());
    }

    #[test]
    fn test_predicates() {
        assert_eq!(in_list("type", ["IssuesEvent"]), "type IN ('IssuesEvent')");
        assert_eq!(not_in("a", ["x", "y"]), "a NOT IN ('x','y')");
        assert_eq!(like("name", ["%go%"]), "name LIKE ('%go%')");
        assert_eq!(not_like("name", ["%bot"]), "name NOT LIKE ('%bot')");
        assert_eq!(in_list("a", ["it's"]), "a IN ('it\\'s')");
    }
}
