/// Filter Builder: turns the four lookup fields into one parameterized
/// `WHERE` clause for the `Dirt` table.

/// Escape character used in every generated `LIKE` clause
const LIKE_ESCAPE: char = '\\';

/// The four lookup inputs as typed by the operator. Empty means "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    pub indexation_id: String,
    pub username: String,
    pub user_id: String,
    pub notes: String,
}

/// A `WHERE` clause body with its positional parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub clause: String,
    pub params: Vec<String>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.active_fields().next().is_none()
    }

    /// Column/value pairs for every non-empty field, in column order
    fn active_fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("indexation_id", self.indexation_id.as_str()),
            ("username", self.username.as_str()),
            ("user_id", self.user_id.as_str()),
            ("notes", self.notes.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
    }

    /// Build the combined predicate, or `None` to select everything.
    /// Each active field is a contains-match; all of them are ANDed.
    pub fn predicate(&self) -> Option<Predicate> {
        if self.is_empty() {
            return None;
        }

        let mut clauses = Vec::new();
        let mut params = Vec::new();

        for (column, value) in self.active_fields() {
            params.push(format!("%{}%", escape_like(value)));
            clauses.push(format!(
                "{} LIKE ?{} ESCAPE '{}'",
                column,
                params.len(),
                LIKE_ESCAPE
            ));
        }

        Some(Predicate {
            clause: clauses.join(" AND "),
            params,
        })
    }
}

/// Make `%`, `_` and the escape character match literally
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
