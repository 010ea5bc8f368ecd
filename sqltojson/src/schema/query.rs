use std::fmt;

use crate::types::{Record, Value};

static NULL: Value = Value::Null;

/// A query with named parameters rewritten into positional placeholders.
///
/// Nested queries reference the key fields of their parent row as `:name`. Each distinct name is
/// assigned one `$n` placeholder in order of first appearance, so a name used twice binds once.
/// Postgres casts (`::type`) and single-quoted literals are left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    sql: String,
    parameters: Vec<String>,
}

impl QueryTemplate {
    /// Parses `sql`, collecting its named parameters.
    pub fn parse(sql: &str) -> Self {
        let mut rewritten = String::with_capacity(sql.len());
        let mut parameters: Vec<String> = Vec::new();
        let mut chars = sql.chars().peekable();
        let mut in_literal = false;

        while let Some(c) = chars.next() {
            if in_literal {
                rewritten.push(c);
                if c == '\'' {
                    in_literal = false;
                }
                continue;
            }

            match c {
                '\'' => {
                    in_literal = true;
                    rewritten.push(c);
                }
                ':' if chars.peek() == Some(&':') => {
                    rewritten.push_str("::");
                    chars.next();
                }
                ':' if chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_') =>
                {
                    let mut name = String::new();
                    while let Some(next) = chars.peek() {
                        if next.is_ascii_alphanumeric() || *next == '_' {
                            name.push(*next);
                            chars.next();
                        } else {
                            break;
                        }
                    }

                    let position = match parameters.iter().position(|param| *param == name) {
                        Some(position) => position,
                        None => {
                            parameters.push(name);
                            parameters.len() - 1
                        }
                    };
                    rewritten.push('$');
                    rewritten.push_str(&(position + 1).to_string());
                }
                _ => rewritten.push(c),
            }
        }

        Self {
            sql: rewritten,
            parameters,
        }
    }

    /// Returns the rewritten SQL with positional placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the parameter names in placeholder order (`$1` first).
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Resolves the values bound to each placeholder, in order.
    ///
    /// Names absent from `params` bind as [`Value::Null`].
    pub fn bind_values<'a>(&self, params: &'a Params) -> Vec<&'a Value> {
        self.parameters
            .iter()
            .map(|name| params.get(name).unwrap_or(&NULL))
            .collect()
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Named values passed to a nested query, taken from the parent row's key fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<(String, Value)>,
}

impl Params {
    /// Creates an empty parameter set, as used by the root query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the parameters for the children of `record`.
    ///
    /// Every key yields one entry; keys missing from the record map to [`Value::Null`].
    pub fn from_record(record: &Record, keys: &[String]) -> Self {
        let values = keys
            .iter()
            .map(|key| {
                let value = record.get(key).cloned().unwrap_or(Value::Null);
                (key.clone(), value)
            })
            .collect();

        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
