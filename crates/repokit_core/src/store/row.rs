use crate::model::value::Value;
use crate::repo::error::{RepoError, RepoResult};
use std::sync::Arc;

/// One result row. Column labels are shared by every row of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|label| label == column)
            .and_then(|index| self.values.get(index))
    }

    /// Returns a view whose lookups resolve `name` as `scope.name`.
    pub fn scope<'r>(&'r self, scope: &'r str) -> RowView<'r> {
        RowView {
            row: self,
            scope: Some(scope),
        }
    }

    pub fn view(&self) -> RowView<'_> {
        RowView {
            row: self,
            scope: None,
        }
    }
}

/// Typed column access over a row, optionally restricted to fetched columns
/// of one relation.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'r> {
    row: &'r Row,
    scope: Option<&'r str>,
}

impl RowView<'_> {
    pub fn value(&self, column: &str) -> RepoResult<&Value> {
        let found = match self.scope {
            Some(scope) => self.row.get(&format!("{scope}.{column}")),
            None => self.row.get(column),
        };
        found.ok_or_else(|| RepoError::InvalidData(format!("missing column `{column}`")))
    }

    pub fn int(&self, column: &str) -> RepoResult<i64> {
        match self.value(column)? {
            Value::Integer(value) => Ok(*value),
            other => Err(type_mismatch(column, "integer", other)),
        }
    }

    pub fn opt_int(&self, column: &str) -> RepoResult<Option<i64>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(*value)),
            other => Err(type_mismatch(column, "integer", other)),
        }
    }

    pub fn text(&self, column: &str) -> RepoResult<String> {
        match self.value(column)? {
            Value::Text(value) => Ok(value.clone()),
            other => Err(type_mismatch(column, "text", other)),
        }
    }

    pub fn opt_text(&self, column: &str) -> RepoResult<Option<String>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value.clone())),
            other => Err(type_mismatch(column, "text", other)),
        }
    }

    /// Whether the id column is NULL, i.e. the view belongs to an unmatched
    /// left join.
    pub fn is_absent(&self, id_column: &str) -> bool {
        matches!(self.value(id_column), Ok(Value::Null) | Err(_))
    }
}

fn type_mismatch(column: &str, expected: &str, found: &Value) -> RepoError {
    RepoError::InvalidData(format!(
        "column `{column}` expected {expected}, found {}",
        found.type_name()
    ))
}
