use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::ModelError;
use crate::sort_key::SortKey;
use crate::value::{FieldSource, Value};

/// Presentation attribute a projection produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Display,
    Icon,
    ToolTip,
    CheckState,
    Edit,
    /// Raw numeric value, e.g. the fraction drawn by a progress bar.
    User,
    Sort,
}

/// Opaque icon handle; the front-end maps names to glyphs or pixmaps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Icon(pub String);

impl Icon {
    pub fn named(name: impl Into<String>) -> Self {
        Icon(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckState {
    Unchecked,
    PartiallyChecked,
    Checked,
}

/// A formatted cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Icon(Icon),
    Number(f64),
    Check(CheckState),
    Key(SortKey),
    Raw(Value),
}

impl CellValue {
    /// Default conversion used by straight field lookups.
    fn from_field(role: Role, value: &Value) -> Option<CellValue> {
        match role {
            Role::Display | Role::ToolTip => Some(CellValue::Text(value.to_string())),
            Role::Icon => value.as_str().map(|s| CellValue::Icon(Icon::named(s))),
            Role::User => value.as_f64().map(CellValue::Number),
            Role::Sort => Some(CellValue::Key(SortKey::from(value))),
            Role::CheckState => value.as_bool().map(|b| {
                CellValue::Check(if b { CheckState::Checked } else { CheckState::Unchecked })
            }),
            Role::Edit => Some(CellValue::Raw(value.clone())),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_icon(&self) -> Option<&Icon> {
        match self {
            CellValue::Icon(icon) => Some(icon),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_check(&self) -> Option<CheckState> {
        match self {
            CellValue::Check(c) => Some(*c),
            _ => None,
        }
    }

    /// The value as a sort key, whatever role produced it.
    pub fn into_sort_key(self) -> SortKey {
        match self {
            CellValue::Key(key) => key,
            CellValue::Text(s) => SortKey::Text(s),
            CellValue::Number(n) => SortKey::Float(n),
            CellValue::Raw(v) => SortKey::from(&v),
            CellValue::Icon(icon) => SortKey::Text(icon.0),
            CellValue::Check(c) => SortKey::Int(c as i64),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<SortKey> for CellValue {
    fn from(key: SortKey) -> Self {
        CellValue::Key(key)
    }
}

impl From<Icon> for CellValue {
    fn from(icon: Icon) -> Self {
        CellValue::Icon(icon)
    }
}

pub type FormatFn = Arc<dyn Fn(&[&Value]) -> Option<CellValue> + Send + Sync>;

/// Pure mapping from a source's fields to one presentation value.
#[derive(Clone)]
pub enum Projection {
    Constant(CellValue),
    Field(String),
    Computed { fields: Vec<String>, format: FormatFn },
}

impl Projection {
    pub fn field(name: impl Into<String>) -> Self {
        Projection::Field(name.into())
    }

    pub fn constant(value: impl Into<CellValue>) -> Self {
        Projection::Constant(value.into())
    }

    /// Build a multi-field projection. With no fields the formatter is run
    /// once here and the result kept as a constant.
    pub fn computed<F>(fields: &[&str], format: F) -> Self
    where
        F: Fn(&[&Value]) -> Option<CellValue> + Send + Sync + 'static,
    {
        if fields.is_empty() {
            return match format(&[]) {
                Some(value) => Projection::Constant(value),
                None => Projection::Constant(CellValue::Raw(Value::Null)),
            };
        }
        Projection::Computed {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            format: Arc::new(format),
        }
    }

    /// Single-field shorthand for `computed`.
    pub fn map<F>(field: &str, format: F) -> Self
    where
        F: Fn(&Value) -> Option<CellValue> + Send + Sync + 'static,
    {
        Self::computed(&[field], move |values| format(values[0]))
    }

    pub fn fields(&self) -> &[String] {
        match self {
            Projection::Constant(_) => &[],
            Projection::Field(name) => std::slice::from_ref(name),
            Projection::Computed { fields, .. } => fields,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Projection::Constant(_))
    }

    /// Evaluate against `source` for `role`.
    ///
    /// `Ok(None)` means the formatter declined the values (e.g. a type it does
    /// not handle); `Err(FieldMissing)` means a declared field is absent.
    pub fn format(&self, role: Role, source: &dyn FieldSource) -> Result<Option<CellValue>, ModelError> {
        match self {
            Projection::Constant(value) => Ok(Some(value.clone())),
            Projection::Field(name) => {
                let value = source
                    .field(name)
                    .ok_or_else(|| ModelError::FieldMissing(name.clone()))?;
                Ok(CellValue::from_field(role, &value))
            }
            Projection::Computed { fields, format } => {
                let mut owned = Vec::with_capacity(fields.len());
                for name in fields {
                    owned.push(
                        source
                            .field(name)
                            .ok_or_else(|| ModelError::FieldMissing(name.clone()))?,
                    );
                }
                let values: Vec<&Value> = owned.iter().map(|v| v.as_ref()).collect();
                Ok(format(&values))
            }
        }
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Projection::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Projection::Computed { fields, .. } => {
                f.debug_struct("Computed").field("fields", fields).finish_non_exhaustive()
            }
        }
    }
}

/// One model column: a header plus a projection per role.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    width: u16,
    fields: BTreeSet<String>,
    projections: HashMap<Role, Projection>,
}

impl Column {
    pub fn new(name: impl Into<String>, width: u16) -> Self {
        Self {
            name: name.into(),
            width,
            fields: BTreeSet::new(),
            projections: HashMap::new(),
        }
    }

    /// Attach (or replace) the projection for `role`.
    pub fn with(mut self, role: Role, projection: Projection) -> Self {
        self.augment(role, projection);
        self
    }

    pub fn augment(&mut self, role: Role, projection: Projection) {
        self.fields.extend(projection.fields().iter().cloned());
        self.projections.insert(role, projection);
    }

    pub fn text(self, projection: Projection) -> Self {
        self.with(Role::Display, projection)
    }

    pub fn icon(self, projection: Projection) -> Self {
        self.with(Role::Icon, projection)
    }

    pub fn tooltip(self, projection: Projection) -> Self {
        self.with(Role::ToolTip, projection)
    }

    pub fn sort(self, projection: Projection) -> Self {
        self.with(Role::Sort, projection)
    }

    pub fn user(self, projection: Projection) -> Self {
        self.with(Role::User, projection)
    }

    pub fn edit(self, projection: Projection) -> Self {
        self.with(Role::Edit, projection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    /// Union of every field any role of this column reads.
    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn projection(&self, role: Role) -> Option<&Projection> {
        self.projections.get(&role)
    }

    pub fn sorter(&self) -> Option<&Projection> {
        self.projections.get(&Role::Sort)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.projections.contains_key(&role)
    }

    pub fn reads_any<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> bool {
        fields.into_iter().any(|f| self.fields.contains(f))
    }

    /// Format one role of this column; missing fields and unknown roles both
    /// give an empty cell.
    pub fn format(&self, role: Role, source: &dyn FieldSource) -> Option<CellValue> {
        let projection = self.projections.get(&role)?;
        match projection.format(role, source) {
            Ok(value) => value,
            Err(e) => {
                tracing::trace!(column = %self.name, ?role, "empty cell: {}", e);
                None
            }
        }
    }

    /// Evaluate the sort projection, surfacing a missing field to the caller.
    /// Columns without one sort by their display text.
    pub fn sort_key(&self, source: &dyn FieldSource) -> Result<Option<SortKey>, ModelError> {
        let Some(sorter) = self.sorter().or_else(|| self.projection(Role::Display)) else {
            return Ok(None);
        };
        Ok(sorter
            .format(Role::Sort, source)?
            .map(CellValue::into_sort_key))
    }
}

/// Indices of the columns that read any of `fields`.
pub fn columns_for_fields<'a, I>(columns: &[Column], fields: I) -> Vec<usize>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    columns
        .iter()
        .enumerate()
        .filter(|(_, column)| column.reads_any(fields.clone()))
        .map(|(i, _)| i)
        .collect()
}
