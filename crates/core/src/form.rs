//! Two-way sync between a nested config document and named form controls.
//!
//! A control named `core__proxy__port` holds `config["proxy"]["port"]` for
//! the prefix `core__`; list elements use their index (`key__0`).

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};
use tracing::debug;

pub const NAME_SEPARATOR: &str = "__";

/// Value access common to every form control.
pub trait FieldWidget: Send {
    fn get_value(&self) -> Json;

    /// Load `value`; false if the control cannot represent it.
    fn set_value(&mut self, value: &Json) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpinBox {
    value: i64,
    min: i64,
    max: i64,
}

impl SpinBox {
    pub fn new(min: i64, max: i64) -> Self {
        Self { value: min, min, max }
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

impl FieldWidget for SpinBox {
    fn get_value(&self) -> Json {
        Json::from(self.value)
    }

    fn set_value(&mut self, value: &Json) -> bool {
        let Some(n) = value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)) else {
            return false;
        };
        self.value = n.clamp(self.min, self.max);
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoubleSpinBox {
    value: f64,
    min: f64,
    max: f64,
}

impl DoubleSpinBox {
    pub fn new(min: f64, max: f64) -> Self {
        Self { value: min, min, max }
    }
}

impl FieldWidget for DoubleSpinBox {
    fn get_value(&self) -> Json {
        Json::from(self.value)
    }

    fn set_value(&mut self, value: &Json) -> bool {
        let Some(f) = value.as_f64() else {
            return false;
        };
        self.value = f.clamp(self.min, self.max);
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckBox {
    checked: bool,
}

impl CheckBox {
    pub fn is_checked(&self) -> bool {
        self.checked
    }
}

impl FieldWidget for CheckBox {
    fn get_value(&self) -> Json {
        Json::Bool(self.checked)
    }

    fn set_value(&mut self, value: &Json) -> bool {
        self.checked = match value {
            Json::Bool(b) => *b,
            Json::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Json::Null => false,
            _ => return false,
        };
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineEdit {
    text: String,
}

impl LineEdit {
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl FieldWidget for LineEdit {
    fn get_value(&self) -> Json {
        Json::String(self.text.clone())
    }

    fn set_value(&mut self, value: &Json) -> bool {
        self.text = match value {
            Json::String(s) => s.clone(),
            Json::Null => String::new(),
            other => other.to_string(),
        };
        true
    }
}

/// How a combo box maps its selection to a config value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComboMode {
    /// The config stores the current index.
    ByIndex,
    /// The config stores the user data of the current item.
    ByData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComboBox {
    items: Vec<(String, Json)>,
    current: Option<usize>,
    mode: ComboMode,
}

impl ComboBox {
    pub fn new(mode: ComboMode) -> Self {
        Self {
            items: Vec::new(),
            current: None,
            mode,
        }
    }

    pub fn with_item(mut self, label: impl Into<String>, data: Json) -> Self {
        self.items.push((label.into(), data));
        if self.current.is_none() {
            self.current = Some(0);
        }
        self
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_text(&self) -> Option<&str> {
        self.current.and_then(|i| self.items.get(i)).map(|(l, _)| l.as_str())
    }
}

impl FieldWidget for ComboBox {
    fn get_value(&self) -> Json {
        match self.mode {
            ComboMode::ByIndex => self.current.map(Json::from).unwrap_or(Json::from(-1)),
            ComboMode::ByData => self
                .current
                .and_then(|i| self.items.get(i))
                .map(|(_, data)| data.clone())
                .unwrap_or(Json::Null),
        }
    }

    fn set_value(&mut self, value: &Json) -> bool {
        let index = match self.mode {
            ComboMode::ByIndex => value
                .as_u64()
                .map(|i| i as usize)
                .filter(|&i| i < self.items.len()),
            ComboMode::ByData => self.items.iter().position(|(_, data)| data == value),
        };
        match index {
            Some(i) => {
                self.current = Some(i);
                true
            }
            None => false,
        }
    }
}

/// Exclusive group of radio buttons, each carrying the value it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioGroup {
    options: Vec<Json>,
    checked: Option<usize>,
}

impl RadioGroup {
    pub fn new(options: Vec<Json>) -> Self {
        Self {
            options,
            checked: None,
        }
    }

    pub fn checked(&self) -> Option<usize> {
        self.checked
    }
}

impl FieldWidget for RadioGroup {
    fn get_value(&self) -> Json {
        self.checked
            .and_then(|i| self.options.get(i))
            .cloned()
            .unwrap_or(Json::Null)
    }

    fn set_value(&mut self, value: &Json) -> bool {
        match self.options.iter().position(|o| o == value) {
            Some(i) => {
                self.checked = Some(i);
                true
            }
            None => false,
        }
    }
}

/// Named controls of one form.
#[derive(Default)]
pub struct FormBinding {
    widgets: BTreeMap<String, Box<dyn FieldWidget>>,
}

impl FormBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, widget: impl FieldWidget + 'static) {
        self.widgets.insert(name.into(), Box::new(widget));
    }

    pub fn widget(&self, name: &str) -> Option<&dyn FieldWidget> {
        self.widgets.get(name).map(|w| w.as_ref())
    }

    pub fn widget_mut(&mut self, name: &str) -> Option<&mut (dyn FieldWidget + 'static)> {
        self.widgets.get_mut(name).map(|w| w.as_mut())
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Push every leaf of `config` into the control named after its path.
    pub fn to_widgets(&mut self, config: &Json, prefix: &str) {
        for (name, value) in leaves(config, prefix) {
            match self.widgets.get_mut(&name) {
                Some(widget) => {
                    if !widget.set_value(value) {
                        debug!(widget = %name, ?value, "value does not fit widget");
                    }
                }
                None => debug!(widget = %name, "no widget for config key"),
            }
        }
    }

    /// Rebuild a document shaped like `shape` from the controls. Leaves with
    /// no control keep their value from `shape`.
    pub fn from_widgets(&self, shape: &Json, prefix: &str) -> Json {
        match shape {
            Json::Object(map) => {
                let mut out = Map::new();
                for (key, value) in map {
                    let name = format!("{}{}", prefix, key);
                    out.insert(key.clone(), self.from_leaf_or_nested(value, &name));
                }
                Json::Object(out)
            }
            Json::Array(items) => Json::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, value)| self.from_leaf_or_nested(value, &format!("{}{}", prefix, i)))
                    .collect(),
            ),
            leaf => leaf.clone(),
        }
    }

    fn from_leaf_or_nested(&self, value: &Json, name: &str) -> Json {
        match value {
            Json::Object(_) | Json::Array(_) => {
                self.from_widgets(value, &format!("{}{}", name, NAME_SEPARATOR))
            }
            leaf => match self.widgets.get(name) {
                Some(widget) => widget.get_value(),
                None => {
                    debug!(widget = %name, "no widget for config key");
                    leaf.clone()
                }
            },
        }
    }
}

/// `(widget name, leaf value)` for every scalar in `config`.
fn leaves<'a>(config: &'a Json, prefix: &str) -> Vec<(String, &'a Json)> {
    let mut out = Vec::new();
    let children: Vec<(String, &Json)> = match config {
        Json::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Json::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
        _ => return out,
    };
    for (key, value) in children {
        let name = format!("{}{}", prefix, key);
        match value {
            Json::Object(_) | Json::Array(_) => {
                out.extend(leaves(value, &format!("{}{}", name, NAME_SEPARATOR)));
            }
            _ => out.push((name, value)),
        }
    }
    out
}
