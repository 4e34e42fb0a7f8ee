//! Cells: typed parameter and result slots on a grammar.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};

/// Type name given to cells discovered from a sentence format.
pub const STRING_TYPE: &str = "String";

/// A typed, named parameter or result slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub key: String,

    #[serde(rename = "type")]
    pub type_name: String,

    /// Whether this cell holds the grammar's result rather than an input.
    #[serde(default)]
    pub result: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    /// Display header used by editors and reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,

    /// Editor hint (e.g. "select", "text").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
}

impl Cell {
    pub fn new(key: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            type_name: type_name.into(),
            result: false,
            default_value: None,
            header: None,
            editor: None,
        }
    }

    /// A `String` cell.
    pub fn string(key: impl Into<String>) -> Self {
        Self::new(key, STRING_TYPE)
    }

    /// Mark this cell as a result cell.
    pub fn as_result(mut self) -> Self {
        self.result = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_editor(mut self, editor: impl Into<String>) -> Self {
        self.editor = Some(editor.into());
        self
    }

    /// Merge an authored override into this cell, producing a new cell.
    ///
    /// Key, type and result flag always come from `self`; display hints and
    /// the default value are taken from the override when it sets them.
    pub fn apply_overrides(&self, over: Option<&Cell>) -> Cell {
        let mut cell = self.clone();
        if let Some(over) = over {
            if over.header.is_some() {
                cell.header = over.header.clone();
            }
            if over.editor.is_some() {
                cell.editor = over.editor.clone();
            }
            if over.default_value.is_some() {
                cell.default_value = over.default_value.clone();
            }
        }
        cell
    }

    /// `key: Type` parameter declaration.
    pub fn to_declaration(&self) -> String {
        format!("{}: {}", self.key, self.type_name)
    }

    /// `key: &mut Type` out-parameter declaration.
    pub fn to_out_declaration(&self) -> String {
        format!("{}: &mut {}", self.key, self.type_name)
    }
}

/// Converts a raw cell string into a typed JSON value.
pub type Conversion = Arc<dyn Fn(&str) -> anyhow::Result<Value> + Send + Sync>;

/// Cell type handling shared by every grammar of a run: type aliases and
/// raw-value conversions.
#[derive(Clone)]
pub struct CellHandling {
    aliases: HashMap<String, String>,
    conversions: HashMap<String, Conversion>,
}

impl CellHandling {
    /// Conversions for `String`, `bool`, the integer types and floats.
    pub fn basic() -> Self {
        let mut handling = Self {
            aliases: HashMap::new(),
            conversions: HashMap::new(),
        };

        for (alias, canonical) in [
            ("string", "String"),
            ("str", "String"),
            ("int", "i32"),
            ("long", "i64"),
            ("double", "f64"),
            ("float", "f32"),
            ("boolean", "bool"),
        ] {
            handling
                .aliases
                .insert(alias.to_string(), canonical.to_string());
        }

        handling = handling
            .with_conversion(STRING_TYPE, |raw| Ok(Value::String(raw.to_string())))
            .with_conversion("bool", |raw| Ok(Value::Bool(raw.trim().parse::<bool>()?)))
            .with_conversion("i32", |raw| Ok(Value::from(raw.trim().parse::<i32>()?)))
            .with_conversion("i64", |raw| Ok(Value::from(raw.trim().parse::<i64>()?)))
            .with_conversion("u32", |raw| Ok(Value::from(raw.trim().parse::<u32>()?)))
            .with_conversion("u64", |raw| Ok(Value::from(raw.trim().parse::<u64>()?)))
            .with_conversion("usize", |raw| Ok(Value::from(raw.trim().parse::<u64>()?)))
            .with_conversion("f32", |raw| Ok(Value::from(raw.trim().parse::<f32>()? as f64)))
            .with_conversion("f64", |raw| Ok(Value::from(raw.trim().parse::<f64>()?)));

        handling
    }

    /// Register (or replace) the conversion for `type_name`.
    pub fn with_conversion<F>(mut self, type_name: impl Into<String>, conversion: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.conversions
            .insert(type_name.into(), Arc::new(conversion));
        self
    }

    /// Register a type alias, e.g. `"int" -> "i32"`.
    pub fn with_alias(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), canonical.into());
        self
    }

    /// Canonical spelling of a type name.
    pub fn canonical_type<'a>(&'a self, type_name: &'a str) -> &'a str {
        self.aliases
            .get(type_name)
            .map(String::as_str)
            .unwrap_or(type_name)
    }

    /// Normalise a cell's type name through the alias table.
    pub fn normalize(&self, cell: &Cell) -> Cell {
        let mut cell = cell.clone();
        cell.type_name = self.canonical_type(&cell.type_name).to_string();
        cell
    }

    /// Convert a raw value for `cell`. Types without a registered conversion
    /// pass through as strings.
    pub fn convert(&self, cell: &Cell, raw: &str) -> Result<Value> {
        let type_name = self.canonical_type(&cell.type_name);
        match self.conversions.get(type_name) {
            Some(conversion) => conversion(raw).map_err(|e| ModelError::Conversion {
                cell: cell.key.clone(),
                value: raw.to_string(),
                type_name: type_name.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(Value::String(raw.to_string())),
        }
    }
}

impl Default for CellHandling {
    fn default() -> Self {
        Self::basic()
    }
}

impl fmt::Debug for CellHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.conversions.keys().collect();
        types.sort();
        f.debug_struct("CellHandling")
            .field("aliases", &self.aliases.len())
            .field("conversions", &types)
            .finish()
    }
}

/// Converted input values handed to a grammar action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellValues {
    values: BTreeMap<String, Value>,
}

impl CellValues {
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserialize the value of `key` into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<T> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("no value for cell '{}'", key))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// String value of `key`, rendering non-string values as JSON text.
    pub fn text(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
