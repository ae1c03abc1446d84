use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::reference::{Reference, MYWORLD};

/// Kind of change a record underwent relative to an earlier version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Insert => write!(f, "insert"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
        }
    }
}

/// Which flavour of table a view reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    /// Feature data as users see it (delta rows over master)
    Data,
    /// Raw delta rows, including delete markers
    Delta,
}

/// Declared type of a field, parsed from the myWorld type string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    /// `foreign_key(<feature_type>)`: holds the id of a myWorld record
    ForeignKey(String),
    /// Holds one URN
    Reference,
    /// Holds a list of URNs
    ReferenceSet,
    Point,
    LineString,
    Polygon,
    /// Any other type (`string`, `integer`, `double`, ...), kept verbatim
    Scalar(String),
}

impl FieldType {
    pub fn parse(type_str: &str) -> Self {
        let type_str = type_str.trim();
        if let Some(target) = type_str
            .strip_prefix("foreign_key(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return FieldType::ForeignKey(target.trim().to_string());
        }

        match type_str {
            "reference" => FieldType::Reference,
            "reference_set" => FieldType::ReferenceSet,
            "point" => FieldType::Point,
            "linestring" => FieldType::LineString,
            "polygon" => FieldType::Polygon,
            other => FieldType::Scalar(other.to_string()),
        }
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self, FieldType::Point | FieldType::LineString | FieldType::Polygon)
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        FieldType::parse(&s)
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::ForeignKey(target) => write!(f, "foreign_key({})", target),
            FieldType::Reference => write!(f, "reference"),
            FieldType::ReferenceSet => write!(f, "reference_set"),
            FieldType::Point => write!(f, "point"),
            FieldType::LineString => write!(f, "linestring"),
            FieldType::Polygon => write!(f, "polygon"),
            FieldType::Scalar(name) => write!(f, "{}", name),
        }
    }
}

/// Field metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub internal_name: String,
    /// Calculated value expression, e.g. `select(cable.housing)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl FieldDef {
    /// Column list of a `select(...)` expression, if this field is calculated by one
    pub fn select_expression(&self) -> Option<Vec<&str>> {
        let expr = self.value.as_deref()?.trim();
        let inner = expr.strip_prefix("select(")?.strip_suffix(')')?;
        Some(
            inner
                .split(',')
                .map(str::trim)
                .filter(|col| !col.is_empty())
                .collect(),
        )
    }
}

/// Schema of one feature type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDef {
    pub feature_type: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_geom_name: Option<String>,
}

impl FeatureDef {
    pub fn new(feature_type: impl Into<String>) -> Self {
        Self {
            feature_type: feature_type.into(),
            fields: Vec::new(),
            primary_geom_name: None,
        }
    }

    /// Declare a field. The first geometry field declared becomes the primary geometry.
    pub fn field(mut self, name: impl Into<String>, type_str: &str) -> Self {
        let name = name.into();
        let field_type = FieldType::parse(type_str);
        if field_type.is_geometry() && self.primary_geom_name.is_none() {
            self.primary_geom_name = Some(name.clone());
        }
        self.fields.push(FieldDef {
            internal_name: name.clone(),
            name,
            field_type,
            value: None,
        });
        self
    }

    /// Declare a field whose value is calculated by an expression
    pub fn calculated_field(mut self, name: impl Into<String>, type_str: &str, value: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.push(FieldDef {
            internal_name: name.clone(),
            name,
            field_type: FieldType::parse(type_str),
            value: Some(value.into()),
        });
        self
    }

    pub fn with_primary_geom(mut self, name: impl Into<String>) -> Self {
        self.primary_geom_name = Some(name.into());
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn is_primary_geom(&self, name: &str) -> bool {
        self.primary_geom_name.as_deref() == Some(name)
    }

    pub fn is_secondary_geom(&self, name: &str) -> bool {
        !self.is_primary_geom(name)
            && self
                .get_field(name)
                .map(|f| f.field_type.is_geometry())
                .unwrap_or(false)
    }
}

/// GeoJSON-style geometry, compared structurally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub geom_type: String,
    pub coordinates: Value,
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Self {
            geom_type: "Point".to_string(),
            coordinates: serde_json::json!([x, y]),
        }
    }

    pub fn line_string(coords: &[(f64, f64)]) -> Self {
        let coords: Vec<Value> = coords.iter().map(|(x, y)| serde_json::json!([x, y])).collect();
        Self {
            geom_type: "LineString".to_string(),
            coordinates: Value::Array(coords),
        }
    }
}

fn default_datasource() -> String {
    MYWORLD.to_string()
}

/// One version of a feature record as produced by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    #[serde(default = "default_datasource")]
    pub datasource: String,
    pub feature_type: String,
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secondary_geometries: BTreeMap<String, Geometry>,
    /// Change recorded against a delta row; `None` outside the delta schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeType>,
    /// Unsaved copy, free to modify
    #[serde(skip)]
    pub detached: bool,
    #[serde(skip)]
    pub def: Arc<FeatureDef>,
}

impl FeatureRecord {
    pub fn new(def: Arc<FeatureDef>, id: impl Into<String>) -> Self {
        Self {
            datasource: MYWORLD.to_string(),
            feature_type: def.feature_type.clone(),
            id: id.into(),
            properties: Map::new(),
            geometry: None,
            secondary_geometries: BTreeMap::new(),
            change_type: None,
            detached: false,
            def,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_secondary_geometry(mut self, name: impl Into<String>, geometry: Geometry) -> Self {
        self.secondary_geometries.insert(name.into(), geometry);
        self
    }

    pub fn with_change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = Some(change_type);
        self
    }

    pub fn reference(&self) -> Reference {
        Reference::new(self.feature_type.clone(), self.id.clone()).with_datasource(self.datasource.clone())
    }

    pub fn urn(&self) -> String {
        self.reference().urn(false)
    }

    /// Property value, `None` when unset
    pub fn field_value(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Geometry held in the named geometry field
    pub fn geometry_for(&self, field_name: &str) -> Option<&Geometry> {
        if self.def.is_primary_geom(field_name) {
            self.geometry.as_ref()
        } else {
            self.secondary_geometries.get(field_name)
        }
    }

    /// A new, unsaved copy of this record that callers may modify
    pub fn detached_clone(&self) -> Self {
        let mut rec = self.clone();
        rec.detached = true;
        rec.change_type = None;
        rec
    }

    pub fn is_delete_marker(&self) -> bool {
        self.change_type == Some(ChangeType::Delete)
    }
}
