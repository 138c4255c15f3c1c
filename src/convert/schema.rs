//! Property schema inference.
//!
//! Every property key seen in a collection gets exactly one column. The first
//! non-null value of a key decides the column type; later values never change
//! it. Inference runs as a fold: each step takes the mapping by value and hands
//! it back together with the normalized feature.

use crate::error::Result;
use crate::types::{ColumnSpec, ColumnType, Conversion, parse_datetime};
use geojson::feature::Id;
use geojson::{Feature, JsonObject, JsonValue};
use rusqlite::types::Value;
use std::collections::HashMap;

/// Name of the geometry column of converted tables.
pub const GEOMETRY_COLUMN: &str = "geometry";
/// Name of the integer primary key of converted tables.
pub const PRIMARY_KEY_COLUMN: &str = "id";
/// Property a `geometry` property is renamed to.
pub const GEOMETRY_PROPERTY: &str = "geometry_property";
/// Column holding the top-level GeoJSON feature id.
pub const FEATURE_ID_COLUMN: &str = "_feature_id";

const RESERVED_ID_PREFIX: &str = "_properties_";

/// Shape of a property value, as far as column typing is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueShape {
    Absent,
    Boolean,
    Number,
    String,
    DateLike,
    /// Arrays and objects.
    Object,
}

impl ValueShape {
    /// Classify a JSON value. Strings only count as date-like when
    /// `detect_datetimes` is set and they parse as RFC 3339 timestamps.
    pub fn classify(value: &JsonValue, detect_datetimes: bool) -> Self {
        match value {
            JsonValue::Null => ValueShape::Absent,
            JsonValue::Bool(_) => ValueShape::Boolean,
            JsonValue::Number(_) => ValueShape::Number,
            JsonValue::String(s) if detect_datetimes && parse_datetime(s).is_some() => {
                ValueShape::DateLike
            }
            JsonValue::String(_) => ValueShape::String,
            JsonValue::Array(_) | JsonValue::Object(_) => ValueShape::Object,
        }
    }

    /// Column type and value conversion for this shape, `None` for absent values.
    pub fn column_type(&self) -> Option<(ColumnType, Option<Conversion>)> {
        match self {
            ValueShape::Absent => None,
            ValueShape::Boolean => Some((ColumnType::Boolean, None)),
            ValueShape::Number => Some((ColumnType::Double, None)),
            ValueShape::String => Some((ColumnType::Varchar, None)),
            ValueShape::DateLike => Some((ColumnType::DateTime, Some(Conversion::DateTime))),
            ValueShape::Object => Some((ColumnType::Varchar, Some(Conversion::JsonText))),
        }
    }
}

/// Ordered mapping from property key to the column created for it.
///
/// Keys are case-sensitive, column names are unique ignoring ASCII case: a
/// key whose column name is already taken gets a numeric suffix (`Name_1`).
/// Insertion order is the column order of the created table.
#[derive(Clone, Debug, Default)]
pub struct SchemaMapping {
    keys: Vec<String>,
    columns: Vec<ColumnSpec>,
    position_by_key: HashMap<String, usize>,
    detect_datetimes: bool,
}

impl SchemaMapping {
    pub fn new(detect_datetimes: bool) -> Self {
        Self {
            detect_datetimes,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column created for a property key.
    pub fn get(&self, key: &str) -> Option<&ColumnSpec> {
        self.position_by_key
            .get(key)
            .and_then(|idx| self.columns.get(*idx))
    }

    /// Property keys in column order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Column specs in column order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    fn insert(&mut self, key: String, spec: ColumnSpec) {
        self.position_by_key.insert(key.clone(), self.columns.len());
        self.keys.push(key);
        self.columns.push(spec);
    }

    // SQLite compares column names case-insensitively.
    fn unique_column_name(&self, name: String) -> String {
        let taken = |candidate: &str| {
            candidate.eq_ignore_ascii_case(GEOMETRY_COLUMN)
                || candidate.eq_ignore_ascii_case(PRIMARY_KEY_COLUMN)
                || self
                    .columns
                    .iter()
                    .any(|column| column.name.eq_ignore_ascii_case(candidate))
        };

        let mut candidate = name.clone();
        let mut suffix = 1;
        while taken(&candidate) {
            candidate = format!("{name}_{suffix}");
            suffix += 1;
        }
        candidate
    }

    /// Run the inference rules over one feature.
    ///
    /// Returns the extended mapping and the feature with its properties
    /// normalized for insertion: reserved keys renamed, nulls removed and
    /// column conversions applied. A feature without geometry is reduced to
    /// its properties.
    pub fn add_feature(mut self, mut feature: Feature) -> Result<(Self, Feature)> {
        if feature_id_text(&feature).is_some()
            && !self.position_by_key.contains_key(FEATURE_ID_COLUMN)
        {
            self.insert(
                FEATURE_ID_COLUMN.to_string(),
                ColumnSpec::new(FEATURE_ID_COLUMN, ColumnType::Varchar),
            );
        }

        let properties = feature.properties.take().unwrap_or_default();
        let mut normalized = JsonObject::with_capacity(properties.len());
        for (key, value) in properties {
            let key = renamed_property_key(key);

            if !self.position_by_key.contains_key(&key) {
                let shape = ValueShape::classify(&value, self.detect_datetimes);
                if let Some((column_type, conversion)) = shape.column_type() {
                    let name = self.unique_column_name(column_name_for_key(&key));
                    let mut spec = ColumnSpec::new(name, column_type);
                    if let Some(conversion) = conversion {
                        spec = spec.with_conversion(conversion);
                    }
                    self.insert(key.clone(), spec);
                }
            }

            if value.is_null() {
                continue;
            }

            let value = match self.get(&key).and_then(|spec| spec.conversion) {
                Some(conversion) => conversion.apply(value)?,
                None => value,
            };
            normalized.insert(key, value);
        }
        feature.properties = Some(normalized);

        if feature.geometry.is_none() {
            feature = Feature {
                bbox: None,
                geometry: None,
                id: None,
                properties: feature.properties,
                foreign_members: None,
            };
        }

        Ok((self, feature))
    }

    /// SQL values of a normalized feature, one per column of `columns`.
    ///
    /// `_feature_id` is stamped from the feature id when it has one.
    pub fn row_values(&self, feature: &Feature, columns: &[ColumnSpec]) -> Vec<Value> {
        let mut by_column: HashMap<&str, &JsonValue> = HashMap::new();
        if let Some(properties) = &feature.properties {
            for (key, value) in properties {
                let column = self.get(key).map_or(key.as_str(), |spec| spec.name.as_str());
                by_column.insert(column, value);
            }
        }
        let feature_id = feature_id_text(feature);

        columns
            .iter()
            .map(|column| match (&feature_id, column.name.as_str()) {
                (Some(id), FEATURE_ID_COLUMN) => Value::Text(id.clone()),
                (_, name) => by_column.get(name).map_or(Value::Null, |v| json_to_sql(v)),
            })
            .collect()
    }
}

/// Build the schema of a whole collection, returning the mapping and the
/// normalized features in their original order.
pub fn infer_schema<I>(
    features: I,
    detect_datetimes: bool,
) -> Result<(SchemaMapping, Vec<Feature>)>
where
    I: IntoIterator<Item = Feature>,
{
    let mut features = features.into_iter();
    let mut normalized = Vec::with_capacity(features.size_hint().0);
    let mapping = features.try_fold(
        SchemaMapping::new(detect_datetimes),
        |mapping, feature| -> Result<SchemaMapping> {
            let (mapping, feature) = mapping.add_feature(feature)?;
            normalized.push(feature);
            Ok(mapping)
        },
    )?;

    log::debug!(
        "inferred {} columns from {} features: {:?}",
        mapping.len(),
        normalized.len(),
        mapping.columns
    );
    Ok((mapping, normalized))
}

/// Property key after renaming the ones that collide with table columns.
///
/// Only exact `geometry`, `id` and `ID` keys are renamed.
pub fn renamed_property_key(key: String) -> String {
    match key.as_str() {
        GEOMETRY_COLUMN => GEOMETRY_PROPERTY.to_string(),
        "id" | "ID" => format!("{RESERVED_ID_PREFIX}{key}"),
        _ => key,
    }
}

// SQLite column names are case-insensitive, so every spelling of `id` would
// clash with the primary key.
fn column_name_for_key(key: &str) -> String {
    if key.eq_ignore_ascii_case(PRIMARY_KEY_COLUMN) {
        format!("{RESERVED_ID_PREFIX}{key}")
    } else {
        key.to_string()
    }
}

/// Text form of the top-level feature id. Empty strings and zero count as no id.
pub(crate) fn feature_id_text(feature: &Feature) -> Option<String> {
    match feature.id.as_ref()? {
        Id::String(s) if s.is_empty() => None,
        Id::String(s) => Some(s.clone()),
        Id::Number(n) if n.as_f64() == Some(0.0) => None,
        Id::Number(n) => Some(n.to_string()),
    }
}

pub(crate) fn json_to_sql(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map_or(Value::Null, Value::Real),
        },
        JsonValue::String(s) => Value::Text(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => Value::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FEATURE_ID_COLUMN, GEOMETRY_PROPERTY, SchemaMapping, ValueShape, infer_schema,
        json_to_sql,
    };
    use crate::Result;
    use crate::types::{ColumnType, Conversion};
    use geojson::Feature;
    use rusqlite::types::Value;
    use serde_json::json;

    fn feature(value: serde_json::Value) -> Feature {
        serde_json::from_value(value).expect("valid feature")
    }

    fn point_feature(properties: serde_json::Value) -> Feature {
        feature(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": properties,
        }))
    }

    #[test]
    fn classifies_value_shapes() {
        assert_eq!(ValueShape::classify(&json!(null), true), ValueShape::Absent);
        assert_eq!(ValueShape::classify(&json!(true), true), ValueShape::Boolean);
        assert_eq!(ValueShape::classify(&json!(1.5), true), ValueShape::Number);
        assert_eq!(ValueShape::classify(&json!("x"), true), ValueShape::String);
        assert_eq!(ValueShape::classify(&json!([1]), true), ValueShape::Object);
        assert_eq!(
            ValueShape::classify(&json!("2024-01-02T03:04:05Z"), true),
            ValueShape::DateLike
        );
        assert_eq!(
            ValueShape::classify(&json!("2024-01-02T03:04:05Z"), false),
            ValueShape::String
        );
    }

    #[test]
    fn first_seen_type_wins() -> Result<()> {
        let (mapping, _) = infer_schema(
            [
                point_feature(json!({"value": null})),
                point_feature(json!({"value": "text"})),
                point_feature(json!({"value": 3})),
            ],
            true,
        )?;

        assert_eq!(mapping.len(), 1);
        assert_eq!(
            mapping.get("value").map(|spec| spec.column_type),
            Some(ColumnType::Varchar)
        );
        Ok(())
    }

    #[test]
    fn null_only_keys_get_no_column() -> Result<()> {
        let (mapping, features) = infer_schema(
            [
                point_feature(json!({"name": "a", "nothing": null})),
                point_feature(json!({"nothing": null})),
            ],
            true,
        )?;

        assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["name"]);
        for feature in &features {
            let properties = feature.properties.as_ref().expect("properties");
            assert!(!properties.contains_key("nothing"));
        }
        Ok(())
    }

    #[test]
    fn columns_follow_first_appearance_order() -> Result<()> {
        let (mapping, _) = infer_schema(
            [
                point_feature(json!({"zeta": 1, "alpha": "a"})),
                point_feature(json!({"mid": true, "zeta": 2})),
            ],
            true,
        )?;
        assert_eq!(
            mapping.keys().collect::<Vec<_>>(),
            vec!["zeta", "alpha", "mid"]
        );
        Ok(())
    }

    #[test]
    fn renames_reserved_keys() -> Result<()> {
        let (mapping, features) = infer_schema(
            [point_feature(json!({"geometry": "x", "id": 1, "ID": 5, "Id": 7}))],
            true,
        )?;

        assert!(mapping.get(GEOMETRY_PROPERTY).is_some());
        assert!(mapping.get("geometry").is_none());
        assert_eq!(
            mapping.get("_properties_id").map(|s| s.name.as_str()),
            Some("_properties_id")
        );
        assert_eq!(
            mapping.get("_properties_ID").map(|s| s.name.as_str()),
            Some("_properties_ID_1")
        );
        // Other spellings keep their key, only the column is prefixed.
        assert_eq!(
            mapping.get("Id").map(|s| s.name.as_str()),
            Some("_properties_Id_2")
        );

        let properties = features[0].properties.as_ref().expect("properties");
        assert_eq!(properties.get("_properties_ID"), Some(&json!(5)));
        assert_eq!(properties.get("Id"), Some(&json!(7)));
        assert!(!properties.contains_key("ID"));
        Ok(())
    }

    #[test]
    fn keys_differing_in_case_get_distinct_columns() -> Result<()> {
        let (mapping, features) = infer_schema(
            [
                point_feature(json!({"name": "a", "Geometry": 1})),
                point_feature(json!({"Name": "b", "NAME": "c"})),
            ],
            true,
        )?;

        assert_eq!(
            mapping.keys().collect::<Vec<_>>(),
            vec!["name", "Geometry", "Name", "NAME"]
        );
        let names: Vec<_> = mapping.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "Geometry_1", "Name_1", "NAME_2"]);

        let rows: Vec<_> = features
            .iter()
            .map(|f| mapping.row_values(f, mapping.columns()))
            .collect();
        assert_eq!(
            rows,
            vec![
                vec![
                    Value::Text("a".to_string()),
                    Value::Integer(1),
                    Value::Null,
                    Value::Null
                ],
                vec![
                    Value::Null,
                    Value::Null,
                    Value::Text("b".to_string()),
                    Value::Text("c".to_string())
                ],
            ]
        );
        Ok(())
    }

    #[test]
    fn objects_are_stored_as_json_text() -> Result<()> {
        let (mapping, features) = infer_schema(
            [
                point_feature(json!({"tags": {"a": 1}})),
                point_feature(json!({"tags": [1, 2]})),
            ],
            true,
        )?;

        let spec = mapping.get("tags").expect("tags column");
        assert_eq!(spec.column_type, ColumnType::Varchar);
        assert_eq!(spec.conversion, Some(Conversion::JsonText));

        let tags: Vec<_> = features
            .iter()
            .map(|f| f.properties.as_ref().and_then(|p| p.get("tags")).cloned())
            .collect();
        assert_eq!(tags, vec![Some(json!(r#"{"a":1}"#)), Some(json!("[1,2]"))]);
        Ok(())
    }

    #[test]
    fn feature_ids_create_a_text_column_once() -> Result<()> {
        let mut with_id = point_feature(json!({"name": "a"}));
        with_id.id = Some(geojson::feature::Id::Number(42.into()));
        let mut zero_id = point_feature(json!({"name": "b"}));
        zero_id.id = Some(geojson::feature::Id::Number(0.into()));
        let mut other_id = point_feature(json!({}));
        other_id.id = Some(geojson::feature::Id::String("abc".to_string()));

        let (mapping, features) = infer_schema([with_id, zero_id, other_id], true)?;
        assert_eq!(
            mapping.keys().collect::<Vec<_>>(),
            vec![FEATURE_ID_COLUMN, "name"]
        );

        let rows: Vec<_> = features
            .iter()
            .map(|f| mapping.row_values(f, mapping.columns()))
            .collect();
        assert_eq!(
            rows,
            vec![
                vec![Value::Text("42".to_string()), Value::Text("a".to_string())],
                vec![Value::Null, Value::Text("b".to_string())],
                vec![Value::Text("abc".to_string()), Value::Null],
            ]
        );
        Ok(())
    }

    #[test]
    fn features_without_geometry_keep_only_properties() -> Result<()> {
        let mut bare = feature(json!({
            "type": "Feature",
            "geometry": null,
            "properties": {"name": "a", "empty": null},
        }));
        bare.id = Some(geojson::feature::Id::String("x".to_string()));

        let (mapping, feature) = SchemaMapping::new(true).add_feature(bare)?;
        assert!(feature.geometry.is_none());
        assert!(feature.id.is_none());
        assert_eq!(feature.properties, json!({"name": "a"}).as_object().cloned());
        // The id still reserves its column.
        assert!(mapping.get(FEATURE_ID_COLUMN).is_some());
        Ok(())
    }

    #[test]
    fn dates_are_normalized() -> Result<()> {
        let (mapping, features) = infer_schema(
            [point_feature(json!({"when": "2024-05-01T14:30:00+02:00"}))],
            true,
        )?;
        assert_eq!(
            mapping.get("when").map(|s| s.column_type),
            Some(ColumnType::DateTime)
        );
        let properties = features[0].properties.as_ref().expect("properties");
        assert_eq!(properties.get("when"), Some(&json!("2024-05-01T12:30:00.000Z")));
        Ok(())
    }

    #[test]
    fn binds_json_values() {
        assert_eq!(json_to_sql(&json!(true)), Value::Integer(1));
        assert_eq!(json_to_sql(&json!(7)), Value::Integer(7));
        assert_eq!(json_to_sql(&json!(0.5)), Value::Real(0.5));
        assert_eq!(json_to_sql(&json!("s")), Value::Text("s".to_string()));
        assert_eq!(
            json_to_sql(&json!({"k": null})),
            Value::Text(r#"{"k":null}"#.to_string())
        );
        assert_eq!(json_to_sql(&json!(null)), Value::Null);
    }
}
