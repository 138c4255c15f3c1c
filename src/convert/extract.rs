use crate::error::Result;
use crate::gpkg::{Gpkg, GpkgFeature, GpkgFeatureIterator};
use crate::types::{ColumnSpec, ColumnType};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use rusqlite::types::Value;

use super::geometry::to_geojson_value;
use super::schema::FEATURE_ID_COLUMN;

// Largest integer a double represents exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Cursor of the stored rows of a table, translated to GeoJSON features.
pub struct GeoJsonFeatures {
    columns: Vec<ColumnSpec>,
    features: GpkgFeatureIterator,
}

impl Iterator for GeoJsonFeatures {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        let feature = self.features.next()?;
        Some(to_geojson_feature(&feature, &self.columns))
    }
}

impl Gpkg {
    /// Read every row of a feature table as GeoJSON, in primary key order.
    ///
    /// The feature id is taken from `_feature_id` when the row has one, else
    /// from the primary key. NULL columns are left out of the properties.
    pub fn query_geojson_features(&self, table_name: &str) -> Result<GeoJsonFeatures> {
        let layer = self.open_layer(table_name)?;
        let features = layer.features()?;
        Ok(GeoJsonFeatures {
            columns: layer.property_columns,
            features,
        })
    }
}

/// Collect a whole feature table into a GeoJSON feature collection.
pub fn extract(gpkg: &Gpkg, table_name: &str) -> Result<FeatureCollection> {
    let features = gpkg
        .query_geojson_features(table_name)?
        .collect::<Result<Vec<Feature>>>()?;
    log::debug!("extracted {} features from {table_name}", features.len());

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn to_geojson_feature(feature: &GpkgFeature, columns: &[ColumnSpec]) -> Result<Feature> {
    let geometry = feature
        .geometry()?
        .map(|wkb| geojson::Geometry::new(to_geojson_value(&wkb)));

    let mut id = None;
    let mut properties = JsonObject::with_capacity(columns.len());
    for (column, value) in columns.iter().zip(feature.properties()) {
        if column.name == FEATURE_ID_COLUMN {
            if let Value::Text(text) = value {
                id = Some(Id::String(text.clone()));
                continue;
            }
        }
        if let Some(json) = to_json_value(value, column) {
            properties.insert(column.name.clone(), json);
        }
    }

    Ok(Feature {
        bbox: None,
        geometry,
        id: id.or_else(|| Some(Id::Number(feature.id().into()))),
        properties: Some(properties),
        foreign_members: None,
    })
}

fn to_json_value(value: &Value, column: &ColumnSpec) -> Option<JsonValue> {
    match (value, column.column_type) {
        (Value::Null, _) => None,
        (Value::Integer(i), ColumnType::Boolean) => Some(JsonValue::Bool(*i != 0)),
        (Value::Integer(i), _) => Some(JsonValue::from(*i)),
        (Value::Real(f), _) => {
            if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER {
                Some(JsonValue::from(*f as i64))
            } else {
                serde_json::Number::from_f64(*f).map(JsonValue::Number)
            }
        }
        (Value::Text(s), _) => Some(JsonValue::String(s.clone())),
        (Value::Blob(_), _) => {
            log::warn!("skipping blob value of column {}", column.name);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::extract;
    use crate::Result;
    use crate::gpkg::Gpkg;
    use crate::types::{BoundingBox, ColumnSpec, ColumnType, GeometryColumn};
    use geo_types::Point;
    use geojson::feature::Id;
    use rusqlite::types::Value;
    use serde_json::json;

    #[test]
    fn translates_rows_to_features() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let columns = vec![
            ColumnSpec::new("_feature_id", ColumnType::Varchar),
            ColumnSpec::new("name", ColumnType::Varchar),
            ColumnSpec::new("flag", ColumnType::Boolean),
            ColumnSpec::new("size", ColumnType::Double),
            ColumnSpec::new("raw", ColumnType::Geometry),
        ];
        let layer = gpkg.create_layer(
            "things",
            "id",
            &GeometryColumn::generic("geometry", 4326),
            &columns,
            &BoundingBox::WORLD,
        )?;
        layer.insert(
            Some(Point::new(1.0, 2.0)),
            [
                Value::Text("a-1".to_string()),
                Value::Text("first".to_string()),
                Value::Integer(1),
                Value::Real(3.0),
                Value::Blob(vec![1, 2, 3]),
            ],
        )?;
        layer.insert(
            None::<Point>,
            [
                Value::Null,
                Value::Null,
                Value::Integer(0),
                Value::Real(2.5),
                Value::Null,
            ],
        )?;

        let collection = extract(&gpkg, "things")?;
        assert_eq!(collection.features.len(), 2);

        let first = &collection.features[0];
        assert_eq!(first.id, Some(Id::String("a-1".to_string())));
        assert_eq!(
            first.geometry.as_ref().map(|g| g.value.clone()),
            Some(geojson::Value::Point(vec![1.0, 2.0]))
        );
        assert_eq!(
            first.properties,
            json!({"name": "first", "flag": true, "size": 3})
                .as_object()
                .cloned()
        );

        let second = &collection.features[1];
        assert_eq!(second.id, Some(Id::Number(2.into())));
        assert!(second.geometry.is_none());
        assert_eq!(
            second.properties,
            json!({"flag": false, "size": 2.5}).as_object().cloned()
        );
        Ok(())
    }

    #[test]
    fn missing_table_is_an_error() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        assert!(extract(&gpkg, "nope").is_err());
        Ok(())
    }
}
