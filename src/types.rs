use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;

/// Column types this crate knows how to create and read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub enum ColumnType {
    Boolean,
    Varchar,
    Double,
    Integer,
    DateTime,
    Geometry,
}

/// Value transformation applied to a property right before it is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conversion {
    /// Serialize the value to its canonical JSON string.
    JsonText,
    /// Normalize a date-like string to the GeoPackage DATETIME format
    /// (`YYYY-MM-DDTHH:MM:SS.SSSZ`). Values that don't parse are kept as-is.
    DateTime,
}

impl Conversion {
    pub fn apply(&self, value: JsonValue) -> Result<JsonValue> {
        match self {
            Conversion::JsonText => Ok(JsonValue::String(serde_json::to_string(&value)?)),
            Conversion::DateTime => match value {
                JsonValue::String(s) => match parse_datetime(&s) {
                    Some(dt) => Ok(JsonValue::String(format_datetime(&dt))),
                    None => Ok(JsonValue::String(s)),
                },
                other => Ok(other),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub conversion: Option<Conversion>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            conversion: None,
        }
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = Some(conversion);
        self
    }
}

/// `z` / `m` flag of a geometry column.
///
/// cf. https://www.geopackage.org/spec140/index.html#gpkg_geometry_columns_cols
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZmFlag {
    Prohibited,
    Mandatory,
    Optional,
}

/// Definition of the single geometry column of a feature table.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryColumn {
    pub name: String,
    /// `None` declares the generic `GEOMETRY` type.
    pub geometry_type: Option<wkb::reader::GeometryType>,
    pub z: ZmFlag,
    pub m: ZmFlag,
    pub srs_id: u32,
}

impl GeometryColumn {
    /// Generic geometry column where z and m values are optional.
    pub fn generic(name: impl Into<String>, srs_id: u32) -> Self {
        Self {
            name: name.into(),
            geometry_type: None,
            z: ZmFlag::Optional,
            m: ZmFlag::Optional,
            srs_id,
        }
    }
}

/// Axis-aligned longitude/latitude rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub const WORLD: BoundingBox = BoundingBox {
        min_lon: -180.0,
        min_lat: -90.0,
        max_lon: 180.0,
        max_lat: 90.0,
    };

    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Clamp every edge into `[-180, 180] x [-90, 90]`.
    pub fn clamped(&self) -> Self {
        Self {
            min_lon: self.min_lon.clamp(-180.0, 180.0),
            min_lat: self.min_lat.clamp(-90.0, 90.0),
            max_lon: self.max_lon.clamp(-180.0, 180.0),
            max_lat: self.max_lat.clamp(-90.0, 90.0),
        }
    }
}

/// A row of `gpkg_contents`.
#[derive(Clone, Debug, PartialEq)]
pub struct GpkgContents {
    pub table_name: String,
    pub data_type: String,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub last_change: String,
    pub min_x: Option<f64>,
    pub min_y: Option<f64>,
    pub max_x: Option<f64>,
    pub max_y: Option<f64>,
    pub srs_id: Option<u32>,
}

impl GpkgContents {
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        Some(BoundingBox::new(
            self.min_x?,
            self.min_y?,
            self.max_x?,
            self.max_y?,
        ))
    }

    pub fn set_bounding_box(&mut self, bbox: &BoundingBox) {
        self.min_x = Some(bbox.min_lon);
        self.min_y = Some(bbox.min_lat);
        self.max_x = Some(bbox.max_lon);
        self.max_y = Some(bbox.max_lat);
    }
}

/// Parse an RFC 3339 timestamp (e.g. `2024-05-01T12:00:00Z`).
pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::{BoundingBox, Conversion};
    use serde_json::json;

    #[test]
    fn json_text_serializes_objects() -> crate::Result<()> {
        let converted = Conversion::JsonText.apply(json!({"a": [1, 2]}))?;
        assert_eq!(converted, json!(r#"{"a":[1,2]}"#));
        Ok(())
    }

    #[test]
    fn datetime_normalizes_offsets_to_utc() -> crate::Result<()> {
        let converted = Conversion::DateTime.apply(json!("2024-05-01T14:30:00+02:00"))?;
        assert_eq!(converted, json!("2024-05-01T12:30:00.000Z"));

        let untouched = Conversion::DateTime.apply(json!("not a date"))?;
        assert_eq!(untouched, json!("not a date"));
        Ok(())
    }

    #[test]
    fn clamps_to_valid_ranges() {
        let bbox = BoundingBox::new(-200.0, -95.5, 181.0, 12.0).clamped();
        assert_eq!(bbox, BoundingBox::new(-180.0, -90.0, 180.0, 12.0));
    }
}
