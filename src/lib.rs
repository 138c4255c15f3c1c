//! GeoJSON to GeoPackage converter built on top of rusqlite.
//!
//! ## Overview
//!
//! - `GeoJsonConverter` turns a GeoJSON feature collection into a feature
//!   table of a GeoPackage, and reads tables back as GeoJSON.
//! - `Gpkg` represents the whole GeoPackage.
//! - `GpkgLayer` represents a single feature table.
//! - `GpkgFeature` represents a single stored row.
//! - `Value` represents a single property value related to the feature.
//!
//! A conversion infers one column per property key (the first non-null value
//! decides the type), picks a table name that doesn't exist yet by appending
//! `_1`, `_2`, ..., inserts the features and records the real extent of the
//! table in `gpkg_contents`.
//!
//! ## Converting
//!
//! ```no_run
//! use geojson_gpkg::{ConversionOptions, GeoJsonConverter, ProgressEvent};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut converter = GeoJsonConverter::default();
//!
//!     let mut progress = |event: &ProgressEvent| -> geojson_gpkg::Result<()> {
//!         match (event.completed(), event.total()) {
//!             (Some(completed), Some(total)) => {
//!                 println!("{} ({completed}/{total})", event.status())
//!             }
//!             _ => println!("{}", event.status()),
//!         }
//!         Ok(())
//!     };
//!
//!     let converted = converter.convert_with_progress(
//!         ConversionOptions::new()
//!             .with_source_path("data/rivers.geojson")
//!             .with_destination_path("data/rivers.gpkg"),
//!         &mut progress,
//!     )?;
//!
//!     // Add another table to the same file.
//!     converter.add_layer(
//!         ConversionOptions::new()
//!             .with_source_path("data/lakes.geojson")
//!             .with_destination_path("data/rivers.gpkg"),
//!     )?;
//!
//!     let collection = converter.extract(&converted.gpkg, &converted.table_name)?;
//!     println!("{} features", collection.features.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Reading tables directly
//!
//! ```no_run
//! use geojson_gpkg::{Gpkg, Value};
//!
//! let gpkg = Gpkg::open_read_only("data/rivers.gpkg")?;
//! for layer_name in gpkg.list_layers()? {
//!     let layer = gpkg.open_layer(&layer_name)?;
//!     for feature in layer.features()? {
//!         let _geom = feature.geometry()?;
//!         if let Some(Value::Text(name)) = feature.property("name") {
//!             println!("{layer_name}: {name}");
//!         }
//!     }
//! }
//! # Ok::<(), geojson_gpkg::GpkgError>(())
//! ```
mod error;
mod gpkg;
mod sql_functions;

mod conversions;
mod convert;
mod ogc_sql;
mod types;

pub use convert::{
    ConversionOptions, Converted, DEFAULT_SRS_NUMBER, DEFAULT_TABLE_NAME, Destination,
    ExtentCalculator, ExtentSource, FEATURE_ID_COLUMN, GEOMETRY_COLUMN, GEOMETRY_PROPERTY,
    GeoJsonConverter, GeoJsonFeatures, GeoJsonSource, NoProgress, PRIMARY_KEY_COLUMN,
    PROGRESS_CHECKPOINTS, ProgressEvent, ProgressSink, SchemaMapping, ValueShape,
    add_geojson_feature, base_table_name, extract, infer_schema, renamed_property_key,
    resolve_table_name,
};
pub use error::{GpkgError, Result};
pub use gpkg::{
    FeatureIndexManager, FeatureIndexType, Gpkg, GpkgFeature, GpkgFeatureIterator, GpkgLayer,
};
pub use sql_functions::register_spatial_functions;
pub use types::{
    BoundingBox, ColumnSpec, ColumnType, Conversion, GeometryColumn, GpkgContents, ZmFlag,
};

pub use rusqlite::types::Value;

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn temp_gpkg_path(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir().join(format!("geojson_gpkg_{prefix}_{nanos}.gpkg"))
    }
}
