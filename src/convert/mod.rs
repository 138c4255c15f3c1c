//! GeoJSON conversion.
//!
//! Converting runs in two passes over the feature collection. The first pass
//! infers one column per property key and normalizes every feature. The
//! second pass creates the table and inserts the features one by one,
//! reporting progress at checkpoints. The table extent is recorded last.

mod converter;
mod extent;
mod extract;
mod geometry;
mod progress;
mod schema;
mod table_name;

pub use converter::{
    ConversionOptions, Converted, DEFAULT_SRS_NUMBER, Destination, GeoJsonConverter,
    GeoJsonSource, add_geojson_feature,
};
pub use extent::{ExtentCalculator, ExtentSource};
pub use extract::{GeoJsonFeatures, extract};
pub use progress::{NoProgress, PROGRESS_CHECKPOINTS, ProgressEvent, ProgressSink};
pub use schema::{
    FEATURE_ID_COLUMN, GEOMETRY_COLUMN, GEOMETRY_PROPERTY, PRIMARY_KEY_COLUMN, SchemaMapping,
    ValueShape, infer_schema, renamed_property_key,
};
pub use table_name::{DEFAULT_TABLE_NAME, base_table_name, resolve_table_name};
