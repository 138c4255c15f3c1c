//! GeoPackage container engine backed by rusqlite.
//!
//! This module owns everything that touches the SQLite file: the GeoPackage
//! core tables, feature tables, their spatial indexes and `gpkg_contents`
//! metadata. It knows nothing about GeoJSON.

mod feature;
mod gpkg;
mod index;
mod layer;

pub use feature::{GpkgFeature, GpkgFeatureIterator};
pub use gpkg::Gpkg;
pub use index::{FeatureIndexManager, FeatureIndexType};
pub use layer::GpkgLayer;

pub(crate) use feature::{gpkg_geometry_to_wkb, wkb_to_gpkg_geometry};
