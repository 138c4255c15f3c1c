use crate::error::{GpkgError, Result};
use crate::gpkg::{FeatureIndexManager, FeatureIndexType, Gpkg, GpkgLayer};
use crate::types::{BoundingBox, GeometryColumn};
use geo_traits::GeometryTrait;
use geojson::{Feature, FeatureCollection, GeoJson};
use std::path::{Path, PathBuf};
use wkt::Wkt;

use super::extent::ExtentCalculator;
use super::extract::extract;
use super::geometry::{geometries_extent, geometry_from_geojson};
use super::progress::{NoProgress, ProgressEvent, ProgressSink, is_checkpoint};
use super::schema::{GEOMETRY_COLUMN, PRIMARY_KEY_COLUMN, SchemaMapping, infer_schema};
use super::table_name::{base_table_name, resolve_table_name};

/// SRS used when none is requested (WGS 84).
pub const DEFAULT_SRS_NUMBER: u32 = 4326;

/// Where the GeoJSON comes from.
#[derive(Clone, Debug)]
pub enum GeoJsonSource {
    /// A UTF-8 GeoJSON file, read fully before conversion.
    Path(PathBuf),
    InMemory(FeatureCollection),
}

/// Where the converted table goes.
#[derive(Debug)]
pub enum Destination {
    /// A GeoPackage file, created unless it exists and appending is allowed.
    Path(PathBuf),
    /// An already opened GeoPackage.
    Handle(Gpkg),
}

/// Options of a conversion. Unset fields fall back to the converter defaults,
/// then to the built-in defaults.
#[derive(Debug, Default)]
pub struct ConversionOptions {
    /// Add to an existing destination file instead of refusing it.
    pub append: Option<bool>,
    /// SRS id of the geometry column, 4326 by default. Must exist in
    /// `gpkg_spatial_ref_sys`.
    pub srs_number: Option<u32>,
    pub table_name: Option<String>,
    pub source: Option<GeoJsonSource>,
    pub destination: Option<Destination>,
    /// Store RFC 3339 strings as DATETIME columns. On by default.
    pub detect_datetimes: Option<bool>,
    /// Create and fill the table in a single transaction. On by default.
    pub transactional: Option<bool>,
}

impl ConversionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = Some(append);
        self
    }

    pub fn with_srs_number(mut self, srs_number: u32) -> Self {
        self.srs_number = Some(srs_number);
        self
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn with_source_path(mut self, path: impl AsRef<Path>) -> Self {
        self.source = Some(GeoJsonSource::Path(path.as_ref().to_path_buf()));
        self
    }

    pub fn with_features(mut self, collection: FeatureCollection) -> Self {
        self.source = Some(GeoJsonSource::InMemory(collection));
        self
    }

    pub fn with_destination_path(mut self, path: impl AsRef<Path>) -> Self {
        self.destination = Some(Destination::Path(path.as_ref().to_path_buf()));
        self
    }

    pub fn with_gpkg(mut self, gpkg: Gpkg) -> Self {
        self.destination = Some(Destination::Handle(gpkg));
        self
    }

    pub fn with_detect_datetimes(mut self, detect_datetimes: bool) -> Self {
        self.detect_datetimes = Some(detect_datetimes);
        self
    }

    pub fn with_transactional(mut self, transactional: bool) -> Self {
        self.transactional = Some(transactional);
        self
    }
}

/// Result of a conversion.
#[derive(Debug)]
pub struct Converted {
    /// The destination GeoPackage, still open.
    pub gpkg: Gpkg,
    pub table_name: String,
    pub feature_count: usize,
    /// Extent recorded in `gpkg_contents`.
    pub extent: BoundingBox,
}

/// Converts GeoJSON feature collections into GeoPackage feature tables.
///
/// Example:
/// ```no_run
/// use geojson_gpkg::{ConversionOptions, GeoJsonConverter};
///
/// let mut converter = GeoJsonConverter::default();
/// let converted = converter.convert(
///     ConversionOptions::new()
///         .with_source_path("data/rivers.geojson")
///         .with_destination_path("data/rivers.gpkg"),
/// )?;
/// assert_eq!(converted.table_name, "rivers");
/// # Ok::<(), geojson_gpkg::GpkgError>(())
/// ```
#[derive(Debug, Default)]
pub struct GeoJsonConverter {
    defaults: ConversionOptions,
}

impl GeoJsonConverter {
    /// Converter whose `defaults` apply to every call that leaves a field unset.
    ///
    /// A GeoPackage handle among the defaults is handed over to the first
    /// conversion that doesn't name its own destination.
    pub fn new(defaults: ConversionOptions) -> Self {
        Self { defaults }
    }

    /// Convert into a new GeoPackage file, or into the given handle. Fails
    /// with [`GpkgError::DestinationExists`] when the destination file exists.
    pub fn convert(&mut self, options: ConversionOptions) -> Result<Converted> {
        self.convert_with_progress(options, &mut NoProgress)
    }

    pub fn convert_with_progress<S: ProgressSink + ?Sized>(
        &mut self,
        options: ConversionOptions,
        progress: &mut S,
    ) -> Result<Converted> {
        let options = self.merge(options).with_append(false);
        self.setup_conversion(options, progress)
    }

    /// Add a table to a GeoPackage, creating the file if needed. Append mode
    /// is forced whatever the options say.
    pub fn add_layer(&mut self, options: ConversionOptions) -> Result<Converted> {
        self.add_layer_with_progress(options, &mut NoProgress)
    }

    pub fn add_layer_with_progress<S: ProgressSink + ?Sized>(
        &mut self,
        options: ConversionOptions,
        progress: &mut S,
    ) -> Result<Converted> {
        let options = self.merge(options).with_append(true);
        self.setup_conversion(options, progress)
    }

    /// Read a feature table back as a GeoJSON feature collection.
    pub fn extract(&self, gpkg: &Gpkg, table_name: &str) -> Result<FeatureCollection> {
        extract(gpkg, table_name)
    }

    /// Run a conversion with fully merged options.
    ///
    /// Opens or creates the destination, picks a free table name, reads the
    /// source, infers the schema over all features, then creates the table,
    /// inserts the features and records the table extent.
    pub fn setup_conversion<S: ProgressSink + ?Sized>(
        &self,
        options: ConversionOptions,
        progress: &mut S,
    ) -> Result<Converted> {
        let append = options.append.unwrap_or(false);
        let srs_number = options.srs_number.unwrap_or(DEFAULT_SRS_NUMBER);
        let detect_datetimes = options.detect_datetimes.unwrap_or(true);
        let transactional = options.transactional.unwrap_or(true);
        let source = options.source.ok_or(GpkgError::MissingOption("source"))?;
        let destination = options
            .destination
            .ok_or(GpkgError::MissingOption("destination"))?;

        let gpkg = create_or_open(destination, append, progress)?;

        let source_path = match &source {
            GeoJsonSource::Path(path) => Some(path.as_path()),
            GeoJsonSource::InMemory(_) => None,
        };
        let base_name = base_table_name(options.table_name.as_deref(), source_path);
        let table_name = resolve_table_name(&base_name, &gpkg.list_layers()?);

        let collection = match source {
            GeoJsonSource::Path(path) => {
                progress.on_progress(&ProgressEvent::ReadingSource)?;
                read_feature_collection(&path)?
            }
            GeoJsonSource::InMemory(collection) => collection,
        };

        let (schema, features) = infer_schema(collection.features, detect_datetimes)?;
        let geometries = features
            .iter()
            .map(|feature| feature.geometry.as_ref().map(geometry_from_geojson).transpose())
            .collect::<Result<Vec<_>>>()?;

        progress.on_progress(&ProgressEvent::CreatingTable {
            table_name: table_name.clone(),
        })?;

        let table = TableWriter {
            gpkg: &gpkg,
            table_name: &table_name,
            srs_number,
            schema: &schema,
        };
        let extent = if transactional {
            let tx = gpkg.connection().unchecked_transaction()?;
            let extent = table.write(&features, geometries, progress)?;
            tx.commit()?;
            extent
        } else {
            table.write(&features, geometries, progress)?
        };

        log::info!(
            "converted {} features into table {table_name}",
            features.len()
        );
        Ok(Converted {
            gpkg,
            table_name,
            feature_count: features.len(),
            extent,
        })
    }

    fn merge(&mut self, options: ConversionOptions) -> ConversionOptions {
        let defaults = &mut self.defaults;
        let destination = match options.destination {
            Some(destination) => Some(destination),
            None => match defaults.destination.take() {
                Some(Destination::Path(path)) => {
                    defaults.destination = Some(Destination::Path(path.clone()));
                    Some(Destination::Path(path))
                }
                other => other,
            },
        };

        ConversionOptions {
            append: options.append.or(defaults.append),
            srs_number: options.srs_number.or(defaults.srs_number),
            table_name: options.table_name.or_else(|| defaults.table_name.clone()),
            source: options.source.or_else(|| defaults.source.clone()),
            destination,
            detect_datetimes: options.detect_datetimes.or(defaults.detect_datetimes),
            transactional: options.transactional.or(defaults.transactional),
        }
    }
}

/// Everything needed to create and fill one table.
struct TableWriter<'a> {
    gpkg: &'a Gpkg,
    table_name: &'a str,
    srs_number: u32,
    schema: &'a SchemaMapping,
}

impl TableWriter<'_> {
    fn write<S: ProgressSink + ?Sized>(
        &self,
        features: &[Feature],
        geometries: Vec<Option<Wkt<f64>>>,
        progress: &mut S,
    ) -> Result<BoundingBox> {
        let inserted_extent = geometries_extent(geometries.iter().flatten());

        let layer = if self.gpkg.has_layer(self.table_name)? {
            self.gpkg.open_layer(self.table_name)?
        } else {
            self.gpkg.create_layer(
                self.table_name,
                PRIMARY_KEY_COLUMN,
                &GeometryColumn::generic(GEOMETRY_COLUMN, self.srs_number),
                self.schema.columns(),
                &inserted_extent.unwrap_or(BoundingBox::WORLD).clamped(),
            )?
        };

        let mut index = FeatureIndexManager::new(&layer);
        index.set_index_location(FeatureIndexType::Rtree);
        index.index(FeatureIndexType::Rtree)?;

        let total = features.len();
        for (i, (feature, geometry)) in features.iter().zip(geometries).enumerate() {
            add_geojson_feature(&layer, self.schema, feature, geometry, &index)?;

            if is_checkpoint(i, total) {
                progress.on_progress(&ProgressEvent::InsertProgress {
                    table_name: self.table_name.to_string(),
                    completed: i + 1,
                    total,
                })?;
            }
        }
        progress.on_progress(&ProgressEvent::Done {
            table_name: self.table_name.to_string(),
        })?;

        ExtentCalculator::new(&layer)
            .with_inserted_extent(inserted_extent)
            .update_contents()
    }
}

/// Insert one normalized feature and bring the index at the manager's
/// location up to date. Returns the new row id.
pub fn add_geojson_feature<G: GeometryTrait<T = f64>>(
    layer: &GpkgLayer<'_>,
    schema: &SchemaMapping,
    feature: &Feature,
    geometry: Option<G>,
    index: &FeatureIndexManager<'_>,
) -> Result<i64> {
    let values = schema.row_values(feature, &layer.property_columns);
    let id = layer.insert(geometry, values)?;
    if let Some(index_type) = index.index_location() {
        index.index_feature(index_type, id)?;
    }
    Ok(id)
}

fn create_or_open<S: ProgressSink + ?Sized>(
    destination: Destination,
    append: bool,
    progress: &mut S,
) -> Result<Gpkg> {
    match destination {
        Destination::Handle(gpkg) => {
            progress.on_progress(&ProgressEvent::OpeningGeoPackage)?;
            Ok(gpkg)
        }
        Destination::Path(path) if path.exists() => {
            if !append {
                return Err(GpkgError::DestinationExists { path });
            }
            Gpkg::open(&path)
        }
        Destination::Path(path) => {
            progress.on_progress(&ProgressEvent::CreatingGeoPackage)?;
            Gpkg::new(&path)
        }
    }
}

fn read_feature_collection(path: &Path) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path)?;
    let geojson: GeoJson = text.parse()?;
    let collection = FeatureCollection::try_from(geojson)?;
    log::debug!(
        "read {} features from {}",
        collection.features.len(),
        path.display()
    );
    Ok(collection)
}
