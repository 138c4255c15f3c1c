use crate::conversions::{
    column_type_from_str, column_type_to_str, geometry_type_from_str, geometry_type_to_str,
    zm_flag_to_i8, zm_flags_from_i8,
};
use crate::error::{GpkgError, Result};
use crate::ogc_sql::{
    SQL_INSERT_GPKG_CONTENTS, SQL_INSERT_GPKG_GEOMETRY_COLUMNS, SQL_INSERT_GPKG_SPATIAL_REF_SYS,
    SQL_LIST_LAYERS, SQL_SELECT_GEOMETRY_COLUMN_META, SQL_SELECT_GPKG_CONTENTS, SQL_SRS_EXISTS,
    SQL_UPDATE_GPKG_CONTENTS, execute_rtree_sqls, initialize_gpkg, quote_ident, sql_create_table,
    sql_table_columns,
};
use crate::sql_functions::register_spatial_functions;
use crate::types::{BoundingBox, ColumnSpec, GeometryColumn, GpkgContents};
use rusqlite::{OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

use super::layer::GpkgLayer;

/// Primary key column and the remaining columns of a user table.
pub(crate) struct ColumnSpecs {
    pub(crate) primary_key: String,
    pub(crate) other_columns: Vec<ColumnSpec>,
}

#[derive(Debug)]
/// GeoPackage connection wrapper for reading and writing feature tables.
pub struct Gpkg {
    conn: rusqlite::Connection,
    read_only: bool,
    path: Option<PathBuf>,
}

impl Gpkg {
    /// Open a GeoPackage in read-only mode.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = rusqlite::Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        register_spatial_functions(&conn)?;
        Ok(Self {
            conn,
            read_only: true,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an existing GeoPackage in read-write mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GpkgError::MissingGeoPackage {
                path: path.to_path_buf(),
            });
        }

        let conn = rusqlite::Connection::open(path)?;
        register_spatial_functions(&conn)?;
        log::debug!("opened GeoPackage {}", path.display());
        Ok(Self {
            conn,
            read_only: false,
            path: Some(path.to_path_buf()),
        })
    }

    /// Create a new GeoPackage. Fails if the file already exists.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(GpkgError::DestinationExists {
                path: path.to_path_buf(),
            });
        }

        let conn = rusqlite::Connection::open(path)?;

        // The R-tree triggers call the ST_* functions, so register them first.
        register_spatial_functions(&conn)?;
        initialize_gpkg(&conn)?;
        log::debug!("created GeoPackage {}", path.display());

        Ok(Self {
            conn,
            read_only: false,
            path: Some(path.to_path_buf()),
        })
    }

    /// Create a new GeoPackage in memory
    pub fn new_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;

        register_spatial_functions(&conn)?;
        initialize_gpkg(&conn)?;

        Ok(Self {
            conn,
            read_only: false,
            path: None,
        })
    }

    /// Path of the backing file, `None` for in-memory GeoPackages.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Expert-only: register a spatial reference system in gpkg_spatial_ref_sys.
    ///
    /// Feature tables must reference a valid `srs_id` that already exists in
    /// `gpkg_spatial_ref_sys`. Only EPSG:4326 and the two undefined systems
    /// are present in a fresh GeoPackage; anything else has to be registered
    /// here with its full WKT definition before it can be used as the
    /// conversion's SRS number. No validation of the WKT is performed.
    ///
    /// ```
    /// # use geojson_gpkg::Gpkg;
    /// let gpkg = Gpkg::new_in_memory().expect("new gpkg");
    /// let definition = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Mercator_1SP"],UNIT["metre",1],AUTHORITY["EPSG","3857"]]"#;
    /// gpkg.register_srs(
    ///     "WGS 84 / Pseudo-Mercator",
    ///     3857,
    ///     "EPSG",
    ///     3857,
    ///     definition,
    ///     "Web Mercator / Pseudo-Mercator (EPSG:3857)",
    /// ).expect("register srs");
    /// ```
    pub fn register_srs(
        &self,
        srs_name: &str,
        srs_id: i32,
        organization: &str,
        organization_coordsys_id: i32,
        definition: &str,
        description: &str,
    ) -> Result<()> {
        self.ensure_writable()?;

        self.conn.execute(
            SQL_INSERT_GPKG_SPATIAL_REF_SYS,
            rusqlite::params![
                srs_name,
                srs_id,
                organization,
                organization_coordsys_id,
                definition,
                description
            ],
        )?;
        Ok(())
    }

    /// List the names of the feature tables, in creation order.
    pub fn list_layers(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(SQL_LIST_LAYERS)?;
        let layers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(layers)
    }

    /// Whether a feature table with this name exists, compared case-insensitively
    /// since SQLite table names are case-insensitive.
    pub fn has_layer(&self, layer_name: &str) -> Result<bool> {
        Ok(self
            .list_layers()?
            .iter()
            .any(|name| name.eq_ignore_ascii_case(layer_name)))
    }

    /// Load a feature table definition by name.
    pub fn open_layer<'a>(&'a self, layer_name: &str) -> Result<GpkgLayer<'a>> {
        let geometry_column = self.get_geometry_column(layer_name)?;
        let column_specs = self.get_column_specs(layer_name)?;
        let property_columns = column_specs
            .other_columns
            .into_iter()
            .filter(|spec| {
                spec.name != geometry_column.name && spec.name != column_specs.primary_key
            })
            .collect();

        Ok(GpkgLayer::new(
            self,
            layer_name,
            geometry_column,
            column_specs.primary_key,
            property_columns,
        ))
    }

    /// Create a feature table together with its metadata rows and R-tree index.
    ///
    /// The table gets an auto-incrementing integer primary key named
    /// `primary_key_column`, the geometry column, and one column per spec in
    /// order. `bounding_box` is recorded in `gpkg_contents` as the initial extent.
    pub fn create_layer<'a>(
        &'a self,
        layer_name: &str,
        primary_key_column: &str,
        geometry_column: &GeometryColumn,
        column_specs: &[ColumnSpec],
        bounding_box: &BoundingBox,
    ) -> Result<GpkgLayer<'a>> {
        self.ensure_writable()?;

        if self.has_layer(layer_name)? {
            return Err(GpkgError::LayerAlreadyExists {
                layer_name: layer_name.to_string(),
            });
        }

        let srs_id = geometry_column.srs_id;
        let srs_exists: bool =
            self.conn
                .query_row(SQL_SRS_EXISTS, rusqlite::params![srs_id], |row| row.get(0))?;
        if !srs_exists {
            return Err(GpkgError::MissingSpatialRefSysId { srs_id });
        }

        let geometry_type_name = geometry_type_to_str(geometry_column.geometry_type);

        let mut column_defs = Vec::with_capacity(column_specs.len() + 2);
        column_defs.push(format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            quote_ident(primary_key_column)
        ));
        column_defs.push(format!(
            "{} {geometry_type_name}",
            quote_ident(&geometry_column.name)
        ));
        for spec in column_specs {
            let col_type = column_type_to_str(spec.column_type);
            column_defs.push(format!("{} {col_type}", quote_ident(&spec.name)));
        }

        let create_sql = sql_create_table(layer_name, &column_defs.join(", "));
        self.conn.execute_batch(&create_sql)?;

        self.conn.execute(
            SQL_INSERT_GPKG_CONTENTS,
            rusqlite::params![
                layer_name,
                layer_name,
                bounding_box.min_lon,
                bounding_box.min_lat,
                bounding_box.max_lon,
                bounding_box.max_lat,
                srs_id
            ],
        )?;
        self.conn.execute(
            SQL_INSERT_GPKG_GEOMETRY_COLUMNS,
            rusqlite::params![
                layer_name,
                geometry_column.name,
                geometry_type_name,
                srs_id,
                zm_flag_to_i8(geometry_column.z),
                zm_flag_to_i8(geometry_column.m)
            ],
        )?;

        execute_rtree_sqls(
            &self.conn,
            layer_name,
            &geometry_column.name,
            primary_key_column,
        )?;
        log::debug!(
            "created feature table {layer_name} with {} property columns",
            column_specs.len()
        );

        Ok(GpkgLayer::new(
            self,
            layer_name,
            geometry_column.clone(),
            primary_key_column.to_string(),
            column_specs.to_vec(),
        ))
    }

    /// Read the `gpkg_contents` row of a table.
    pub fn contents(&self, table_name: &str) -> Result<Option<GpkgContents>> {
        let contents = self
            .conn
            .query_row(SQL_SELECT_GPKG_CONTENTS, [table_name], |row| {
                Ok(GpkgContents {
                    table_name: row.get(0)?,
                    data_type: row.get(1)?,
                    identifier: row.get(2)?,
                    description: row.get(3)?,
                    last_change: row.get(4)?,
                    min_x: row.get(5)?,
                    min_y: row.get(6)?,
                    max_x: row.get(7)?,
                    max_y: row.get(8)?,
                    srs_id: row.get(9)?,
                })
            })
            .optional()?;
        Ok(contents)
    }

    /// Write a `gpkg_contents` row back. `last_change` is refreshed to now.
    pub fn update_contents(&self, contents: &GpkgContents) -> Result<()> {
        self.ensure_writable()?;

        self.conn.execute(
            SQL_UPDATE_GPKG_CONTENTS,
            rusqlite::params![
                contents.table_name,
                contents.data_type,
                contents.identifier,
                contents.description,
                contents.min_x,
                contents.min_y,
                contents.max_x,
                contents.max_y,
                contents.srs_id
            ],
        )?;
        Ok(())
    }

    pub(crate) fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Whether the GeoPackage was opened with [`Gpkg::open_read_only`].
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(GpkgError::ReadOnly);
        }
        Ok(())
    }

    /// Resolve the table columns and map SQLite types.
    pub(crate) fn get_column_specs(&self, layer_name: &str) -> Result<ColumnSpecs> {
        let query = sql_table_columns(layer_name);
        let mut stmt = self.conn.prepare(&query)?;

        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let column_type_str: String = row.get(1)?;
                let primary_key: i32 = row.get(2)?;
                Ok((name, column_type_str, primary_key != 0))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut primary_key: Option<String> = None;
        let mut other_columns = Vec::with_capacity(rows.len());
        for (name, declared_type, is_primary_key) in rows {
            // cf. https://www.geopackage.org/spec140/index.html#_sqlite_container
            let column_type = column_type_from_str(&declared_type).ok_or_else(|| {
                GpkgError::UnsupportedColumnType {
                    column: name.clone(),
                    declared_type: declared_type.clone(),
                }
            })?;

            if is_primary_key {
                if primary_key.is_some() {
                    return Err(GpkgError::CompositePrimaryKeyUnsupported {
                        layer_name: layer_name.to_string(),
                    });
                }
                primary_key = Some(name.clone());
            }
            other_columns.push(ColumnSpec::new(name, column_type));
        }

        let primary_key = primary_key.ok_or_else(|| GpkgError::MissingPrimaryKeyColumn {
            layer_name: layer_name.to_string(),
        })?;

        Ok(ColumnSpecs {
            primary_key,
            other_columns,
        })
    }

    /// Resolve the geometry column metadata of a feature table.
    pub(crate) fn get_geometry_column(&self, layer_name: &str) -> Result<GeometryColumn> {
        let mut stmt = self.conn.prepare(SQL_SELECT_GEOMETRY_COLUMN_META)?;

        let (name, geometry_type_str, z, m, srs_id) = stmt
            .query_row([layer_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i8>(2)?,
                    row.get::<_, i8>(3)?,
                    row.get::<_, u32>(4)?,
                ))
            })
            .optional()?
            .ok_or_else(|| GpkgError::MissingLayer {
                layer_name: layer_name.to_string(),
            })?;

        let geometry_type = geometry_type_from_str(&geometry_type_str)?;
        let (z, m) = zm_flags_from_i8(z, m)?;

        Ok(GeometryColumn {
            name,
            geometry_type,
            z,
            m,
            srs_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Gpkg;
    use crate::Result;
    use crate::error::GpkgError;
    use crate::test_support::temp_gpkg_path;
    use crate::types::{BoundingBox, ColumnSpec, ColumnType, GeometryColumn, ZmFlag};

    #[test]
    fn create_layer_requires_existing_srs() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let err = gpkg
            .create_layer(
                "missing_srs",
                "id",
                &GeometryColumn::generic("geometry", 9999),
                &[],
                &BoundingBox::WORLD,
            )
            .expect_err("missing srs should fail");

        assert!(matches!(
            err,
            GpkgError::MissingSpatialRefSysId { srs_id: 9999 }
        ));
        Ok(())
    }

    #[test]
    fn create_layer_records_metadata() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let columns = vec![
            ColumnSpec::new("name", ColumnType::Varchar),
            ColumnSpec::new("when", ColumnType::DateTime),
        ];
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        gpkg.create_layer(
            "places",
            "id",
            &GeometryColumn::generic("geometry", 4326),
            &columns,
            &bbox,
        )?;

        let (geometry_type_name, srs_id, z, m): (String, u32, i8, i8) =
            gpkg.connection().query_row(
                "SELECT geometry_type_name, srs_id, z, m FROM gpkg_geometry_columns WHERE table_name = 'places'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
        assert_eq!(geometry_type_name, "GEOMETRY");
        assert_eq!(srs_id, 4326);
        assert_eq!((z, m), (2, 2));

        let contents = gpkg.contents("places")?.expect("contents row");
        assert_eq!(contents.bounding_box(), Some(bbox));
        assert_eq!(contents.data_type, "features");

        let layer = gpkg.open_layer("places")?;
        assert_eq!(layer.primary_key_column, "id");
        assert_eq!(layer.geometry_column.z, ZmFlag::Optional);
        assert_eq!(layer.property_columns, columns);
        Ok(())
    }

    #[test]
    fn create_layer_rejects_case_insensitive_duplicates() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let geometry = GeometryColumn::generic("geometry", 4326);
        gpkg.create_layer("Roads", "id", &geometry, &[], &BoundingBox::WORLD)?;
        let err = gpkg
            .create_layer("roads", "id", &geometry, &[], &BoundingBox::WORLD)
            .expect_err("duplicate should fail");
        assert!(matches!(err, GpkgError::LayerAlreadyExists { .. }));
        assert!(gpkg.has_layer("ROADS")?);
        Ok(())
    }

    #[test]
    fn update_contents_overwrites_extent() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        gpkg.create_layer(
            "points",
            "id",
            &GeometryColumn::generic("geometry", 4326),
            &[],
            &BoundingBox::WORLD,
        )?;

        let mut contents = gpkg.contents("points")?.expect("contents row");
        contents.set_bounding_box(&BoundingBox::new(-1.0, -2.0, 1.0, 2.0));
        gpkg.update_contents(&contents)?;

        let reread = gpkg.contents("points")?.expect("contents row");
        assert_eq!(
            reread.bounding_box(),
            Some(BoundingBox::new(-1.0, -2.0, 1.0, 2.0))
        );
        assert!(gpkg.contents("nope")?.is_none());
        Ok(())
    }

    #[test]
    fn open_layer_reports_missing_table() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let err = gpkg.open_layer("nope").expect_err("missing layer");
        assert!(matches!(err, GpkgError::MissingLayer { .. }));
        Ok(())
    }

    #[test]
    fn new_fails_if_file_exists() -> Result<()> {
        let path = temp_gpkg_path("exists");
        std::fs::write(&path, [])?;
        let err = Gpkg::new(&path).expect_err("existing file should fail");
        assert!(matches!(err, GpkgError::DestinationExists { .. }));

        let _ = std::fs::remove_file(&path);
        Ok(())
    }

    #[test]
    fn open_fails_if_missing_file() {
        let path = temp_gpkg_path("missing");
        let err = Gpkg::open(&path).expect_err("missing file should fail");
        assert!(matches!(err, GpkgError::MissingGeoPackage { .. }));
    }

    #[test]
    fn created_file_is_tagged_as_geopackage() -> Result<()> {
        let path = temp_gpkg_path("pragma");
        {
            let gpkg = Gpkg::new(&path)?;
            assert_eq!(gpkg.path(), Some(path.as_path()));
        }

        let gpkg = Gpkg::open_read_only(&path)?;
        assert!(gpkg.is_read_only());
        let application_id: i32 =
            gpkg.connection()
                .query_row("PRAGMA application_id", [], |row| row.get(0))?;
        assert_eq!(application_id, 0x4750_4B47);
        let err = gpkg
            .register_srs("x", 1, "x", 1, "x", "x")
            .expect_err("read-only should fail");
        assert!(matches!(err, GpkgError::ReadOnly));

        drop(gpkg);
        let _ = std::fs::remove_file(&path);
        Ok(())
    }
}
