use crate::error::{GpkgError, Result};
use crate::ogc_sql::{
    GEOMETRY_INDEX_EXTENSION_DEFINITION, GEOMETRY_INDEX_EXTENSION_NAME, RTREE_EXTENSION_NAME,
    SQL_EXTENSION_EXISTS, SQL_INSERT_GPKG_EXTENSION, SQL_NGA_GEOMETRY_INDEX,
    SQL_NGA_GEOMETRY_INDEX_BOUNDS, SQL_NGA_TABLE_INDEX, SQL_NGA_TABLE_INDEX_TOUCH,
    SQL_NGA_TABLE_INDEXED, SQL_TABLE_EXISTS, execute_rtree_sqls, gpkg_rtree_bounds_sql,
    rtree_table_name, sql_nga_geometry_index_load, sql_scan_bounds,
};
use crate::types::BoundingBox;

use super::GpkgLayer;

/// Kinds of spatial index a feature table can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureIndexType {
    /// SQLite R-tree virtual table kept current by triggers (`gpkg_rtree_index`).
    Rtree,
    /// Plain-table envelope index (`nga_geometry_index`).
    Geopackage,
}

impl FeatureIndexType {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureIndexType::Rtree => "rtree",
            FeatureIndexType::Geopackage => "geopackage",
        }
    }
}

type RawBounds = (Option<f64>, Option<f64>, Option<f64>, Option<f64>);

// Preferred query order when no location has been chosen.
const INDEX_PREFERENCE: [FeatureIndexType; 2] =
    [FeatureIndexType::Rtree, FeatureIndexType::Geopackage];

/// Queries and maintains the spatial indexes of a single feature table.
pub struct FeatureIndexManager<'a> {
    layer: &'a GpkgLayer<'a>,
    index_location: Option<FeatureIndexType>,
}

impl<'a> FeatureIndexManager<'a> {
    pub fn new(layer: &'a GpkgLayer<'a>) -> Self {
        Self {
            layer,
            index_location: None,
        }
    }

    /// Use this index for subsequent queries.
    pub fn set_index_location(&mut self, index_type: FeatureIndexType) {
        self.index_location = Some(index_type);
    }

    pub fn index_location(&self) -> Option<FeatureIndexType> {
        self.index_location
    }

    /// Whether the table carries an index of any kind.
    pub fn is_indexed(&self) -> Result<bool> {
        for index_type in INDEX_PREFERENCE {
            if self.is_indexed_for_type(index_type)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn is_indexed_for_type(&self, index_type: FeatureIndexType) -> Result<bool> {
        let conn = self.layer.gpkg().connection();
        let table = &self.layer.layer_name;
        let column = &self.layer.geometry_column.name;

        match index_type {
            FeatureIndexType::Rtree => {
                let registered: bool = conn.query_row(
                    SQL_EXTENSION_EXISTS,
                    rusqlite::params![table, column, RTREE_EXTENSION_NAME],
                    |row| row.get(0),
                )?;
                if !registered {
                    return Ok(false);
                }
                let exists: bool = conn.query_row(
                    SQL_TABLE_EXISTS,
                    [rtree_table_name(table, column)],
                    |row| row.get(0),
                )?;
                Ok(exists)
            }
            FeatureIndexType::Geopackage => {
                let exists: bool =
                    conn.query_row(SQL_TABLE_EXISTS, ["nga_table_index"], |row| row.get(0))?;
                if !exists {
                    return Ok(false);
                }
                let indexed: bool =
                    conn.query_row(SQL_NGA_TABLE_INDEXED, [table], |row| row.get(0))?;
                Ok(indexed)
            }
        }
    }

    /// Build (or rebuild) an index over every row currently in the table.
    pub fn index(&self, index_type: FeatureIndexType) -> Result<()> {
        let gpkg = self.layer.gpkg();
        gpkg.ensure_writable()?;
        let conn = gpkg.connection();
        let table = &self.layer.layer_name;
        let column = &self.layer.geometry_column.name;
        let id_column = &self.layer.primary_key_column;

        match index_type {
            FeatureIndexType::Rtree => {
                if !self.is_indexed_for_type(FeatureIndexType::Rtree)? {
                    execute_rtree_sqls(conn, table, column, id_column)?;
                }
            }
            FeatureIndexType::Geopackage => {
                conn.execute_batch(SQL_NGA_TABLE_INDEX)?;
                conn.execute_batch(SQL_NGA_GEOMETRY_INDEX)?;
                conn.execute(
                    SQL_INSERT_GPKG_EXTENSION,
                    rusqlite::params![
                        table,
                        column,
                        GEOMETRY_INDEX_EXTENSION_NAME,
                        GEOMETRY_INDEX_EXTENSION_DEFINITION,
                        "read-write"
                    ],
                )?;
                // nga_geometry_index rows reference their nga_table_index row.
                conn.execute(SQL_NGA_TABLE_INDEX_TOUCH, [table])?;
                conn.execute("DELETE FROM nga_geometry_index WHERE table_name = ?1", [table])?;
                conn.execute(
                    &sql_nga_geometry_index_load(table, column, id_column, false),
                    [table],
                )?;
            }
        }
        log::debug!("indexed {table} with {} index", index_type.name());
        Ok(())
    }

    /// Bring an index up to date after a single row was inserted.
    ///
    /// The R-tree is maintained by triggers, so only the geometry-index table
    /// needs explicit work. The index must already exist (see [`Self::index`]).
    pub fn index_feature(&self, index_type: FeatureIndexType, id: i64) -> Result<()> {
        match index_type {
            FeatureIndexType::Rtree => Ok(()),
            FeatureIndexType::Geopackage => {
                let conn = self.layer.gpkg().connection();
                let table = &self.layer.layer_name;
                let mut stmt = conn.prepare_cached(&sql_nga_geometry_index_load(
                    table,
                    &self.layer.geometry_column.name,
                    &self.layer.primary_key_column,
                    true,
                ))?;
                stmt.execute(rusqlite::params![table, id])?;
                Ok(())
            }
        }
    }

    /// Extent of the indexed geometries.
    ///
    /// Queries the chosen index location, or the first available index, or
    /// scans the geometries when the table carries no index. Returns `None`
    /// when the table holds no non-empty geometry.
    pub fn bounding_box(&self) -> Result<Option<BoundingBox>> {
        let location = match self.index_location {
            Some(location) => {
                if !self.is_indexed_for_type(location)? {
                    return Err(GpkgError::MissingIndex {
                        layer_name: self.layer.layer_name.clone(),
                        index_type: location.name(),
                    });
                }
                Some(location)
            }
            None => {
                let mut found = None;
                for index_type in INDEX_PREFERENCE {
                    if self.is_indexed_for_type(index_type)? {
                        found = Some(index_type);
                        break;
                    }
                }
                found
            }
        };

        let conn = self.layer.gpkg().connection();
        let table = &self.layer.layer_name;
        let column = &self.layer.geometry_column.name;
        let bounds_from_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawBounds> {
            Ok((
                row.get::<_, Option<f64>>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
            ))
        };

        let bounds = match location {
            Some(FeatureIndexType::Rtree) => {
                conn.query_row(&gpkg_rtree_bounds_sql(table, column), [], bounds_from_row)?
            }
            Some(FeatureIndexType::Geopackage) => {
                conn.query_row(SQL_NGA_GEOMETRY_INDEX_BOUNDS, [table], bounds_from_row)?
            }
            None => conn.query_row(&sql_scan_bounds(table, column), [], bounds_from_row)?,
        };

        match bounds {
            (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
                Ok(Some(BoundingBox::new(min_x, min_y, max_x, max_y)))
            }
            _ => Ok(None),
        }
    }
}
