use crate::error::{GpkgError, Result};
use crate::ogc_sql::{quote_ident, sql_insert_feature, sql_select_features};
use crate::types::{ColumnSpec, GeometryColumn};
use geo_traits::GeometryTrait;
use rusqlite::params_from_iter;
use rusqlite::types::{Value, ValueRef};
use std::collections::HashMap;
use std::sync::Arc;
use wkb::reader::Wkb;

use super::{Gpkg, GpkgFeature, GpkgFeatureIterator, wkb_to_gpkg_geometry};

#[derive(Debug)]
/// A GeoPackage feature table with geometry metadata and column specs.
pub struct GpkgLayer<'a> {
    pub(super) conn: &'a Gpkg,
    pub layer_name: String,
    pub geometry_column: GeometryColumn,
    pub primary_key_column: String,
    pub property_columns: Vec<ColumnSpec>,
    pub(super) property_index_by_name: Arc<HashMap<String, usize>>,
    pub(super) insert_sql: String,
}

// When issuing the SELECT query, always place these columns first so that
// we don't need to find the positions every time.
const GEOMETRY_INDEX: usize = 0;
const PRIMARY_INDEX: usize = 1;

impl<'a> GpkgLayer<'a> {
    pub(super) fn new(
        conn: &'a Gpkg,
        layer_name: &str,
        geometry_column: GeometryColumn,
        primary_key_column: String,
        property_columns: Vec<ColumnSpec>,
    ) -> Self {
        let insert_sql =
            Self::build_insert_sql(layer_name, &geometry_column.name, &property_columns);
        let property_index_by_name = Self::build_property_index_by_name(&property_columns);
        Self {
            conn,
            layer_name: layer_name.to_string(),
            geometry_column,
            primary_key_column,
            property_columns,
            property_index_by_name: Arc::new(property_index_by_name),
            insert_sql,
        }
    }

    /// The GeoPackage this layer belongs to.
    pub fn gpkg(&self) -> &'a Gpkg {
        self.conn
    }

    /// SRS id of the geometry column.
    pub fn srs_id(&self) -> u32 {
        self.geometry_column.srs_id
    }

    /// Iterate over features in the layer in primary key order.
    pub fn features(&self) -> Result<GpkgFeatureIterator> {
        let columns = self.property_columns.iter().map(|spec| spec.name.as_str());

        let sql = sql_select_features(
            &self.layer_name,
            &self.geometry_column.name,
            &self.primary_key_column,
            columns,
        );
        let mut stmt = self.conn.connection().prepare(&sql)?;
        let features = stmt
            .query_map([], |row| self.row_to_feature(row))?
            .collect::<std::result::Result<Vec<GpkgFeature>, _>>()?;

        Ok(GpkgFeatureIterator {
            features: features.into_iter(),
        })
    }

    /// Insert a feature with an optional geometry and property values ordered
    /// like `property_columns`. Returns the primary key of the new row.
    ///
    /// Example:
    /// ```no_run
    /// use geo_types::Point;
    /// use geojson_gpkg::{Gpkg, Value};
    ///
    /// let gpkg = Gpkg::open("data/example.gpkg")?;
    /// let layer = gpkg.open_layer("points")?;
    ///
    /// let properties = vec![Value::Text("alpha".to_string()), Value::Integer(1)];
    /// layer.insert(Some(Point::new(1.0, 2.0)), properties)?;
    /// # Ok::<(), geojson_gpkg::GpkgError>(())
    /// ```
    pub fn insert<G, P>(&self, geometry: Option<G>, properties: P) -> Result<i64>
    where
        G: GeometryTrait<T = f64>,
        P: IntoIterator<Item = Value>,
    {
        self.conn.ensure_writable()?;

        let properties: Vec<Value> = properties.into_iter().collect();
        if properties.len() != self.property_columns.len() {
            return Err(GpkgError::InvalidPropertyCount {
                expected: self.property_columns.len(),
                got: properties.len(),
            });
        }

        let geom = match geometry {
            Some(geometry) => Value::Blob(self.geom_from_geometry(geometry)?),
            None => Value::Null,
        };
        let params = std::iter::once(geom).chain(properties);

        let mut stmt = self.conn.connection().prepare_cached(&self.insert_sql)?;
        stmt.execute(params_from_iter(params))?;
        Ok(self.conn.connection().last_insert_rowid())
    }

    pub(crate) fn build_insert_sql(
        layer_name: &str,
        geometry_column: &str,
        property_columns: &[ColumnSpec],
    ) -> String {
        let mut columns = Vec::with_capacity(property_columns.len() + 1);
        columns.push(quote_ident(geometry_column));
        columns.extend(property_columns.iter().map(|spec| quote_ident(&spec.name)));

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<String>>()
            .join(",");

        sql_insert_feature(layer_name, &columns.join(","), &placeholders)
    }

    pub(crate) fn build_property_index_by_name(
        property_columns: &[ColumnSpec],
    ) -> HashMap<String, usize> {
        let mut property_index_by_name = HashMap::with_capacity(property_columns.len());
        for (idx, column) in property_columns.iter().enumerate() {
            property_index_by_name.insert(column.name.clone(), idx);
        }
        property_index_by_name
    }

    fn row_to_feature(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<GpkgFeature> {
        let geometry = match row.get_ref(GEOMETRY_INDEX)? {
            ValueRef::Blob(bytes) => Some(bytes.to_vec()),
            ValueRef::Null => None,
            other => {
                return Err(rusqlite::Error::InvalidColumnType(
                    GEOMETRY_INDEX,
                    self.geometry_column.name.clone(),
                    other.data_type(),
                ));
            }
        };

        let id = match row.get_ref(PRIMARY_INDEX)? {
            ValueRef::Integer(id) => id,
            other => {
                return Err(rusqlite::Error::InvalidColumnType(
                    PRIMARY_INDEX,
                    self.primary_key_column.clone(),
                    other.data_type(),
                ));
            }
        };

        let mut properties = Vec::with_capacity(self.property_columns.len());
        for idx in 0..self.property_columns.len() {
            properties.push(row.get::<_, Value>(idx + 2)?);
        }

        Ok(GpkgFeature {
            id,
            geometry,
            properties,
            property_index_by_name: Arc::clone(&self.property_index_by_name),
        })
    }

    fn geom_from_geometry<G>(&self, geometry: G) -> Result<Vec<u8>>
    where
        G: GeometryTrait<T = f64>,
    {
        let mut buf = Vec::new();
        wkb::writer::write_geometry(&mut buf, &geometry, &Default::default())?;
        let wkb = Wkb::try_new(&buf)?;
        wkb_to_gpkg_geometry(wkb, self.srs_id())
    }
}
