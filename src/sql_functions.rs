//! Envelope SQL functions over GeoPackage geometry blobs.
//!
//! The R-tree triggers, the geometry index loader and the extent scans all
//! call these, so every connection opened through [`crate::Gpkg`] has them.

use crate::error::Result;
use crate::gpkg::gpkg_geometry_to_wkb;
use crate::types::BoundingBox;
use geo_traits::{
    CoordTrait, GeometryCollectionTrait, GeometryTrait, GeometryType, LineStringTrait, LineTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait, RectTrait,
    TriangleTrait,
};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};

/// Planar x/y envelope of a geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Envelope {
    pub(crate) min_x: f64,
    pub(crate) min_y: f64,
    pub(crate) max_x: f64,
    pub(crate) max_y: f64,
}

impl Envelope {
    fn of_coord<C: CoordTrait<T = f64>>(coord: &C) -> Self {
        let (x, y) = coord.x_y();
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    pub(crate) fn union(self, other: Envelope) -> Envelope {
        Envelope {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

impl From<Envelope> for BoundingBox {
    fn from(envelope: Envelope) -> Self {
        BoundingBox::new(
            envelope.min_x,
            envelope.min_y,
            envelope.max_x,
            envelope.max_y,
        )
    }
}

type EnvelopeComponent = fn(&Envelope) -> f64;

const ENVELOPE_FUNCTIONS: [(&str, EnvelopeComponent); 4] = [
    ("ST_MinX", |envelope: &Envelope| envelope.min_x),
    ("ST_MinY", |envelope: &Envelope| envelope.min_y),
    ("ST_MaxX", |envelope: &Envelope| envelope.max_x),
    ("ST_MaxY", |envelope: &Envelope| envelope.max_y),
];

/// Register the `ST_MinX`, `ST_MinY`, `ST_MaxX`, `ST_MaxY` and `ST_IsEmpty`
/// functions on a connection.
///
/// All of them take a GeoPackage geometry blob and return NULL for a NULL
/// argument. The envelope functions also return NULL for empty geometries.
///
/// ```no_run
/// use rusqlite::Connection;
/// use geojson_gpkg::register_spatial_functions;
///
/// let conn = Connection::open_in_memory()?;
/// register_spatial_functions(&conn)?;
/// # Ok::<(), geojson_gpkg::GpkgError>(())
/// ```
pub fn register_spatial_functions(conn: &Connection) -> Result<()> {
    for (name, component) in ENVELOPE_FUNCTIONS {
        conn.create_scalar_function(name, 1, FunctionFlags::SQLITE_DETERMINISTIC, move |ctx| {
            Ok(argument_envelope(ctx)?
                .flatten()
                .map(|envelope| component(&envelope)))
        })?;
    }

    conn.create_scalar_function(
        "ST_IsEmpty",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(argument_envelope(ctx)?.map(|envelope| i64::from(envelope.is_none()))),
    )?;
    Ok(())
}

// Outer `None` for a NULL argument, inner `None` for an empty geometry.
fn argument_envelope(ctx: &Context<'_>) -> rusqlite::Result<Option<Option<Envelope>>> {
    match ctx.get_raw(0) {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => {
            let wkb = gpkg_geometry_to_wkb(blob)
                .map_err(|err| Error::UserFunctionError(Box::new(err)))?;
            Ok(Some(geometry_envelope(&wkb)))
        }
        _ => Err(Error::InvalidFunctionParameterType(0, Type::Blob)),
    }
}

/// Envelope of any geometry, `None` when it holds no coordinate.
pub(crate) fn geometry_envelope<G: GeometryTrait<T = f64>>(geom: &G) -> Option<Envelope> {
    match geom.as_type() {
        GeometryType::Point(point) => point.coord().map(|coord| Envelope::of_coord(&coord)),
        GeometryType::LineString(line) => coords_envelope(line.coords()),
        GeometryType::Polygon(polygon) => polygon_envelope(polygon),
        GeometryType::MultiPoint(multi) => union_all(
            multi
                .points()
                .map(|point| point.coord().map(|coord| Envelope::of_coord(&coord))),
        ),
        GeometryType::MultiLineString(multi) => {
            union_all(multi.line_strings().map(|line| coords_envelope(line.coords())))
        }
        GeometryType::MultiPolygon(multi) => {
            union_all(multi.polygons().map(|polygon| polygon_envelope(&polygon)))
        }
        GeometryType::GeometryCollection(collection) => {
            union_all(collection.geometries().map(|child| geometry_envelope(&child)))
        }
        GeometryType::Rect(rect) => coords_envelope([rect.min(), rect.max()].into_iter()),
        GeometryType::Triangle(triangle) => coords_envelope(
            [triangle.first(), triangle.second(), triangle.third()].into_iter(),
        ),
        GeometryType::Line(line) => coords_envelope([line.start(), line.end()].into_iter()),
    }
}

fn polygon_envelope<P: PolygonTrait<T = f64>>(polygon: &P) -> Option<Envelope> {
    union_all(
        polygon
            .exterior()
            .into_iter()
            .chain(polygon.interiors())
            .map(|ring| coords_envelope(ring.coords())),
    )
}

fn coords_envelope<C, I>(coords: I) -> Option<Envelope>
where
    C: CoordTrait<T = f64>,
    I: Iterator<Item = C>,
{
    coords
        .map(|coord| Envelope::of_coord(&coord))
        .reduce(Envelope::union)
}

fn union_all<I: Iterator<Item = Option<Envelope>>>(envelopes: I) -> Option<Envelope> {
    envelopes.flatten().reduce(Envelope::union)
}
