//! Geometry conversion between GeoJSON and the stored WKB.

use crate::error::{GpkgError, Result};
use crate::sql_functions::{Envelope, geometry_envelope};
use crate::types::BoundingBox;
use geo_traits::{
    CoordTrait, Dimensions, GeometryCollectionTrait, GeometryTrait, LineStringTrait, LineTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait, RectTrait,
    TriangleTrait,
};
use wkt::Wkt;
use wkt::types::{
    Coord, Dimension, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};

type Position = Vec<f64>;

/// Convert a GeoJSON geometry for insertion.
///
/// Z is kept when every position of the geometry carries one, otherwise the
/// whole geometry is written as XY. Coordinates past the third are dropped.
pub(crate) fn geometry_from_geojson(geometry: &geojson::Geometry) -> Result<Wkt<f64>> {
    let mut min_len: Option<usize> = None;
    visit_positions(&geometry.value, &mut |position: &Position| {
        if position.len() < 2 {
            return Err(GpkgError::UnsupportedGeometryType(format!(
                "position with {} coordinates",
                position.len()
            )));
        }
        min_len = Some(min_len.map_or(position.len(), |len| len.min(position.len())));
        Ok(())
    })?;

    let dim = match min_len {
        Some(len) if len >= 3 => Dimension::XYZ,
        _ => Dimension::XY,
    };
    Ok(wkt_geometry(&geometry.value, dim))
}

fn visit_positions<F>(value: &geojson::Value, f: &mut F) -> Result<()>
where
    F: FnMut(&Position) -> Result<()>,
{
    use geojson::Value;

    match value {
        Value::Point(position) => f(position),
        Value::MultiPoint(positions) | Value::LineString(positions) => {
            positions.iter().try_for_each(|position| f(position))
        }
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            lines.iter().flatten().try_for_each(|position| f(position))
        }
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .flatten()
            .flatten()
            .try_for_each(|position| f(position)),
        Value::GeometryCollection(geometries) => geometries
            .iter()
            .try_for_each(|geometry| visit_positions(&geometry.value, f)),
    }
}

// Positions are known to hold at least x and y.
fn wkt_geometry(value: &geojson::Value, dim: Dimension) -> Wkt<f64> {
    use geojson::Value;

    match value {
        Value::Point(position) => Wkt::Point(wkt_point(position, dim)),
        Value::MultiPoint(positions) => Wkt::MultiPoint(MultiPoint::new(
            positions.iter().map(|p| wkt_point(p, dim)).collect(),
            dim,
        )),
        Value::LineString(positions) => Wkt::LineString(wkt_line_string(positions, dim)),
        Value::MultiLineString(lines) => Wkt::MultiLineString(MultiLineString::new(
            lines.iter().map(|line| wkt_line_string(line, dim)).collect(),
            dim,
        )),
        Value::Polygon(rings) => Wkt::Polygon(wkt_polygon(rings, dim)),
        Value::MultiPolygon(polygons) => Wkt::MultiPolygon(MultiPolygon::new(
            polygons.iter().map(|rings| wkt_polygon(rings, dim)).collect(),
            dim,
        )),
        Value::GeometryCollection(geometries) => {
            Wkt::GeometryCollection(GeometryCollection::new(
                geometries
                    .iter()
                    .map(|geometry| wkt_geometry(&geometry.value, dim))
                    .collect(),
                dim,
            ))
        }
    }
}

fn wkt_coord(position: &[f64], dim: Dimension) -> Coord<f64> {
    Coord {
        x: position[0],
        y: position[1],
        z: match dim {
            Dimension::XYZ => position.get(2).copied(),
            _ => None,
        },
        m: None,
    }
}

fn wkt_point(position: &[f64], dim: Dimension) -> Point<f64> {
    Point::new(Some(wkt_coord(position, dim)), dim)
}

fn wkt_line_string(positions: &[Position], dim: Dimension) -> LineString<f64> {
    LineString::new(positions.iter().map(|p| wkt_coord(p, dim)).collect(), dim)
}

fn wkt_polygon(rings: &[Vec<Position>], dim: Dimension) -> Polygon<f64> {
    Polygon::new(
        rings.iter().map(|ring| wkt_line_string(ring, dim)).collect(),
        dim,
    )
}

/// Extent of a set of geometries, `None` when all are missing or empty.
pub(crate) fn geometries_extent<'a, G, I>(geometries: I) -> Option<BoundingBox>
where
    G: GeometryTrait<T = f64> + 'a,
    I: IntoIterator<Item = &'a G>,
{
    geometries
        .into_iter()
        .filter_map(|geometry| geometry_envelope(geometry))
        .reduce(Envelope::union)
        .map(BoundingBox::from)
}

/// Build a GeoJSON geometry value from any geometry, keeping z when present.
pub(crate) fn to_geojson_value<G: GeometryTrait<T = f64>>(geom: &G) -> geojson::Value {
    use geo_traits::GeometryType as GeoType;
    use geojson::Value;

    match geom.as_type() {
        GeoType::Point(point) => match point.coord() {
            Some(coord) => Value::Point(position(&coord)),
            None => Value::GeometryCollection(Vec::new()),
        },
        GeoType::LineString(line) => Value::LineString(line_positions(line)),
        GeoType::Polygon(polygon) => Value::Polygon(polygon_rings(polygon)),
        GeoType::MultiPoint(multi) => Value::MultiPoint(
            multi
                .points()
                .filter_map(|point| point.coord().map(|coord| position(&coord)))
                .collect(),
        ),
        GeoType::MultiLineString(multi) => Value::MultiLineString(
            multi
                .line_strings()
                .map(|line| line_positions(&line))
                .collect(),
        ),
        GeoType::MultiPolygon(multi) => Value::MultiPolygon(
            multi
                .polygons()
                .map(|polygon| polygon_rings(&polygon))
                .collect(),
        ),
        GeoType::GeometryCollection(collection) => Value::GeometryCollection(
            collection
                .geometries()
                .map(|geometry| geojson::Geometry::new(to_geojson_value(&geometry)))
                .collect(),
        ),
        GeoType::Rect(rect) => {
            let (min, max) = (position(&rect.min()), position(&rect.max()));
            Value::Polygon(vec![vec![
                vec![min[0], min[1]],
                vec![max[0], min[1]],
                vec![max[0], max[1]],
                vec![min[0], max[1]],
                vec![min[0], min[1]],
            ]])
        }
        GeoType::Triangle(triangle) => {
            let first = position(&triangle.first());
            Value::Polygon(vec![vec![
                first.clone(),
                position(&triangle.second()),
                position(&triangle.third()),
                first,
            ]])
        }
        GeoType::Line(line) => {
            Value::LineString(vec![position(&line.start()), position(&line.end())])
        }
    }
}

fn position<C: CoordTrait<T = f64>>(coord: &C) -> Position {
    let mut position = vec![coord.x(), coord.y()];
    if matches!(coord.dim(), Dimensions::Xyz | Dimensions::Xyzm) {
        if let Some(z) = coord.nth(2) {
            position.push(z);
        }
    }
    position
}

fn line_positions<L: LineStringTrait<T = f64>>(line: &L) -> Vec<Position> {
    line.coords().map(|coord| position(&coord)).collect()
}

fn polygon_rings<P: PolygonTrait<T = f64>>(polygon: &P) -> Vec<Vec<Position>> {
    polygon
        .exterior()
        .into_iter()
        .map(|ring| line_positions(&ring))
        .chain(polygon.interiors().map(|ring| line_positions(&ring)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{geometries_extent, geometry_from_geojson, to_geojson_value};
    use crate::Result;
    use crate::error::GpkgError;
    use crate::types::BoundingBox;
    use geo_traits::{Dimensions, GeometryTrait};
    use geo_types::{Geometry, Point, line_string};
    use serde_json::json;
    use std::str::FromStr;
    use wkt::Wkt;

    fn geojson_geometry(value: serde_json::Value) -> geojson::Geometry {
        serde_json::from_value(value).expect("valid geometry")
    }

    fn wkt(text: &str) -> Result<Wkt<f64>> {
        Wkt::<f64>::from_str(text)
            .map_err(|err| GpkgError::UnsupportedGeometryType(err.to_string()))
    }

    #[test]
    fn converts_geojson_polygons() -> Result<()> {
        let geometry = geojson_geometry(json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [4.0, 0.0], [4.0, 3.0], [0.0, 0.0]]]
        }));
        let converted = geometry_from_geojson(&geometry)?;
        assert_eq!(converted, wkt("POLYGON ((0 0, 4 0, 4 3, 0 0))")?);
        assert_eq!(converted.dim(), Dimensions::Xy);
        Ok(())
    }

    #[test]
    fn keeps_z_when_every_position_has_one() -> Result<()> {
        let point = geojson_geometry(json!({"type": "Point", "coordinates": [1.0, 2.0, 3.0]}));
        let converted = geometry_from_geojson(&point)?;
        assert_eq!(converted.dim(), Dimensions::Xyz);
        assert_eq!(
            to_geojson_value(&converted),
            geojson::Value::Point(vec![1.0, 2.0, 3.0])
        );

        let collection = geojson_geometry(json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [1.0, 2.0, 3.0, 4.0]},
                {"type": "LineString", "coordinates": [[0.0, 0.0, 1.0], [1.0, 1.0, 2.0]]}
            ]
        }));
        assert_eq!(
            geometry_from_geojson(&collection)?,
            wkt("GEOMETRYCOLLECTION Z (POINT Z (1 2 3), LINESTRING Z (0 0 1, 1 1 2))")?
        );
        Ok(())
    }

    #[test]
    fn mixed_dimensions_fall_back_to_xy() -> Result<()> {
        let line = geojson_geometry(json!({
            "type": "LineString",
            "coordinates": [[0.0, 0.0, 5.0], [1.0, 1.0]]
        }));
        assert_eq!(
            geometry_from_geojson(&line)?,
            wkt("LINESTRING (0 0, 1 1)")?
        );
        Ok(())
    }

    #[test]
    fn rejects_short_positions() {
        let geometry = geojson::Geometry::new(geojson::Value::LineString(vec![
            vec![1.0, 2.0],
            vec![3.0],
        ]));
        let err = geometry_from_geojson(&geometry).expect_err("short position");
        assert!(matches!(err, GpkgError::UnsupportedGeometryType(_)));
    }

    #[test]
    fn extent_spans_all_geometries() {
        let geometries = [
            Geometry::Point(Point::new(-5.0, 3.0)),
            Geometry::LineString(line_string![(x: 1.0, y: -2.0), (x: 7.0, y: 0.5)]),
        ];
        assert_eq!(
            geometries_extent(&geometries),
            Some(BoundingBox::new(-5.0, -2.0, 7.0, 3.0))
        );
        assert_eq!(geometries_extent(Vec::<Geometry>::new().iter()), None);
    }

    #[test]
    fn writes_back_z_coordinates() -> Result<()> {
        let point_z = wkt("POINT Z (1 2 3)")?;
        assert_eq!(
            to_geojson_value(&point_z),
            geojson::Value::Point(vec![1.0, 2.0, 3.0])
        );

        let polygon = wkt("POLYGON ((0 0, 2 0, 2 2, 0 0), (0.5 0.5, 1 0.5, 1 1, 0.5 0.5))")?;
        match to_geojson_value(&polygon) {
            geojson::Value::Polygon(rings) => {
                assert_eq!(rings.len(), 2);
                assert_eq!(rings[1][0], vec![0.5, 0.5]);
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn rect_becomes_closed_polygon() {
        let rect = geo_types::Rect::new((0.0, 0.0), (2.0, 1.0));
        let value = to_geojson_value(&rect);
        assert_eq!(
            value,
            geojson::Value::Polygon(vec![vec![
                vec![0.0, 0.0],
                vec![2.0, 0.0],
                vec![2.0, 1.0],
                vec![0.0, 1.0],
                vec![0.0, 0.0],
            ]])
        );
    }
}
