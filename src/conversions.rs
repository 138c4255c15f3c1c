use crate::error::GpkgError;
use crate::types::{ColumnType, ZmFlag};

/// `None` stands for the generic `GEOMETRY` type.
#[inline]
pub(crate) fn geometry_type_to_str(geometry_type: Option<wkb::reader::GeometryType>) -> &'static str {
    match geometry_type {
        None => "GEOMETRY",
        Some(wkb::reader::GeometryType::GeometryCollection) => "GEOMETRYCOLLECTION",
        Some(wkb::reader::GeometryType::Point) => "POINT",
        Some(wkb::reader::GeometryType::LineString) => "LINESTRING",
        Some(wkb::reader::GeometryType::Polygon) => "POLYGON",
        Some(wkb::reader::GeometryType::MultiPoint) => "MULTIPOINT",
        Some(wkb::reader::GeometryType::MultiLineString) => "MULTILINESTRING",
        Some(wkb::reader::GeometryType::MultiPolygon) => "MULTIPOLYGON",
        #[allow(unreachable_patterns)]
        Some(_) => "GEOMETRY",
    }
}

#[inline]
pub(crate) fn geometry_type_from_str(
    geometry_type_str: &str,
) -> Result<Option<wkb::reader::GeometryType>, GpkgError> {
    let s = geometry_type_str;
    if s.eq_ignore_ascii_case("GEOMETRY") {
        Ok(None)
    } else if s.eq_ignore_ascii_case("GEOMETRYCOLLECTION") {
        Ok(Some(wkb::reader::GeometryType::GeometryCollection))
    } else if s.eq_ignore_ascii_case("POINT") {
        Ok(Some(wkb::reader::GeometryType::Point))
    } else if s.eq_ignore_ascii_case("LINESTRING") {
        Ok(Some(wkb::reader::GeometryType::LineString))
    } else if s.eq_ignore_ascii_case("POLYGON") {
        Ok(Some(wkb::reader::GeometryType::Polygon))
    } else if s.eq_ignore_ascii_case("MULTIPOINT") {
        Ok(Some(wkb::reader::GeometryType::MultiPoint))
    } else if s.eq_ignore_ascii_case("MULTILINESTRING") {
        Ok(Some(wkb::reader::GeometryType::MultiLineString))
    } else if s.eq_ignore_ascii_case("MULTIPOLYGON") {
        Ok(Some(wkb::reader::GeometryType::MultiPolygon))
    } else {
        Err(GpkgError::UnsupportedGeometryType(
            geometry_type_str.to_string(),
        ))
    }
}

#[inline]
pub(crate) fn zm_flag_to_i8(flag: ZmFlag) -> i8 {
    match flag {
        ZmFlag::Prohibited => 0,
        ZmFlag::Mandatory => 1,
        ZmFlag::Optional => 2,
    }
}

// GeoPackage defines z and m as
//
//   0: z/m values prohibited
//   1: z/m values mandatory
//   2: z/m values optional
#[inline]
pub(crate) fn zm_flags_from_i8(z: i8, m: i8) -> Result<(ZmFlag, ZmFlag), GpkgError> {
    let to_flag = |v: i8| match v {
        0 => Some(ZmFlag::Prohibited),
        1 => Some(ZmFlag::Mandatory),
        2 => Some(ZmFlag::Optional),
        _ => None,
    };
    match (to_flag(z), to_flag(m)) {
        (Some(z), Some(m)) => Ok((z, m)),
        _ => Err(GpkgError::InvalidDimension { z, m }),
    }
}

#[inline]
pub(crate) fn column_type_to_str(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer => "INTEGER",
        ColumnType::Double => "DOUBLE",
        ColumnType::Varchar => "TEXT",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::DateTime => "DATETIME",
        ColumnType::Geometry => "GEOMETRY",
    }
}

#[inline]
pub(crate) fn column_type_from_str(column_type_str: &str) -> Option<ColumnType> {
    let s = column_type_str;
    if s.eq_ignore_ascii_case("TINYINT")
        || s.eq_ignore_ascii_case("SMALLINT")
        || s.eq_ignore_ascii_case("MEDIUMINT")
        || s.eq_ignore_ascii_case("INT")
        || s.eq_ignore_ascii_case("INTEGER")
    {
        Some(ColumnType::Integer)
    } else if s.eq_ignore_ascii_case("DOUBLE")
        || s.eq_ignore_ascii_case("FLOAT")
        || s.eq_ignore_ascii_case("REAL")
    {
        Some(ColumnType::Double)
    } else if s.eq_ignore_ascii_case("TEXT") {
        Some(ColumnType::Varchar)
    } else if s.eq_ignore_ascii_case("BOOLEAN") {
        Some(ColumnType::Boolean)
    } else if s.eq_ignore_ascii_case("DATETIME") || s.eq_ignore_ascii_case("DATE") {
        Some(ColumnType::DateTime)
    } else if s.eq_ignore_ascii_case("BLOB")
        || s.eq_ignore_ascii_case("GEOMETRY")
        || s.eq_ignore_ascii_case("POINT")
        || s.eq_ignore_ascii_case("LINESTRING")
        || s.eq_ignore_ascii_case("POLYGON")
        || s.eq_ignore_ascii_case("MULTIPOINT")
        || s.eq_ignore_ascii_case("MULTILINESTRING")
        || s.eq_ignore_ascii_case("MULTIPOLYGON")
        || s.eq_ignore_ascii_case("GEOMETRYCOLLECTION")
    {
        Some(ColumnType::Geometry)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_geometry_type_roundtrips() -> Result<(), GpkgError> {
        assert_eq!(geometry_type_to_str(None), "GEOMETRY");
        assert_eq!(geometry_type_from_str("geometry")?, None);
        assert_eq!(
            geometry_type_from_str("MultiPolygon")?,
            Some(wkb::reader::GeometryType::MultiPolygon)
        );
        assert!(geometry_type_from_str("CURVEPOLYGON").is_err());
        Ok(())
    }

    #[test]
    fn zm_flags_accept_optional() -> Result<(), GpkgError> {
        assert_eq!(
            zm_flags_from_i8(2, 0)?,
            (ZmFlag::Optional, ZmFlag::Prohibited)
        );
        assert!(matches!(
            zm_flags_from_i8(3, 0),
            Err(GpkgError::InvalidDimension { z: 3, m: 0 })
        ));
        Ok(())
    }
}
