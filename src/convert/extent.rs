use crate::error::{GpkgError, Result};
use crate::gpkg::{FeatureIndexManager, FeatureIndexType, GpkgLayer};
use crate::types::BoundingBox;

/// Where a table extent came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtentSource {
    Rtree,
    GeometryIndex,
    /// Scan of the stored geometries.
    TableScan,
    /// Geometries of the collection that was just inserted.
    InsertedFeatures,
    WorldDefault,
}

/// Computes the extent to record in `gpkg_contents` for a feature table.
///
/// Preference order: the R-tree index, then the geometry index, then the
/// geometries that were just inserted, then a scan of the table, then the
/// whole world. The result is always clamped to valid lon/lat ranges.
pub struct ExtentCalculator<'a> {
    layer: &'a GpkgLayer<'a>,
    inserted: Option<BoundingBox>,
}

impl<'a> ExtentCalculator<'a> {
    pub fn new(layer: &'a GpkgLayer<'a>) -> Self {
        Self {
            layer,
            inserted: None,
        }
    }

    /// Extent of the geometries inserted by the current conversion, used when
    /// the table has no index.
    pub fn with_inserted_extent(mut self, extent: Option<BoundingBox>) -> Self {
        self.inserted = extent;
        self
    }

    pub fn calculate(&self) -> Result<(BoundingBox, ExtentSource)> {
        let (extent, source) = self.find_extent()?;
        Ok((extent.clamped(), source))
    }

    fn find_extent(&self) -> Result<(BoundingBox, ExtentSource)> {
        let mut manager = FeatureIndexManager::new(self.layer);

        if manager.is_indexed()? {
            let source = if manager.is_indexed_for_type(FeatureIndexType::Rtree)? {
                manager.set_index_location(FeatureIndexType::Rtree);
                ExtentSource::Rtree
            } else if manager.is_indexed_for_type(FeatureIndexType::Geopackage)? {
                manager.set_index_location(FeatureIndexType::Geopackage);
                ExtentSource::GeometryIndex
            } else {
                ExtentSource::TableScan
            };
            if let Some(extent) = manager.bounding_box()? {
                return Ok((extent, source));
            }
        } else {
            if let Some(extent) = self.inserted {
                return Ok((extent, ExtentSource::InsertedFeatures));
            }
            if let Some(extent) = manager.bounding_box()? {
                return Ok((extent, ExtentSource::TableScan));
            }
        }

        Ok((BoundingBox::WORLD, ExtentSource::WorldDefault))
    }

    /// Calculate the extent and write it to the table's `gpkg_contents` row,
    /// overwriting whatever was recorded before.
    pub fn update_contents(&self) -> Result<BoundingBox> {
        let gpkg = self.layer.gpkg();
        let table_name = &self.layer.layer_name;
        let mut contents = gpkg
            .contents(table_name)?
            .ok_or_else(|| GpkgError::MissingLayer {
                layer_name: table_name.clone(),
            })?;

        let (extent, source) = self.calculate()?;
        log::debug!("extent of {table_name} from {source:?}: {extent:?}");

        contents.set_bounding_box(&extent);
        gpkg.update_contents(&contents)?;
        Ok(extent)
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtentCalculator, ExtentSource};
    use crate::Result;
    use crate::gpkg::{FeatureIndexManager, FeatureIndexType, Gpkg, GpkgLayer};
    use crate::types::{BoundingBox, GeometryColumn};
    use geo_types::Point;

    fn layer_with_points<'a>(gpkg: &'a Gpkg, points: &[(f64, f64)]) -> Result<GpkgLayer<'a>> {
        let layer = gpkg.create_layer(
            "points",
            "id",
            &GeometryColumn::generic("geometry", 4326),
            &[],
            &BoundingBox::WORLD,
        )?;
        for (x, y) in points {
            layer.insert(Some(Point::new(*x, *y)), [])?;
        }
        Ok(layer)
    }

    fn drop_rtree_registration(gpkg: &Gpkg) -> Result<()> {
        gpkg.connection().execute(
            "DELETE FROM gpkg_extensions WHERE extension_name = 'gpkg_rtree_index'",
            [],
        )?;
        Ok(())
    }

    #[test]
    fn prefers_rtree() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = layer_with_points(&gpkg, &[(1.0, 2.0), (-3.0, 4.0)])?;

        let calculator = ExtentCalculator::new(&layer)
            .with_inserted_extent(Some(BoundingBox::new(0.0, 0.0, 0.5, 0.5)));
        assert_eq!(
            calculator.calculate()?,
            (BoundingBox::new(-3.0, 2.0, 1.0, 4.0), ExtentSource::Rtree)
        );
        Ok(())
    }

    #[test]
    fn falls_back_to_geometry_index() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = layer_with_points(&gpkg, &[(10.0, 20.0), (12.0, 22.0)])?;
        drop_rtree_registration(&gpkg)?;
        FeatureIndexManager::new(&layer).index(FeatureIndexType::Geopackage)?;

        let (extent, source) = ExtentCalculator::new(&layer).calculate()?;
        assert_eq!(source, ExtentSource::GeometryIndex);
        assert_eq!(extent, BoundingBox::new(10.0, 20.0, 12.0, 22.0));
        Ok(())
    }

    #[test]
    fn unindexed_tables_use_inserted_geometries_then_scan() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = layer_with_points(&gpkg, &[(5.0, 6.0)])?;
        drop_rtree_registration(&gpkg)?;

        let inserted = BoundingBox::new(1.0, 1.0, 2.0, 2.0);
        assert_eq!(
            ExtentCalculator::new(&layer)
                .with_inserted_extent(Some(inserted))
                .calculate()?,
            (inserted, ExtentSource::InsertedFeatures)
        );
        assert_eq!(
            ExtentCalculator::new(&layer).calculate()?,
            (BoundingBox::new(5.0, 6.0, 5.0, 6.0), ExtentSource::TableScan)
        );
        Ok(())
    }

    #[test]
    fn empty_table_gets_world_extent() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = layer_with_points(&gpkg, &[])?;
        assert_eq!(
            ExtentCalculator::new(&layer).calculate()?,
            (BoundingBox::WORLD, ExtentSource::WorldDefault)
        );
        Ok(())
    }

    #[test]
    fn extent_is_clamped_and_persisted() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = layer_with_points(&gpkg, &[(-500.0, 10.0), (20.0, 100.0)])?;

        let extent = ExtentCalculator::new(&layer).update_contents()?;
        assert_eq!(extent, BoundingBox::new(-180.0, 10.0, 20.0, 90.0));

        let contents = gpkg.contents("points")?.expect("contents row");
        assert_eq!(contents.bounding_box(), Some(extent));
        Ok(())
    }
}
