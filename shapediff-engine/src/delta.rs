//! 实体级几何差异：对比两个版本的解析结果，得到新增、保留、移除部分以及膨胀后的差异包络。

use std::collections::BTreeMap;

use geo::{
    BooleanOps, Buffer, Geometry, GeometryCollection, Intersects, LineString, MultiLineString,
    MultiPoint, MultiPolygon, Point, Polygon,
};
use serde::Serialize;
use shapediff_core::document::Document;
use tracing::{debug, info, warn};

use crate::errors::EngineError;
use crate::resolve::{ResolveOptions, Resolver};
use crate::section_diff::{FieldDelta, SectionDiff};

#[derive(Debug, Clone)]
pub struct DeltaOptions {
    /// 差异包络的膨胀距离。
    pub dilation: f64,
    /// 线与线求差时使用的缓冲宽度。
    pub overlay_tolerance: f64,
    /// 为真时前后几何数量不一致直接报错。
    pub strict_pairing: bool,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            dilation: 10.0,
            overlay_tolerance: 1e-4,
            strict_pairing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    New,
    Deleted,
    Modified,
}

/// 单个句柄的几何与字段差异。
#[derive(Debug, Clone, Serialize)]
pub struct EntityDelta {
    pub kind: DeltaKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub new_geometry: Vec<Geometry<f64>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted_geometry: Vec<Geometry<f64>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<Geometry<f64>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remaining: Vec<Geometry<f64>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<Geometry<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_point: Option<Point<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_point: Option<Point<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_buffer: Option<MultiPolygon<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldDelta>,
}

impl EntityDelta {
    fn new(kind: DeltaKind) -> Self {
        Self {
            kind,
            new_geometry: Vec::new(),
            deleted_geometry: Vec::new(),
            added: Vec::new(),
            remaining: Vec::new(),
            removed: Vec::new(),
            before_point: None,
            after_point: None,
            diff_buffer: None,
            fields: None,
        }
    }
}

/// 对 ENTITIES 段的比对结果逐句柄计算几何差异。
pub fn entity_differences(
    before: &Document,
    after: &Document,
    diff: &SectionDiff,
    resolve: &ResolveOptions,
    options: &DeltaOptions,
) -> Result<BTreeMap<String, EntityDelta>, EngineError> {
    let before_resolver = Resolver::new(before, resolve.clone());
    let after_resolver = Resolver::new(after, resolve.clone());
    let mut deltas = BTreeMap::new();

    for handle in &diff.created {
        let mut delta = EntityDelta::new(DeltaKind::New);
        delta.new_geometry = geometries_of(&after_resolver, handle);
        delta.diff_buffer = envelope(&delta.new_geometry, options.dilation);
        deltas.insert(handle.clone(), delta);
    }

    for handle in &diff.deleted {
        let mut delta = EntityDelta::new(DeltaKind::Deleted);
        delta.deleted_geometry = geometries_of(&before_resolver, handle);
        delta.diff_buffer = envelope(&delta.deleted_geometry, options.dilation);
        deltas.insert(handle.clone(), delta);
    }

    for (handle, fields) in &diff.modified {
        let mut delta = EntityDelta::new(DeltaKind::Modified);
        delta.fields = Some(fields.clone());
        let previous = geometries_of(&before_resolver, handle);
        let current = geometries_of(&after_resolver, handle);
        if previous.len() != current.len() {
            if options.strict_pairing {
                return Err(EngineError::MalformedPairing {
                    handle: handle.clone(),
                    before: previous.len(),
                    after: current.len(),
                });
            }
            warn!(
                handle = %handle,
                before = previous.len(),
                after = current.len(),
                "前后几何数量不一致，按较短一侧配对"
            );
        }

        let mut touched: Vec<Geometry<f64>> = Vec::new();
        for (old, new) in previous.iter().zip(&current) {
            if let (Geometry::Point(old_point), Geometry::Point(new_point)) = (old, new) {
                if delta.before_point.is_none() {
                    delta.before_point = Some(*old_point);
                    delta.after_point = Some(*new_point);
                }
                touched.push(old.clone());
                touched.push(new.clone());
                continue;
            }
            let overlay = overlay(old, new, options.overlay_tolerance);
            delta.added.extend(overlay.added);
            delta.remaining.extend(overlay.remaining);
            delta.removed.extend(overlay.removed);
            touched.push(old.clone());
            touched.push(new.clone());
        }
        delta.diff_buffer = envelope(&touched, options.dilation);
        deltas.insert(handle.clone(), delta);
    }

    info!(
        created = diff.created.len(),
        deleted = diff.deleted.len(),
        modified = diff.modified.len(),
        "几何差异计算完成"
    );
    Ok(deltas)
}

/// 在实体数据库中查找句柄并解析；找不到时记录日志并返回空列表。
fn geometries_of(resolver: &Resolver<'_>, handle: &str) -> Vec<Geometry<f64>> {
    match resolver.document().entity_by_handle(handle) {
        Some(entity) => resolver.resolve(entity).map(|resolved| resolved.geometry).collect(),
        None => {
            debug!(handle = %handle, "实体数据库中没有该句柄，跳过几何");
            Vec::new()
        }
    }
}

/// 按维度拆分的几何分量。
#[derive(Debug, Default)]
struct Parts {
    polygons: Vec<Polygon<f64>>,
    lines: Vec<LineString<f64>>,
    points: Vec<Point<f64>>,
}

impl Parts {
    fn of(geometry: &Geometry<f64>) -> Self {
        let mut parts = Parts::default();
        parts.collect(geometry);
        parts
    }

    fn collect(&mut self, geometry: &Geometry<f64>) {
        match geometry {
            Geometry::Point(point) => self.points.push(*point),
            Geometry::MultiPoint(points) => self.points.extend(points.0.iter().copied()),
            Geometry::Line(line) => self.lines.push(LineString::new(vec![line.start, line.end])),
            Geometry::LineString(line) => self.lines.push(line.clone()),
            Geometry::MultiLineString(lines) => self.lines.extend(lines.0.iter().cloned()),
            Geometry::Polygon(polygon) => self.polygons.push(polygon.clone()),
            Geometry::MultiPolygon(polygons) => self.polygons.extend(polygons.0.iter().cloned()),
            Geometry::Rect(rect) => self.polygons.push(rect.to_polygon()),
            Geometry::Triangle(triangle) => self.polygons.push(triangle.to_polygon()),
            Geometry::GeometryCollection(collection) => {
                for part in &collection.0 {
                    self.collect(part);
                }
            }
        }
    }

    fn areas(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(self.polygons.clone())
    }

    fn line_work(&self) -> MultiLineString<f64> {
        MultiLineString::new(self.lines.clone())
    }

    /// 面本身加上线与点按容差缓冲后的覆盖区域。
    fn cover(&self, tolerance: f64) -> MultiPolygon<f64> {
        let mut cover = self.areas();
        if !self.lines.is_empty() {
            cover = cover.union(&self.line_work().buffer(tolerance));
        }
        if !self.points.is_empty() {
            cover = cover.union(&MultiPoint::new(self.points.clone()).buffer(tolerance));
        }
        cover
    }

    /// 按给定距离膨胀全部分量。
    fn dilate(&self, distance: f64) -> MultiPolygon<f64> {
        let mut result = MultiPolygon::new(Vec::new());
        if !self.polygons.is_empty() {
            result = result.union(&self.areas().buffer(distance));
        }
        if !self.lines.is_empty() {
            result = result.union(&self.line_work().buffer(distance));
        }
        if !self.points.is_empty() {
            result = result.union(&MultiPoint::new(self.points.clone()).buffer(distance));
        }
        result
    }
}

#[derive(Debug, Default)]
struct Overlay {
    added: Option<Geometry<f64>>,
    remaining: Option<Geometry<f64>>,
    removed: Option<Geometry<f64>>,
}

/// 新增 = 后 − 前，保留 = 前 ∩ 后，移除 = 前 − 后。线状分量按覆盖区域裁剪。
fn overlay(before: &Geometry<f64>, after: &Geometry<f64>, tolerance: f64) -> Overlay {
    let old = Parts::of(before);
    let new = Parts::of(after);
    let old_cover = old.cover(tolerance);
    let new_cover = new.cover(tolerance);

    let added_lines = old_cover.clip(&new.line_work(), true);
    let removed_lines = new_cover.clip(&old.line_work(), true);
    let kept_lines = old_cover.clip(&new.line_work(), false);

    Overlay {
        added: assemble(
            new.areas().difference(&old_cover),
            added_lines,
            uncovered(&new.points, &old_cover),
        ),
        remaining: assemble(
            old.areas().intersection(&new.areas()),
            kept_lines,
            covered(&new.points, &old_cover),
        ),
        removed: assemble(
            old.areas().difference(&new_cover),
            removed_lines,
            uncovered(&old.points, &new_cover),
        ),
    }
}

fn uncovered(points: &[Point<f64>], cover: &MultiPolygon<f64>) -> Vec<Point<f64>> {
    points.iter().filter(|p| !cover.intersects(*p)).copied().collect()
}

fn covered(points: &[Point<f64>], cover: &MultiPolygon<f64>) -> Vec<Point<f64>> {
    points.iter().filter(|p| cover.intersects(*p)).copied().collect()
}

/// 合并各维度结果；只有一类非空时直接返回该类几何。
fn assemble(
    areas: MultiPolygon<f64>,
    lines: MultiLineString<f64>,
    points: Vec<Point<f64>>,
) -> Option<Geometry<f64>> {
    let mut parts: Vec<Geometry<f64>> = Vec::new();
    if !areas.0.is_empty() {
        parts.push(Geometry::MultiPolygon(areas));
    }
    let lines: Vec<LineString<f64>> = lines.0.into_iter().filter(|l| l.0.len() >= 2).collect();
    if !lines.is_empty() {
        parts.push(Geometry::MultiLineString(MultiLineString::new(lines)));
    }
    if !points.is_empty() {
        parts.push(Geometry::MultiPoint(MultiPoint::new(points)));
    }
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(Geometry::GeometryCollection(GeometryCollection::new_from(parts))),
    }
}

/// 全部几何膨胀后的并集；没有几何时为 `None`。
fn envelope(geometries: &[Geometry<f64>], distance: f64) -> Option<MultiPolygon<f64>> {
    let mut parts = Parts::default();
    for geometry in geometries {
        parts.collect(geometry);
    }
    let dilated = parts.dilate(distance);
    (!dilated.0.is_empty()).then_some(dilated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, line_string, polygon};
    use shapediff_core::document::{Entity, EntityData, Line};
    use shapediff_core::geometry::Point2;

    fn area_of(geometries: &[Geometry<f64>]) -> f64 {
        geometries
            .iter()
            .map(|geometry| match geometry {
                Geometry::MultiPolygon(polygons) => polygons.unsigned_area(),
                Geometry::Polygon(polygon) => polygon.unsigned_area(),
                _ => 0.0,
            })
            .sum()
    }

    #[test]
    fn polygon_growth_is_split_into_parts() {
        let before = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 4.0),
            (x: 0.0, y: 4.0),
        ]);
        let after = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 6.0, y: 0.0),
            (x: 6.0, y: 4.0),
            (x: 0.0, y: 4.0),
        ]);
        let result = overlay(&before, &after, 1e-4);
        let added: Vec<_> = result.added.into_iter().collect();
        let remaining: Vec<_> = result.remaining.into_iter().collect();
        assert!((area_of(&added) - 8.0).abs() < 1e-6);
        assert!((area_of(&remaining) - 16.0).abs() < 1e-6);
        assert!(result.removed.is_none());
    }

    #[test]
    fn extended_line_reports_only_the_extension() {
        let before = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]);
        let after = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 12.0, y: 0.0)]);
        let result = overlay(&before, &after, 1e-4);
        match result.added {
            Some(Geometry::MultiLineString(lines)) => {
                let length: f64 = lines
                    .0
                    .iter()
                    .flat_map(|line| line.lines())
                    .map(|segment| (segment.end.x - segment.start.x).abs())
                    .sum();
                assert!((length - 2.0).abs() < 1e-3);
            }
            other => panic!("expected added line work, got {other:?}"),
        }
        assert!(result.removed.is_none());
        assert!(result.remaining.is_some());
    }

    fn document_with(entity: Entity) -> Document {
        let mut document = Document::new();
        document.add_entity(entity.with_handle("L"));
        document
    }

    fn mismatched_revisions() -> (Document, Document, SectionDiff) {
        let before = document_with(Entity::new(EntityData::Line(Line {
            start: Point2::new(0.0, 0.0),
            end: Point2::new(5.0, 0.0),
        })));
        let after = document_with(Entity::new(EntityData::Unsupported {
            dxf_type: "MESH".to_string(),
        }));
        let diff = SectionDiff {
            modified: vec![("L".to_string(), FieldDelta::default())],
            ..SectionDiff::default()
        };
        (before, after, diff)
    }

    #[test]
    fn strict_pairing_rejects_mismatched_geometry_counts() {
        let (before, after, diff) = mismatched_revisions();
        let result = entity_differences(
            &before,
            &after,
            &diff,
            &ResolveOptions::default(),
            &DeltaOptions::default(),
        );
        match result {
            Err(EngineError::MalformedPairing {
                handle,
                before,
                after,
            }) => {
                assert_eq!(handle, "L");
                assert_eq!((before, after), (1, 0));
            }
            other => panic!("expected pairing error, got {other:?}"),
        }
    }

    #[test]
    fn lenient_pairing_zips_to_the_shorter_side() {
        let (before, after, diff) = mismatched_revisions();
        let options = DeltaOptions {
            strict_pairing: false,
            ..DeltaOptions::default()
        };
        let deltas = entity_differences(&before, &after, &diff, &ResolveOptions::default(), &options)
            .expect("non-strict pairing succeeds");
        let delta = &deltas["L"];
        assert_eq!(delta.kind, DeltaKind::Modified);
        assert_eq!(delta.fields, Some(FieldDelta::default()));
        assert!(delta.added.is_empty() && delta.remaining.is_empty() && delta.removed.is_empty());
        assert!(delta.diff_buffer.is_none());
    }

    #[test]
    fn envelope_dilates_every_component() {
        let point = Geometry::Point(Point::new(0.0, 0.0));
        let dilated = envelope(&[point], 1.0).expect("non-empty envelope");
        let area = dilated.unsigned_area();
        assert!(area > 3.0 && area < std::f64::consts::PI + 1e-6);
        assert!(envelope(&[], 1.0).is_none());
    }
}
