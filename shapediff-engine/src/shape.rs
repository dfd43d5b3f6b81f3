//! 几何清理：去除重复点、丢弃退化环、修复自相交面。

use geo::{
    Area, BooleanOps, Coord, Geometry, GeometryCollection, Intersects, Line, LineString,
    MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use glam::DVec2;

use crate::flatten::round_to;

/// 坐标按精度取整后构造折线。
pub fn line_string(points: &[DVec2], precision: u32) -> LineString<f64> {
    LineString::new(
        points
            .iter()
            .map(|p| Coord {
                x: round_to(p.x, precision),
                y: round_to(p.y, precision),
            })
            .collect(),
    )
}

/// 清理几何。结果为空时返回 `None`；不会增加顶点。
pub fn clean(geometry: Geometry<f64>) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Point(point) => is_finite(point.0).then_some(Geometry::Point(point)),
        Geometry::Line(line) => {
            clean_line_string(LineString::new(vec![line.start, line.end])).map(Geometry::LineString)
        }
        Geometry::LineString(line) => clean_line_string(line).map(Geometry::LineString),
        Geometry::Polygon(polygon) => clean_polygon(polygon).map(areal),
        Geometry::Rect(rect) => clean_polygon(rect.to_polygon()).map(areal),
        Geometry::Triangle(triangle) => clean_polygon(triangle.to_polygon()).map(areal),
        Geometry::MultiPoint(points) => {
            let points: Vec<Point<f64>> =
                points.0.into_iter().filter(|point| is_finite(point.0)).collect();
            (!points.is_empty()).then(|| Geometry::MultiPoint(MultiPoint::new(points)))
        }
        Geometry::MultiLineString(lines) => {
            let lines: Vec<LineString<f64>> =
                lines.0.into_iter().filter_map(clean_line_string).collect();
            (!lines.is_empty()).then(|| Geometry::MultiLineString(MultiLineString::new(lines)))
        }
        Geometry::MultiPolygon(polygons) => {
            let polygons: Vec<Polygon<f64>> = polygons
                .0
                .into_iter()
                .filter_map(clean_polygon)
                .flat_map(|cleaned| cleaned.0)
                .collect();
            (!polygons.is_empty()).then(|| areal(MultiPolygon::new(polygons)))
        }
        Geometry::GeometryCollection(collection) => {
            let parts: Vec<Geometry<f64>> = collection.0.into_iter().filter_map(clean).collect();
            match parts.len() {
                0 => None,
                _ => Some(Geometry::GeometryCollection(GeometryCollection::new_from(parts))),
            }
        }
    }
}

fn areal(mut polygons: MultiPolygon<f64>) -> Geometry<f64> {
    if polygons.0.len() == 1 {
        if let Some(polygon) = polygons.0.pop() {
            return Geometry::Polygon(polygon);
        }
    }
    Geometry::MultiPolygon(polygons)
}

fn is_finite(coord: Coord<f64>) -> bool {
    coord.x.is_finite() && coord.y.is_finite()
}

fn dedup(coords: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    let mut result: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for coord in coords {
        if !is_finite(coord) {
            continue;
        }
        if result.last() != Some(&coord) {
            result.push(coord);
        }
    }
    result
}

fn clean_line_string(line: LineString<f64>) -> Option<LineString<f64>> {
    let coords = dedup(line.0);
    (coords.len() >= 2).then(|| LineString::new(coords))
}

/// 去重并闭合环；不足 4 个坐标时丢弃。
fn close_ring(ring: LineString<f64>) -> Option<LineString<f64>> {
    let mut coords = dedup(ring.0);
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    (coords.len() >= 4).then(|| LineString::new(coords))
}

fn has_area(ring: &LineString<f64>) -> bool {
    Polygon::new(ring.clone(), Vec::new()).unsigned_area() > f64::EPSILON
}

fn clean_polygon(polygon: Polygon<f64>) -> Option<MultiPolygon<f64>> {
    let (exterior, interiors) = polygon.into_inner();
    let exterior = close_ring(exterior)?;
    let interiors: Vec<LineString<f64>> = interiors.into_iter().filter_map(close_ring).collect();
    if ring_self_intersects(&exterior) || interiors.iter().any(ring_self_intersects) {
        // 自相交的面以布尔并集重建为合法面
        let repaired = MultiPolygon::new(Vec::new())
            .union(&MultiPolygon::new(vec![Polygon::new(exterior, interiors)]));
        return (!repaired.0.is_empty()).then_some(repaired);
    }
    if !has_area(&exterior) {
        return None;
    }
    let interiors = interiors.into_iter().filter(has_area).collect();
    Some(MultiPolygon::new(vec![Polygon::new(exterior, interiors)]))
}

/// 环内不相邻的边是否相交。按 X 区间排序后只比较可能重叠的边。
pub fn ring_self_intersects(ring: &LineString<f64>) -> bool {
    let segments: Vec<Line<f64>> = ring.lines().collect();
    let count = segments.len();
    if count < 4 {
        return false;
    }
    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by(|a, b| min_x(&segments[*a]).total_cmp(&min_x(&segments[*b])));
    for (position, &first) in order.iter().enumerate() {
        let reach = max_x(&segments[first]);
        for &second in &order[position + 1..] {
            if min_x(&segments[second]) > reach {
                break;
            }
            let gap = first.abs_diff(second);
            if gap <= 1 || gap == count - 1 {
                continue;
            }
            if segments[first].intersects(&segments[second]) {
                return true;
            }
        }
    }
    false
}

fn min_x(line: &Line<f64>) -> f64 {
    line.start.x.min(line.end.x)
}

fn max_x(line: &Line<f64>) -> f64 {
    line.start.x.max(line.end.x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, line_string, polygon};

    #[test]
    fn repeated_points_are_removed_without_adding_vertices() {
        let polygon = polygon![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 4.0),
            (x: 0.0, y: 4.0),
        ];
        match clean(Geometry::Polygon(polygon)) {
            Some(Geometry::Polygon(cleaned)) => assert_eq!(cleaned.exterior().0.len(), 5),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn zero_area_ring_is_dropped() {
        let flat = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 2.0, y: 0.0)];
        assert!(clean(Geometry::Polygon(flat)).is_none());
        let point_like = line_string![(x: 1.0, y: 1.0), (x: 1.0, y: 1.0)];
        assert!(clean(Geometry::LineString(point_like)).is_none());
    }

    #[test]
    fn bow_tie_is_repaired_into_valid_parts() {
        let bow_tie = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
        ];
        assert!(ring_self_intersects(bow_tie.exterior()));
        let repaired = clean(Geometry::Polygon(bow_tie)).expect("repaired geometry");
        let area = match &repaired {
            Geometry::Polygon(polygon) => polygon.unsigned_area(),
            Geometry::MultiPolygon(polygons) => polygons.unsigned_area(),
            other => panic!("unexpected geometry: {other:?}"),
        };
        assert!((area - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_parts_of_collections_are_dropped() {
        let collection = GeometryCollection::new_from(vec![
            Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 0.0, y: 0.0)]),
            Geometry::Point(Point::from(coord! { x: 1.0, y: 2.0 })),
        ]);
        match clean(Geometry::GeometryCollection(collection)) {
            Some(Geometry::GeometryCollection(cleaned)) => assert_eq!(cleaned.0.len(), 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn square_ring_does_not_self_intersect() {
        let square = line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        assert!(!ring_self_intersects(&square));
    }
}
