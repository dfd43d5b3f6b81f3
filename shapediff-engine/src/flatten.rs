//! 曲线离散化：按最大弦高把圆弧、椭圆、凸度段与样条展开为折线点列。

use std::f64::consts::{PI, TAU};

use glam::{DVec2, DVec3};
use shapediff_core::document::{Ellipse, PolylineVertex, Spline};

/// 单条曲线的分段上限。
pub const MAX_SEGMENTS: usize = 65_536;

const ANGLE_EPSILON: f64 = 1e-12;

/// 半径为 `radius`、跨度为 `span` 的圆弧在给定弦高下需要的分段数。
///
/// 分段角 α = 2·acos((r − s)/r)；弦高不小于半径时退化为每段半圆。
pub fn segment_count(radius: f64, span: f64, sagitta: f64) -> usize {
    let span = span.abs();
    if !radius.is_finite() || radius <= 0.0 || !span.is_finite() || span <= ANGLE_EPSILON {
        return 1;
    }
    let sagitta = if sagitta.is_finite() && sagitta > 0.0 {
        sagitta
    } else {
        return MAX_SEGMENTS;
    };
    let alpha = if sagitta >= radius {
        PI
    } else {
        2.0 * ((radius - sagitta) / radius).clamp(-1.0, 1.0).acos()
    };
    if alpha <= 0.0 {
        return MAX_SEGMENTS;
    }
    ((span / alpha).ceil() as usize).clamp(1, MAX_SEGMENTS)
}

/// 逆时针圆弧的点列，含两端点。
pub fn arc_points(center: DVec2, radius: f64, start: f64, end: f64, sagitta: f64) -> Vec<DVec2> {
    let sweep = ccw_sweep(start, end);
    sweep_points(center, radius, start, sweep, sagitta)
}

/// 整圆的闭合点列（首尾相同）。
pub fn circle_points(center: DVec2, radius: f64, sagitta: f64) -> Vec<DVec2> {
    let segments = segment_count(radius, TAU, sagitta).max(3);
    let mut points: Vec<DVec2> = (0..segments)
        .map(|i| center + DVec2::from_angle(TAU * i as f64 / segments as f64) * radius)
        .collect();
    if let Some(first) = points.first().copied() {
        points.push(first);
    }
    points
}

fn sweep_points(center: DVec2, radius: f64, start: f64, sweep: f64, sagitta: f64) -> Vec<DVec2> {
    let segments = segment_count(radius, sweep, sagitta);
    (0..=segments)
        .map(|i| {
            let angle = start + sweep * i as f64 / segments as f64;
            center + DVec2::from_angle(angle) * radius
        })
        .collect()
}

fn ccw_sweep(start: f64, end: f64) -> f64 {
    let sweep = (end - start).rem_euclid(TAU);
    if sweep <= ANGLE_EPSILON { TAU } else { sweep }
}

/// 参数范围是否覆盖整周。
pub fn is_full_turn(start: f64, end: f64) -> bool {
    let span = end - start;
    span.abs() >= TAU - 1e-9 || ccw_sweep(start, end) >= TAU - 1e-9
}

/// 椭圆或椭圆弧的点列；分段数按长半轴估算。
pub fn ellipse_points(ellipse: &Ellipse, sagitta: f64) -> Vec<DVec2> {
    let major = ellipse.major_axis.as_vec2();
    let minor = major.perp() * ellipse.ratio;
    let center = ellipse.center.as_vec2();
    let full = is_full_turn(ellipse.start_parameter, ellipse.end_parameter);
    let sweep = if full {
        TAU
    } else {
        ccw_sweep(ellipse.start_parameter, ellipse.end_parameter)
    };
    let segments = segment_count(major.length(), sweep, sagitta).max(if full { 3 } else { 1 });
    let mut points: Vec<DVec2> = (0..=segments)
        .map(|i| {
            let t = ellipse.start_parameter + sweep * i as f64 / segments as f64;
            center + major * t.cos() + minor * t.sin()
        })
        .collect();
    if full {
        // 末点与首点在数值上可能略有偏差，闭合时直接复用首点。
        points.pop();
        if let Some(first) = points.first().copied() {
            points.push(first);
        }
    }
    points
}

/// 凸度段 `start → end` 的点列，含两端点。凸度为正表示逆时针。
pub fn bulge_points(start: DVec2, end: DVec2, bulge: f64, sagitta: f64) -> Vec<DVec2> {
    let chord = end - start;
    let length = chord.length();
    if bulge.abs() <= ANGLE_EPSILON || length <= f64::EPSILON || !bulge.is_finite() {
        return vec![start, end];
    }
    let sweep = 4.0 * bulge.atan();
    let radius = length / (2.0 * (sweep / 2.0).sin().abs());
    let offset = (1.0 - bulge * bulge) / (4.0 * bulge);
    let center = (start + end) * 0.5 + chord.perp() * offset;
    let start_vec = start - center;
    let start_angle = start_vec.y.atan2(start_vec.x);
    let mut points = sweep_points(center, radius, start_angle, sweep, sagitta);
    // 端点取原值，避免三角函数误差累积。
    if let Some(first) = points.first_mut() {
        *first = start;
    }
    if let Some(last) = points.last_mut() {
        *last = end;
    }
    points
}

/// 多段线点列，按顶点凸度展开圆弧段；闭合时首尾相同。
pub fn polyline_points(vertices: &[PolylineVertex], is_closed: bool, sagitta: f64) -> Vec<DVec2> {
    let mut points: Vec<DVec2> = Vec::new();
    let count = vertices.len();
    if count == 0 {
        return points;
    }
    let segments = if is_closed { count } else { count - 1 };
    points.push(vertices[0].position.as_vec2());
    for index in 0..segments {
        let from = &vertices[index];
        let to = &vertices[(index + 1) % count];
        let arc = bulge_points(
            from.position.as_vec2(),
            to.position.as_vec2(),
            from.bulge,
            sagitta,
        );
        points.extend(arc.into_iter().skip(1));
    }
    points
}

/// 样条求值。控制点与节点向量完整时按 de Boor 算法采样，否则退回拟合点折线。
pub fn spline_points(spline: &Spline, sagitta: f64) -> Result<Vec<DVec2>, String> {
    let degree = usize::try_from(spline.degree).unwrap_or(0);
    let count = spline.control_points.len();
    if degree >= 1 && count > degree {
        let knots = if spline.knot_values.len() == count + degree + 1 {
            spline.knot_values.clone()
        } else {
            clamped_uniform_knots(count, degree)
        };
        if knots.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err("样条节点向量不是非递减序列".to_string());
        }
        let weights: Vec<f64> = if spline.weights.len() == count {
            spline.weights.clone()
        } else {
            vec![1.0; count]
        };
        let homogeneous: Vec<DVec3> = spline
            .control_points
            .iter()
            .zip(&weights)
            .map(|(point, weight)| DVec3::new(point.x() * weight, point.y() * weight, *weight))
            .collect();
        let start = knots[degree];
        let end = knots[count];
        if end - start <= f64::EPSILON {
            return Err("样条参数区间为空".to_string());
        }
        let control: Vec<DVec2> = spline.control_points.iter().map(|p| p.as_vec2()).collect();
        let samples = spline_samples(&control, sagitta, count);
        let mut points = Vec::with_capacity(samples + 1);
        for i in 0..=samples {
            let u = start + (end - start) * i as f64 / samples as f64;
            points.push(de_boor(degree, &knots, &homogeneous, u)?);
        }
        return Ok(points);
    }
    if spline.fit_points.len() >= 2 {
        return Ok(spline.fit_points.iter().map(|p| p.as_vec2()).collect());
    }
    Err(format!(
        "样条控制点不足（阶数 {}，控制点 {}）",
        spline.degree, count
    ))
}

/// 采样数随控制多边形长度与弦高变化。
fn spline_samples(control: &[DVec2], sagitta: f64, count: usize) -> usize {
    let length: f64 = control.windows(2).map(|pair| pair[0].distance(pair[1])).sum();
    let minimum = count.saturating_mul(8).max(16);
    if sagitta.is_nan() || sagitta <= 0.0 || !length.is_finite() {
        return minimum.min(MAX_SEGMENTS);
    }
    let adaptive = (length / sagitta).sqrt().ceil();
    let adaptive = if adaptive.is_finite() {
        adaptive as usize
    } else {
        MAX_SEGMENTS
    };
    adaptive.max(minimum).min(MAX_SEGMENTS)
}

fn clamped_uniform_knots(count: usize, degree: usize) -> Vec<f64> {
    let spans = count - degree;
    let mut knots = Vec::with_capacity(count + degree + 1);
    knots.extend(std::iter::repeat_n(0.0, degree + 1));
    for i in 1..spans {
        knots.push(i as f64 / spans as f64);
    }
    knots.extend(std::iter::repeat_n(1.0, degree + 1));
    knots
}

fn de_boor(degree: usize, knots: &[f64], points: &[DVec3], u: f64) -> Result<DVec2, String> {
    let count = points.len();
    let mut span = degree;
    while span < count - 1 && knots[span + 1] <= u {
        span += 1;
    }
    let mut d: Vec<DVec3> = (0..=degree).map(|j| points[j + span - degree]).collect();
    for r in 1..=degree {
        for j in (r..=degree).rev() {
            let i = j + span - degree;
            let denominator = knots[i + degree + 1 - r] - knots[i];
            let alpha = if denominator.abs() <= f64::EPSILON {
                0.0
            } else {
                (u - knots[i]) / denominator
            };
            d[j] = d[j - 1] * (1.0 - alpha) + d[j] * alpha;
        }
    }
    let point = d[degree];
    if point.z.abs() <= f64::EPSILON {
        return Err("样条权重为零".to_string());
    }
    Ok(DVec2::new(point.x / point.z, point.y / point.z))
}

/// 按指定小数位取整，恰好位于中点时取偶数；结果不是有限值时保留原值。
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision.min(15) as i32);
    let rounded = (value * factor).round_ties_even() / factor;
    let rounded = if rounded.is_finite() { rounded } else { value };
    if rounded == 0.0 { 0.0 } else { rounded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapediff_core::geometry::{Point2, Vector2};

    #[test]
    fn sagitta_controls_segment_count() {
        // r = 1，s = 1 − cos(π/8) 时分段角正好是 π/4
        let sagitta = 1.0 - (PI / 8.0).cos();
        assert_eq!(segment_count(1.0, TAU, sagitta * 1.000_001), 8);
        assert_eq!(segment_count(1.0, TAU, 5.0), 2);
        assert_eq!(segment_count(0.05, PI, 1e-6), 249);
        assert_eq!(segment_count(1.0, TAU, 0.0), MAX_SEGMENTS);
    }

    #[test]
    fn arc_points_follow_counter_clockwise_span() {
        let points = arc_points(DVec2::ZERO, 2.0, 3.0 * PI / 2.0, 0.0, 0.01);
        let first = points.first().copied().expect("start");
        let last = points.last().copied().expect("end");
        assert!((first - DVec2::new(0.0, -2.0)).length() < 1e-9);
        assert!((last - DVec2::new(2.0, 0.0)).length() < 1e-9);
        assert!(points.iter().all(|p| p.x >= -1e-9 && p.y <= 1e-9));
    }

    #[test]
    fn semicircle_bulge_passes_through_apex() {
        let points = bulge_points(DVec2::new(0.0, 0.0), DVec2::new(2.0, 0.0), 1.0, 0.001);
        assert!(points.len() > 3);
        let lowest = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        // 正凸度从左向右逆时针，弧位于弦的下方
        assert!((lowest + 1.0).abs() < 1e-3);
        assert_eq!(points.last().copied(), Some(DVec2::new(2.0, 0.0)));
    }

    #[test]
    fn closed_polyline_points_return_to_start() {
        let vertices = vec![
            PolylineVertex::new(Point2::new(0.0, 0.0)),
            PolylineVertex::new(Point2::new(1.0, 0.0)),
            PolylineVertex::new(Point2::new(1.0, 1.0)),
        ];
        let points = polyline_points(&vertices, true, 0.1);
        assert_eq!(points.len(), 4);
        assert_eq!(points.first(), points.last());
    }

    #[test]
    fn clamped_spline_interpolates_end_points() {
        let spline = Spline {
            degree: 2,
            is_closed: false,
            control_points: vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 2.0),
                Point2::new(2.0, 0.0),
            ],
            fit_points: Vec::new(),
            knot_values: vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            weights: Vec::new(),
        };
        let points = spline_points(&spline, 0.01).expect("evaluate spline");
        assert!((points[0] - DVec2::new(0.0, 0.0)).length() < 1e-12);
        assert!((points[points.len() - 1] - DVec2::new(2.0, 0.0)).length() < 1e-12);
        let apex = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        assert!((apex - 1.0).abs() < 1e-3);
    }

    #[test]
    fn spline_without_enough_points_fails() {
        let spline = Spline {
            degree: 3,
            is_closed: false,
            control_points: vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)],
            fit_points: Vec::new(),
            knot_values: Vec::new(),
            weights: Vec::new(),
        };
        assert!(spline_points(&spline, 0.1).is_err());
    }

    #[test]
    fn full_ellipse_is_closed() {
        let ellipse = Ellipse {
            center: Point2::new(0.0, 0.0),
            major_axis: Vector2::new(4.0, 0.0),
            ratio: 0.5,
            start_parameter: 0.0,
            end_parameter: TAU,
        };
        let points = ellipse_points(&ellipse, 0.01);
        assert_eq!(points.first(), points.last());
        let top = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        assert!((top - 2.0).abs() < 1e-2);
    }

    #[test]
    fn rounding_normalises_negative_zero() {
        assert_eq!(round_to(-0.000_000_000_01, 10).to_bits(), 0.0f64.to_bits());
        assert!((round_to(1.234_567, 3) - 1.235).abs() < 1e-12);
    }

    #[test]
    fn rounding_ties_go_to_even() {
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
        assert_eq!(round_to(-2.5, 0), -2.0);
        // 0.125 在二进制下精确表示，乘 100 后恰为 12.5
        assert_eq!(round_to(0.125, 2), 0.12);
    }
}
