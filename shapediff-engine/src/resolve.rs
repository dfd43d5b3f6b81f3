//! 实体到平面几何的解析：按固定顺序匹配规则，块参照深度优先展开，转换失败时逐级回退。

use std::rc::Rc;

use geo::{
    Area, Contains, CoordsIter, Geometry, LineString, MultiLineString, MultiPolygon, Point,
    Polygon,
};
use glam::{DAffine2, DVec2};
use shapediff_core::document::{
    BlockDefinition, Document, Ellipse, Entity, EntityData, EntityKind, HatchEdge, HatchLoop,
    PolylineFlavor, Spline,
};
use tracing::{debug, error, warn};

use crate::errors::EngineError;
use crate::flatten::{
    arc_points, circle_points, ellipse_points, is_full_turn, polyline_points, round_to,
    spline_points,
};
use crate::shape::{self, line_string};

/// 各回退层级的开关。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackToggles {
    pub radius: bool,
    pub flattening: bool,
    pub vertices: bool,
}

impl Default for FallbackToggles {
    fn default() -> Self {
        Self {
            radius: true,
            flattening: true,
            vertices: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// 曲线展开的最大弦高。
    pub step_size: f64,
    /// 坐标保留的小数位数。
    pub precision: u32,
    pub transform: Option<DAffine2>,
    /// 为真时通用转换与回退结果套用 `transform`。
    pub apply_transform: bool,
    /// 半径低于此值时回退展开改用 `degenerate_step`。
    pub degenerate_radius: f64,
    pub degenerate_step: f64,
    pub fallbacks: FallbackToggles,
    /// 块嵌套展开的最大深度。
    pub max_block_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            step_size: 0.1,
            precision: 10,
            transform: None,
            apply_transform: false,
            degenerate_radius: 0.1,
            degenerate_step: 1e-6,
            fallbacks: FallbackToggles::default(),
            max_block_depth: 64,
        }
    }
}

impl ResolveOptions {
    /// 实际生效的地理配准变换。
    pub fn active_transform(&self) -> Option<&DAffine2> {
        if self.apply_transform {
            self.transform.as_ref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackCase {
    Radius,
    Flattening,
    Vertices,
}

impl FallbackCase {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackCase::Radius => "radius",
            FallbackCase::Flattening => "flattening",
            FallbackCase::Vertices => "vertices",
        }
    }
}

/// 几何的来源。
#[derive(Debug, Clone)]
pub enum Origin {
    Entity(Entity),
    /// 块参照的插入点。
    BlockInsertion {
        block: Rc<BlockDefinition>,
        insertion: Entity,
    },
    /// 由回退层级恢复的几何。
    FailCase { entity: Entity, case: FallbackCase },
}

impl Origin {
    pub fn entity(&self) -> &Entity {
        match self {
            Origin::Entity(entity) => entity,
            Origin::BlockInsertion { insertion, .. } => insertion,
            Origin::FailCase { entity, .. } => entity,
        }
    }

    pub fn fail_case(&self) -> Option<FallbackCase> {
        match self {
            Origin::FailCase { case, .. } => Some(*case),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub geometry: Geometry<f64>,
    pub origin: Origin,
}

impl Resolved {
    fn new(geometry: Geometry<f64>, origin: Origin) -> Self {
        Self { geometry, origin }
    }
}

/// 分派规则，按 [`DISPATCH_ORDER`] 依次匹配，首个命中者生效。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    BlockReference,
    TextAnchor,
    Dimension,
    ClosedOutline,
    PolyfaceMesh,
    RasterBoundary,
    ViewportExtent,
    Generic,
    Fallback,
}

pub const DISPATCH_ORDER: [Rule; 9] = [
    Rule::BlockReference,
    Rule::TextAnchor,
    Rule::Dimension,
    Rule::ClosedOutline,
    Rule::PolyfaceMesh,
    Rule::RasterBoundary,
    Rule::ViewportExtent,
    Rule::Generic,
    Rule::Fallback,
];

impl Rule {
    pub fn applies(self, entity: &Entity) -> bool {
        let kind = entity.kind();
        match self {
            Rule::BlockReference => kind == EntityKind::BlockReference,
            Rule::TextAnchor => kind == EntityKind::Text,
            Rule::Dimension => kind == EntityKind::Dimension,
            Rule::ClosedOutline => matches!(
                &entity.data,
                EntityData::Polyline(polyline)
                    if polyline.is_closed && polyline.flavor == PolylineFlavor::Lightweight
            ),
            Rule::PolyfaceMesh => kind == EntityKind::PolyfaceMesh,
            Rule::RasterBoundary => kind == EntityKind::Image,
            Rule::ViewportExtent => kind == EntityKind::Viewport,
            Rule::Generic => matches!(kind, EntityKind::Graphic | EntityKind::Polyline),
            Rule::Fallback => true,
        }
    }

    /// 实体命中的第一条规则。
    pub fn select(entity: &Entity) -> Rule {
        DISPATCH_ORDER
            .into_iter()
            .find(|rule| rule.applies(entity))
            .unwrap_or(Rule::Fallback)
    }
}

/// 解析器：持有文档引用与显式参数，无全局状态。
pub struct Resolver<'d> {
    document: &'d Document,
    options: ResolveOptions,
}

impl<'d> Resolver<'d> {
    pub fn new(document: &'d Document, options: ResolveOptions) -> Self {
        Self { document, options }
    }

    pub fn document(&self) -> &'d Document {
        self.document
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// 惰性解析单个实体；每次调用都从头开始。
    pub fn resolve(&self, entity: &Entity) -> Resolution<'_, 'd> {
        Resolution {
            resolver: self,
            stack: vec![Frame {
                entities: vec![entity.clone()].into_iter(),
                depth: 0,
                chain: Vec::new(),
            }],
        }
    }

    /// 依次解析多个实体。
    pub fn resolve_all<'a, I>(&'a self, entities: I) -> impl Iterator<Item = Resolved> + 'a
    where
        I: IntoIterator<Item = &'a Entity>,
        I::IntoIter: 'a,
    {
        entities.into_iter().flat_map(move |entity| self.resolve(entity))
    }

    /// 解析模型空间的全部实体。
    pub fn modelspace(&self) -> impl Iterator<Item = Resolved> + '_ {
        self.resolve_all(self.document.modelspace())
    }

    fn round_point(&self, point: DVec2) -> Point<f64> {
        Point::new(
            round_to(point.x, self.options.precision),
            round_to(point.y, self.options.precision),
        )
    }

    fn placed(&self, points: Vec<DVec2>, transform: Option<&DAffine2>) -> Vec<DVec2> {
        match transform {
            Some(m) => points.into_iter().map(|p| m.transform_point2(p)).collect(),
            None => points,
        }
    }

    /// 通用转换：曲线按步长展开。曲率半径不大于步长时视为失败，交给回退处理。
    pub fn convert(&self, entity: &Entity) -> Result<Geometry<f64>, EngineError> {
        let step = self.options.step_size;
        let transform = self.options.active_transform();
        let fail = |reason: String| EngineError::Conversion {
            handle: entity.handle().unwrap_or("-").to_string(),
            reason,
        };
        let check_radius = |radius: f64| {
            if radius.is_nan() || radius <= 0.0 {
                Err(fail(format!("半径无效: {radius}")))
            } else if step >= radius {
                Err(fail(format!("步长 {step} 不小于半径 {radius}")))
            } else {
                Ok(())
            }
        };

        let geometry = match &entity.data {
            EntityData::Point(point) => {
                let location = point.location.as_vec2();
                let placed = transform.map_or(location, |m| m.transform_point2(location));
                Geometry::Point(self.round_point(placed))
            }
            EntityData::Line(line) => Geometry::LineString(self.line(
                vec![line.start.as_vec2(), line.end.as_vec2()],
                transform,
            )),
            EntityData::Circle(circle) => {
                check_radius(circle.radius)?;
                let ring = circle_points(circle.center.as_vec2(), circle.radius, step);
                Geometry::Polygon(Polygon::new(self.line(ring, transform), Vec::new()))
            }
            EntityData::Arc(arc) => {
                check_radius(arc.radius)?;
                let points = arc_points(
                    arc.center.as_vec2(),
                    arc.radius,
                    arc.start_angle,
                    arc.end_angle,
                    step,
                );
                Geometry::LineString(self.line(points, transform))
            }
            EntityData::Ellipse(ellipse) => {
                check_radius(ellipse.major_axis.length())?;
                let points = self.line(ellipse_points(ellipse, step), transform);
                if is_full_turn(ellipse.start_parameter, ellipse.end_parameter) {
                    Geometry::Polygon(Polygon::new(points, Vec::new()))
                } else {
                    Geometry::LineString(points)
                }
            }
            EntityData::Polyline(polyline) => {
                let points = self.line(
                    polyline_points(&polyline.vertices, polyline.is_closed, step),
                    transform,
                );
                if polyline.is_closed {
                    Geometry::Polygon(Polygon::new(points, Vec::new()))
                } else {
                    Geometry::LineString(points)
                }
            }
            EntityData::Spline(spline) => {
                let points = self.line(spline_points(spline, step).map_err(&fail)?, transform);
                if spline.is_closed {
                    Geometry::Polygon(Polygon::new(points, Vec::new()))
                } else {
                    Geometry::LineString(points)
                }
            }
            EntityData::Hatch(hatch) => {
                let mut rings: Vec<LineString<f64>> = Vec::new();
                for path in &hatch.loops {
                    let ring = hatch_loop_points(path, step).map_err(&fail)?;
                    if ring.len() >= 3 {
                        rings.push(self.line(ring, transform));
                    }
                }
                nest_rings(rings).ok_or_else(|| fail("填充没有有效边界".to_string()))?
            }
            EntityData::Leader(leader) => Geometry::LineString(self.line(
                leader.vertices.iter().map(|p| p.as_vec2()).collect(),
                transform,
            )),
            EntityData::Face3D(face) => Geometry::Polygon(Polygon::new(
                self.line(
                    face.vertices.iter().map(|v| v.to_2d().as_vec2()).collect(),
                    transform,
                ),
                Vec::new(),
            )),
            EntityData::Solid(solid) => Geometry::Polygon(Polygon::new(
                self.line(
                    solid.outline().iter().map(|p| p.as_vec2()).collect(),
                    transform,
                ),
                Vec::new(),
            )),
            _ => {
                return Err(EngineError::UnsupportedEntityKind(
                    entity.dxf_type().to_string(),
                ));
            }
        };

        if geometry.coords_count() == 0 {
            return Err(fail("转换结果没有坐标".to_string()));
        }
        if geometry
            .coords_iter()
            .any(|coord| !coord.x.is_finite() || !coord.y.is_finite())
        {
            return Err(fail("转换结果含非有限坐标".to_string()));
        }
        Ok(geometry)
    }

    fn line(&self, points: Vec<DVec2>, transform: Option<&DAffine2>) -> LineString<f64> {
        line_string(&self.placed(points, transform), self.options.precision)
    }

    /// 回退层级：半径展开、默认步长展开、原始顶点，依次尝试。
    fn fallback(&self, entity: Entity) -> Option<Resolved> {
        let toggles = self.options.fallbacks;
        let transform = self.options.active_transform();
        let handle = entity.handle().unwrap_or("-").to_string();

        if toggles.radius {
            if let Some(radius) = entity.radius().filter(|radius| *radius > 0.0) {
                let step = if radius < self.options.degenerate_radius {
                    self.options.degenerate_step
                } else {
                    self.options.step_size.min(radius * 0.5)
                };
                let points = match &entity.data {
                    EntityData::Circle(circle) => {
                        Some(circle_points(circle.center.as_vec2(), radius, step))
                    }
                    EntityData::Arc(arc) => Some(arc_points(
                        arc.center.as_vec2(),
                        radius,
                        arc.start_angle,
                        arc.end_angle,
                        step,
                    )),
                    _ => None,
                };
                if let Some(line) = points.and_then(|points| self.usable_line(points, transform)) {
                    debug!(handle = %handle, radius, step, "半径回退成功");
                    return Some(self.fail_case(line, entity, FallbackCase::Radius));
                }
            }
        }

        if toggles.flattening {
            match self.flatten(&entity) {
                Some(Ok(points)) => {
                    if let Some(line) = self.usable_line(points, transform) {
                        debug!(handle = %handle, "展开回退成功");
                        return Some(self.fail_case(line, entity, FallbackCase::Flattening));
                    }
                }
                Some(Err(reason)) => debug!(handle = %handle, reason = %reason, "展开回退失败"),
                None => {}
            }
        }

        if toggles.vertices {
            if let Some(vertices) = entity.raw_vertices() {
                let points = vertices.iter().map(|p| p.as_vec2()).collect();
                if let Some(line) = self.usable_line(points, transform) {
                    debug!(handle = %handle, "顶点回退成功");
                    return Some(self.fail_case(line, entity, FallbackCase::Vertices));
                }
            }
        }

        error!(handle = %handle, kind = entity.dxf_type(), "所有回退层级均失败，实体被跳过");
        None
    }

    fn fail_case(&self, line: LineString<f64>, entity: Entity, case: FallbackCase) -> Resolved {
        Resolved::new(
            Geometry::LineString(line),
            Origin::FailCase { entity, case },
        )
    }

    /// 回退结果至少包含两个不同的有限坐标。
    fn usable_line(&self, points: Vec<DVec2>, transform: Option<&DAffine2>) -> Option<LineString<f64>> {
        let line = self.line(points, transform);
        let finite = line.0.iter().all(|c| c.x.is_finite() && c.y.is_finite());
        let distinct = line.0.windows(2).any(|pair| pair[0] != pair[1]);
        (finite && distinct).then_some(line)
    }

    /// 默认步长展开；不支持展开的实体返回 `None`。
    fn flatten(&self, entity: &Entity) -> Option<Result<Vec<DVec2>, String>> {
        let step = self.options.step_size;
        let points = match &entity.data {
            EntityData::Circle(circle) => circle_points(circle.center.as_vec2(), circle.radius, step),
            EntityData::Arc(arc) => arc_points(
                arc.center.as_vec2(),
                arc.radius,
                arc.start_angle,
                arc.end_angle,
                step,
            ),
            EntityData::Ellipse(ellipse) => ellipse_points(ellipse, step),
            EntityData::Polyline(polyline) => {
                polyline_points(&polyline.vertices, polyline.is_closed, step)
            }
            EntityData::Spline(spline) => return Some(spline_points(spline, step)),
            EntityData::Leader(leader) => leader.vertices.iter().map(|p| p.as_vec2()).collect(),
            EntityData::Line(line) => vec![line.start.as_vec2(), line.end.as_vec2()],
            _ => return None,
        };
        Some(Ok(points))
    }

    fn closed_outline(&self, entity: Entity) -> Option<Resolved> {
        let EntityData::Polyline(polyline) = &entity.data else {
            return None;
        };
        let ring = line_string(
            &polyline
                .vertices
                .iter()
                .map(|vertex| vertex.position.as_vec2())
                .collect::<Vec<_>>(),
            self.options.precision,
        );
        match shape::clean(Geometry::Polygon(Polygon::new(ring, Vec::new()))) {
            Some(geometry) => Some(Resolved::new(geometry, Origin::Entity(entity))),
            None => {
                debug!(handle = ?entity.handle(), "闭合多段线清理后为空");
                None
            }
        }
    }

    fn polyface(&self, entity: Entity) -> Option<Resolved> {
        let EntityData::PolyfaceMesh(mesh) = &entity.data else {
            return None;
        };
        let faces: Vec<LineString<f64>> = mesh
            .face_vertices()
            .into_iter()
            .map(|face| {
                let mut points: Vec<DVec2> = face.iter().map(|v| v.to_2d().as_vec2()).collect();
                if let Some(first) = points.first().copied() {
                    points.push(first);
                }
                line_string(&points, self.options.precision)
            })
            .collect();
        match shape::clean(Geometry::MultiLineString(MultiLineString::new(faces))) {
            Some(geometry) => Some(Resolved::new(geometry, Origin::Entity(entity))),
            None => {
                debug!(handle = ?entity.handle(), "多面网格没有有效的面");
                None
            }
        }
    }

    fn raster_boundary(&self, entity: Entity) -> Option<Resolved> {
        let frame = match &entity.data {
            EntityData::Image(frame) | EntityData::Wipeout(frame) => frame,
            _ => return None,
        };
        let mut points: Vec<DVec2> = frame.boundary().iter().map(|p| p.as_vec2()).collect();
        if let Some(first) = points.first().copied() {
            points.push(first);
        }
        let boundary = line_string(&points, self.options.precision);
        Some(Resolved::new(
            Geometry::LineString(boundary),
            Origin::Entity(entity),
        ))
    }

    fn viewport_extent(&self, entity: Entity) -> Option<Resolved> {
        let EntityData::Viewport(viewport) = &entity.data else {
            return None;
        };
        let Some(bounds) = viewport.modelspace_bounds() else {
            debug!(handle = ?entity.handle(), "视口没有有效的模型空间范围");
            return None;
        };
        let corners: Vec<DVec2> = bounds.corners().iter().map(|p| p.as_vec2()).collect();
        let ring = line_string(&corners, self.options.precision);
        Some(Resolved::new(
            Geometry::Polygon(Polygon::new(ring, Vec::new())),
            Origin::Entity(entity),
        ))
    }
}

/// 一层展开中的实体队列。
struct Frame {
    entities: std::vec::IntoIter<Entity>,
    depth: usize,
    /// 已展开的块名链，用于识别循环引用。
    chain: Vec<String>,
}

/// [`Resolver::resolve`] 返回的惰性序列。
pub struct Resolution<'r, 'd> {
    resolver: &'r Resolver<'d>,
    stack: Vec<Frame>,
}

impl Resolution<'_, '_> {
    fn dispatch(&mut self, entity: Entity, depth: usize) -> Option<Resolved> {
        let resolver = self.resolver;
        match Rule::select(&entity) {
            Rule::BlockReference => self.block_reference(entity, depth),
            Rule::TextAnchor => {
                let anchor = match &entity.data {
                    EntityData::Text(text) => text.insert,
                    EntityData::MText(text) => text.insert,
                    _ => return None,
                };
                Some(Resolved::new(
                    Geometry::Point(resolver.round_point(anchor.as_vec2())),
                    Origin::Entity(entity),
                ))
            }
            Rule::Dimension => {
                self.dimension(&entity, depth);
                None
            }
            Rule::ClosedOutline => resolver.closed_outline(entity),
            Rule::PolyfaceMesh => resolver.polyface(entity),
            Rule::RasterBoundary => resolver.raster_boundary(entity),
            Rule::ViewportExtent => resolver.viewport_extent(entity),
            Rule::Generic => match resolver.convert(&entity) {
                Ok(geometry) => Some(Resolved::new(geometry, Origin::Entity(entity))),
                Err(err) => {
                    debug!(handle = ?entity.handle(), error = %err, "通用转换失败，进入回退");
                    resolver.fallback(entity)
                }
            },
            Rule::Fallback => {
                if entity.kind() == EntityKind::Unsupported {
                    let err = EngineError::UnsupportedEntityKind(entity.dxf_type().to_string());
                    warn!(handle = ?entity.handle(), error = %err, "跳过不支持的实体");
                    return None;
                }
                resolver.fallback(entity)
            }
        }
    }

    fn block_reference(&mut self, entity: Entity, depth: usize) -> Option<Resolved> {
        let resolver = self.resolver;
        let EntityData::BlockReference(reference) = &entity.data else {
            return None;
        };
        let anchor = Geometry::Point(resolver.round_point(reference.insert.as_vec2()));
        let Some(block) = resolver.document.block(&reference.name) else {
            warn!(handle = ?entity.handle(), block = %reference.name, "块定义不存在，仅输出插入点");
            return Some(Resolved::new(anchor, Origin::Entity(entity)));
        };
        if self.may_expand(&block.name, depth, entity.handle()) {
            let children = resolver.document.virtual_entities(&entity);
            self.push_frame(children, depth, &block.name);
        }
        Some(Resolved::new(
            anchor,
            Origin::BlockInsertion {
                block,
                insertion: entity,
            },
        ))
    }

    fn dimension(&mut self, entity: &Entity, depth: usize) {
        let EntityData::Dimension(dimension) = &entity.data else {
            return;
        };
        let Some(name) = dimension.block_name.as_deref() else {
            debug!(handle = ?entity.handle(), "标注没有关联的匿名块");
            return;
        };
        if self.resolver.document.block(name).is_none() {
            warn!(handle = ?entity.handle(), block = name, "标注块不存在");
            return;
        }
        if self.may_expand(name, depth, entity.handle()) {
            let children = self.resolver.document.virtual_entities(entity);
            self.push_frame(children, depth, name);
        }
    }

    fn may_expand(&self, name: &str, depth: usize, handle: Option<&str>) -> bool {
        let in_chain = self
            .stack
            .last()
            .is_some_and(|frame| frame.chain.iter().any(|entry| entry == name));
        if in_chain {
            warn!(handle = ?handle, block = name, "块循环引用，停止展开");
            return false;
        }
        if depth >= self.resolver.options.max_block_depth {
            warn!(handle = ?handle, block = name, depth, "块嵌套过深，停止展开");
            return false;
        }
        true
    }

    fn push_frame(&mut self, children: Vec<Entity>, depth: usize, name: &str) {
        let mut chain = self
            .stack
            .last()
            .map(|frame| frame.chain.clone())
            .unwrap_or_default();
        chain.push(name.to_string());
        self.stack.push(Frame {
            entities: children.into_iter(),
            depth: depth + 1,
            chain,
        });
    }
}

impl Iterator for Resolution<'_, '_> {
    type Item = Resolved;

    fn next(&mut self) -> Option<Resolved> {
        loop {
            let frame = self.stack.last_mut()?;
            let depth = frame.depth;
            match frame.entities.next() {
                Some(entity) => {
                    if let Some(resolved) = self.dispatch(entity, depth) {
                        return Some(resolved);
                    }
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// 填充边界的一个环；弧段按方向展开。
fn hatch_loop_points(path: &HatchLoop, step: f64) -> Result<Vec<DVec2>, String> {
    let mut points: Vec<DVec2> = Vec::new();
    for edge in &path.edges {
        let segment = match edge {
            HatchEdge::Line { start, end } => vec![start.as_vec2(), end.as_vec2()],
            HatchEdge::Arc {
                center,
                radius,
                start_angle,
                end_angle,
                is_counter_clockwise,
            } => {
                if *is_counter_clockwise {
                    arc_points(center.as_vec2(), *radius, *start_angle, *end_angle, step)
                } else {
                    // 顺时针弧的角度按镜像方向记录
                    let mut points =
                        arc_points(center.as_vec2(), *radius, -*end_angle, -*start_angle, step);
                    points.reverse();
                    points
                }
            }
            HatchEdge::Ellipse {
                center,
                major_axis,
                ratio,
                start_angle,
                end_angle,
                is_counter_clockwise,
            } => {
                let (start, end) = if *is_counter_clockwise {
                    (*start_angle, *end_angle)
                } else {
                    (-*end_angle, -*start_angle)
                };
                let ellipse = Ellipse {
                    center: *center,
                    major_axis: *major_axis,
                    ratio: *ratio,
                    start_parameter: start,
                    end_parameter: end,
                };
                let mut points = ellipse_points(&ellipse, step);
                if !*is_counter_clockwise {
                    points.reverse();
                }
                points
            }
            HatchEdge::Spline {
                degree,
                control_points,
                knot_values,
            } => spline_points(
                &Spline {
                    degree: *degree,
                    is_closed: false,
                    control_points: control_points.clone(),
                    fit_points: Vec::new(),
                    knot_values: knot_values.clone(),
                    weights: Vec::new(),
                },
                step,
            )?,
            HatchEdge::Polyline {
                vertices,
                is_closed,
            } => polyline_points(vertices, *is_closed, step),
        };
        let skip = usize::from(points.last() == segment.first() && segment.first().is_some());
        points.extend(segment.into_iter().skip(skip));
    }
    if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied()) {
        if first != last {
            points.push(first);
        }
    }
    Ok(points)
}

/// 按包含关系嵌套边界环：偶数层为外边界，奇数层为直接外层的洞。互不包含的环各自成面。
fn nest_rings(rings: Vec<LineString<f64>>) -> Option<Geometry<f64>> {
    let mut rings: Vec<(f64, LineString<f64>)> = rings
        .into_iter()
        .map(|ring| (Polygon::new(ring.clone(), Vec::new()).unsigned_area(), ring))
        .filter(|(area, _)| *area > 0.0)
        .collect();
    rings.sort_by(|a, b| b.0.total_cmp(&a.0));

    // 面积降序，向前查找的第一个包含者即为直接外层
    let mut parent: Vec<Option<usize>> = vec![None; rings.len()];
    let mut depth = vec![0usize; rings.len()];
    for index in 0..rings.len() {
        for candidate in (0..index).rev() {
            let shell = Polygon::new(rings[candidate].1.clone(), Vec::new());
            if shell.contains(&rings[index].1) {
                parent[index] = Some(candidate);
                depth[index] = depth[candidate] + 1;
                break;
            }
        }
    }

    let mut slots: Vec<Option<usize>> = vec![None; rings.len()];
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for (index, (_, ring)) in rings.into_iter().enumerate() {
        if depth[index] % 2 == 0 {
            slots[index] = Some(polygons.len());
            polygons.push((ring, Vec::new()));
        } else if let Some(slot) = parent[index].and_then(|p| slots[p]) {
            polygons[slot].1.push(ring);
        }
    }

    let mut polygons: Vec<Polygon<f64>> = polygons
        .into_iter()
        .map(|(exterior, interiors)| Polygon::new(exterior, interiors))
        .collect();
    match polygons.len() {
        0 => None,
        1 => polygons.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(polygons))),
    }
}
