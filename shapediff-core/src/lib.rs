pub mod geometry {
    use glam::{DAffine2, DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn transform(self, m: &DAffine2) -> Self {
            Self(m.transform_point2(self.0))
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn transform(self, m: &DAffine2) -> Self {
            Self(m.transform_vector2(self.0))
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 三维点；平面化时丢弃 Z。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn to_2d(self) -> Point2 {
            Point2::new(self.0.x, self.0.y)
        }

        /// 仅变换 XY 分量，保留高程。
        #[inline]
        pub fn transform_xy(self, m: &DAffine2) -> Self {
            let xy = m.transform_point2(DVec2::new(self.0.x, self.0.y));
            Self(DVec3::new(xy.x, xy.y, self.0.z))
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        /// 逆时针顺序的四个角点，从最小角开始。
        pub fn corners(&self) -> [Point2; 4] {
            [
                self.min,
                Point2::new(self.max.x(), self.min.y()),
                self.max,
                Point2::new(self.min.x(), self.max.y()),
            ]
        }
    }

    /// 块参照的放置变换：先把块基点移到原点，再缩放、旋转，最后平移到插入点。
    pub fn placement(insert: Point2, rotation: f64, scale: Vector2, base_point: Point2) -> DAffine2 {
        DAffine2::from_translation(insert.0)
            * DAffine2::from_angle(rotation)
            * DAffine2::from_scale(scale.0)
            * DAffine2::from_translation(-base_point.0)
    }

    /// 任意轴算法：拉伸方向 `extrusion` 定义的 OCS 到 WCS 的平面投影。
    ///
    /// 拉伸方向为 +Z 或无效（零向量、非有限值）时返回 `None`。忽略沿拉伸方向的标高。
    pub fn ocs_to_wcs(extrusion: DVec3) -> Option<DAffine2> {
        if !extrusion.is_finite() {
            return None;
        }
        let normal = extrusion.try_normalize()?;
        if (normal - DVec3::Z).length() <= 1e-12 {
            return None;
        }
        let threshold = 1.0 / 64.0;
        let x_axis = if normal.x.abs() < threshold && normal.y.abs() < threshold {
            DVec3::Y.cross(normal)
        } else {
            DVec3::Z.cross(normal)
        }
        .normalize();
        let y_axis = normal.cross(x_axis).normalize();
        Some(DAffine2::from_cols(
            x_axis.truncate(),
            y_axis.truncate(),
            DVec2::ZERO,
        ))
    }

    #[inline]
    pub fn is_mirroring(m: &DAffine2) -> bool {
        m.matrix2.determinant() < 0.0
    }

    /// 变换后 X 轴方向的角度（弧度）。
    #[inline]
    pub fn rotation_of(m: &DAffine2) -> f64 {
        let axis = m.matrix2.x_axis;
        axis.y.atan2(axis.x)
    }

    /// 变换为相似变换（等比缩放、无剪切）时返回缩放系数。
    pub fn uniform_scale(m: &DAffine2) -> Option<f64> {
        let x_axis = m.matrix2.x_axis;
        let y_axis = m.matrix2.y_axis;
        let sx = x_axis.length();
        let sy = y_axis.length();
        let tolerance = 1e-9 * sx.max(sy).max(1.0);
        if (sx - sy).abs() <= tolerance && x_axis.dot(y_axis).abs() <= tolerance {
            Some(sx)
        } else {
            None
        }
    }
}

pub mod raw {
    use serde::{Deserialize, Serialize};

    /// DXF 原始组码与值。值保留文件中的原始文本（仅去掉行尾回车）。
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Tag {
        pub code: i32,
        pub value: String,
    }

    impl Tag {
        #[inline]
        pub fn new(code: i32, value: impl Into<String>) -> Self {
            Self {
                code,
                value: value.into(),
            }
        }
    }

    /// 一条原始记录：以组码 0 的类型标记开头，直到下一个组码 0 为止。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Record {
        tags: Vec<Tag>,
    }

    impl Record {
        pub fn new(tags: Vec<Tag>) -> Self {
            Self { tags }
        }

        #[inline]
        pub fn tags(&self) -> &[Tag] {
            &self.tags
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.tags.len()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.tags.is_empty()
        }

        /// 记录类型，例如 `LINE`、`LAYER`；段首没有类型标记的记录返回空串。
        pub fn kind(&self) -> &str {
            match self.tags.first() {
                Some(tag) if tag.code == 0 => tag.value.trim(),
                _ => "",
            }
        }

        /// 记录句柄。DIMSTYLE 表项的句柄位于组码 105，其余记录位于组码 5。
        pub fn handle(&self) -> Option<&str> {
            let kind = self.kind();
            if kind.is_empty() {
                return None;
            }
            let code = if kind == "DIMSTYLE" { 105 } else { 5 };
            self.tags
                .iter()
                .find(|tag| tag.code == code)
                .map(|tag| tag.value.trim())
        }
    }

    /// `"0"` 与空串表示无句柄，这类记录不参与按句柄的比对。
    #[inline]
    pub fn is_valid_handle(handle: &str) -> bool {
        !handle.is_empty() && handle != "0"
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Section {
        name: String,
        records: Vec<Record>,
    }

    impl Section {
        pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
            Self {
                name: name.into(),
                records,
            }
        }

        #[inline]
        pub fn name(&self) -> &str {
            &self.name
        }

        #[inline]
        pub fn records(&self) -> &[Record] {
            &self.records
        }

        pub fn role(&self) -> Option<SectionRole> {
            SectionRole::from_name(&self.name)
        }
    }

    /// DXF 文件中已知的段。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub enum SectionRole {
        Header,
        Classes,
        Tables,
        Blocks,
        Entities,
        Objects,
        ThumbnailImage,
        AcdsData,
    }

    impl SectionRole {
        pub const ALL: [SectionRole; 8] = [
            SectionRole::Header,
            SectionRole::Classes,
            SectionRole::Tables,
            SectionRole::Blocks,
            SectionRole::Entities,
            SectionRole::Objects,
            SectionRole::ThumbnailImage,
            SectionRole::AcdsData,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                SectionRole::Header => "HEADER",
                SectionRole::Classes => "CLASSES",
                SectionRole::Tables => "TABLES",
                SectionRole::Blocks => "BLOCKS",
                SectionRole::Entities => "ENTITIES",
                SectionRole::Objects => "OBJECTS",
                SectionRole::ThumbnailImage => "THUMBNAILIMAGE",
                SectionRole::AcdsData => "ACDSDATA",
            }
        }

        pub fn from_name(name: &str) -> Option<Self> {
            let name = name.trim();
            Self::ALL
                .into_iter()
                .find(|role| role.as_str().eq_ignore_ascii_case(name))
        }
    }
}

pub mod document {
    use std::collections::HashMap;
    use std::f64::consts::TAU;
    use std::rc::Rc;

    use glam::{DAffine2, DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    use crate::geometry::{
        Bounds2D, Point2, Point3, Vector2, is_mirroring, ocs_to_wcs, placement, rotation_of,
        uniform_scale,
    };
    use crate::raw::{Section, Tag, is_valid_handle};

    /// 分派用的实体类别。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum EntityKind {
        BlockReference,
        Text,
        Dimension,
        Polyline,
        PolyfaceMesh,
        Image,
        Viewport,
        Graphic,
        Unsupported,
    }

    /// 已解码的图元：句柄、图层、原始组码以及按类型区分的数据。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Entity {
        pub handle: Option<String>,
        pub layer: String,
        #[serde(default)]
        pub paper_space: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub tags: Vec<Tag>,
        pub data: EntityData,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum EntityData {
        Point(Point),
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Ellipse(Ellipse),
        Polyline(Polyline),
        PolyfaceMesh(PolyfaceMesh),
        Spline(Spline),
        Text(Text),
        MText(MText),
        BlockReference(BlockReference),
        Dimension(Dimension),
        Hatch(Hatch),
        Leader(Leader),
        Face3D(ThreeDFace),
        Solid(Solid),
        Image(RasterFrame),
        Wipeout(RasterFrame),
        Viewport(Viewport),
        Unsupported { dxf_type: String },
    }

    impl Entity {
        pub fn new(data: EntityData) -> Self {
            Self {
                handle: None,
                layer: "0".to_string(),
                paper_space: false,
                tags: Vec::new(),
                data,
            }
        }

        pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
            self.handle = Some(handle.into());
            self
        }

        pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
            self.layer = layer.into();
            self
        }

        pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
            self.tags = tags;
            self
        }

        /// 有效句柄；`"0"` 视为无句柄。
        pub fn handle(&self) -> Option<&str> {
            self.handle.as_deref().filter(|handle| is_valid_handle(handle))
        }

        pub fn kind(&self) -> EntityKind {
            match &self.data {
                EntityData::BlockReference(_) => EntityKind::BlockReference,
                EntityData::Text(_) | EntityData::MText(_) => EntityKind::Text,
                EntityData::Dimension(_) => EntityKind::Dimension,
                EntityData::Polyline(_) => EntityKind::Polyline,
                EntityData::PolyfaceMesh(_) => EntityKind::PolyfaceMesh,
                EntityData::Image(_) | EntityData::Wipeout(_) => EntityKind::Image,
                EntityData::Viewport(_) => EntityKind::Viewport,
                EntityData::Unsupported { .. } => EntityKind::Unsupported,
                _ => EntityKind::Graphic,
            }
        }

        pub fn dxf_type(&self) -> &str {
            match &self.data {
                EntityData::Point(_) => "POINT",
                EntityData::Line(_) => "LINE",
                EntityData::Circle(_) => "CIRCLE",
                EntityData::Arc(_) => "ARC",
                EntityData::Ellipse(_) => "ELLIPSE",
                EntityData::Polyline(polyline) => match polyline.flavor {
                    PolylineFlavor::Lightweight => "LWPOLYLINE",
                    _ => "POLYLINE",
                },
                EntityData::PolyfaceMesh(_) => "POLYLINE",
                EntityData::Spline(_) => "SPLINE",
                EntityData::Text(_) => "TEXT",
                EntityData::MText(_) => "MTEXT",
                EntityData::BlockReference(_) => "INSERT",
                EntityData::Dimension(_) => "DIMENSION",
                EntityData::Hatch(_) => "HATCH",
                EntityData::Leader(_) => "LEADER",
                EntityData::Face3D(_) => "3DFACE",
                EntityData::Solid(_) => "SOLID",
                EntityData::Image(_) => "IMAGE",
                EntityData::Wipeout(_) => "WIPEOUT",
                EntityData::Viewport(_) => "VIEWPORT",
                EntityData::Unsupported { dxf_type } => dxf_type,
            }
        }

        /// 圆与圆弧暴露半径，供回退展开使用。
        pub fn radius(&self) -> Option<f64> {
            match &self.data {
                EntityData::Circle(circle) => Some(circle.radius),
                EntityData::Arc(arc) => Some(arc.radius),
                _ => None,
            }
        }

        /// 原始顶点序列（不考虑凸度与曲线插值）。
        pub fn raw_vertices(&self) -> Option<Vec<Point2>> {
            let vertices: Vec<Point2> = match &self.data {
                EntityData::Polyline(polyline) => {
                    polyline.vertices.iter().map(|vertex| vertex.position).collect()
                }
                EntityData::PolyfaceMesh(mesh) => {
                    mesh.vertices.iter().map(|vertex| vertex.to_2d()).collect()
                }
                EntityData::Spline(spline) => {
                    if spline.fit_points.is_empty() {
                        spline.control_points.clone()
                    } else {
                        spline.fit_points.clone()
                    }
                }
                EntityData::Leader(leader) => leader.vertices.clone(),
                EntityData::Face3D(face) => face.vertices.iter().map(|v| v.to_2d()).collect(),
                EntityData::Solid(solid) => solid.outline().to_vec(),
                EntityData::Line(line) => vec![line.start, line.end],
                _ => return None,
            };
            if vertices.is_empty() {
                None
            } else {
                Some(vertices)
            }
        }

        /// 返回按仿射变换重新放置后的虚拟实体，不携带句柄。
        ///
        /// 非等比缩放下圆与圆弧转换为椭圆；镜像变换会翻转圆弧方向与凸度符号。
        pub fn transformed(&self, m: &DAffine2) -> Entity {
            let mirror = is_mirroring(m);
            let data = match &self.data {
                EntityData::Point(point) => EntityData::Point(Point {
                    location: point.location.transform(m),
                }),
                EntityData::Line(line) => EntityData::Line(Line {
                    start: line.start.transform(m),
                    end: line.end.transform(m),
                }),
                EntityData::Circle(circle) => match uniform_scale(m) {
                    Some(scale) => EntityData::Circle(Circle {
                        center: circle.center.transform(m),
                        radius: circle.radius * scale,
                    }),
                    None => EntityData::Ellipse(Ellipse::from_circular(
                        circle.center,
                        circle.radius,
                        0.0,
                        TAU,
                    ))
                    .transformed_ellipse(m),
                },
                EntityData::Arc(arc) => match uniform_scale(m) {
                    Some(scale) => {
                        let center = arc.center.transform(m);
                        let start = arc.start_point().transform(m);
                        let end = arc.end_point().transform(m);
                        let start_angle = angle_from(center, start);
                        let end_angle = angle_from(center, end);
                        let (start_angle, end_angle) = if mirror {
                            (end_angle, start_angle)
                        } else {
                            (start_angle, end_angle)
                        };
                        EntityData::Arc(Arc {
                            center,
                            radius: arc.radius * scale,
                            start_angle,
                            end_angle,
                        })
                    }
                    None => EntityData::Ellipse(Ellipse::from_circular(
                        arc.center,
                        arc.radius,
                        arc.start_angle,
                        arc.end_angle,
                    ))
                    .transformed_ellipse(m),
                },
                EntityData::Ellipse(_) => self.data.transformed_ellipse(m),
                EntityData::Polyline(polyline) => EntityData::Polyline(Polyline {
                    vertices: polyline
                        .vertices
                        .iter()
                        .map(|vertex| PolylineVertex {
                            position: vertex.position.transform(m),
                            bulge: if mirror { -vertex.bulge } else { vertex.bulge },
                        })
                        .collect(),
                    is_closed: polyline.is_closed,
                    flavor: polyline.flavor,
                }),
                EntityData::PolyfaceMesh(mesh) => EntityData::PolyfaceMesh(PolyfaceMesh {
                    vertices: mesh.vertices.iter().map(|v| v.transform_xy(m)).collect(),
                    faces: mesh.faces.clone(),
                }),
                EntityData::Spline(spline) => EntityData::Spline(Spline {
                    control_points: spline.control_points.iter().map(|p| p.transform(m)).collect(),
                    fit_points: spline.fit_points.iter().map(|p| p.transform(m)).collect(),
                    ..spline.clone()
                }),
                EntityData::Text(text) => EntityData::Text(Text {
                    insert: text.insert.transform(m),
                    content: text.content.clone(),
                    height: text.height * m.matrix2.y_axis.length(),
                    rotation: placed_rotation(text.rotation, m),
                }),
                EntityData::MText(text) => EntityData::MText(MText {
                    insert: text.insert.transform(m),
                    content: text.content.clone(),
                    height: text.height * m.matrix2.y_axis.length(),
                    rotation: placed_rotation(text.rotation, m),
                }),
                EntityData::BlockReference(reference) => {
                    let x_len = m.matrix2.x_axis.length();
                    let y_len = m.matrix2.y_axis.length();
                    let y_sign = if mirror { -1.0 } else { 1.0 };
                    EntityData::BlockReference(BlockReference {
                        name: reference.name.clone(),
                        insert: reference.insert.transform(m),
                        scale: Vector2::new(
                            reference.scale.x() * x_len,
                            reference.scale.y() * y_len * y_sign,
                        ),
                        z_scale: reference.z_scale,
                        rotation: placed_rotation(reference.rotation, m),
                    })
                }
                EntityData::Dimension(dimension) => EntityData::Dimension(Dimension {
                    block_name: dimension.block_name.clone(),
                    definition_point: dimension.definition_point.transform(m),
                    text_midpoint: dimension.text_midpoint.transform(m),
                    measurement: dimension.measurement,
                    text: dimension.text.clone(),
                    placement: *m * dimension.placement,
                }),
                EntityData::Hatch(hatch) => EntityData::Hatch(Hatch {
                    pattern_name: hatch.pattern_name.clone(),
                    solid_fill: hatch.solid_fill,
                    loops: hatch
                        .loops
                        .iter()
                        .map(|path| HatchLoop {
                            flags: path.flags,
                            edges: path.edges.iter().map(|edge| edge.transformed(m)).collect(),
                        })
                        .collect(),
                }),
                EntityData::Leader(leader) => EntityData::Leader(Leader {
                    vertices: leader.vertices.iter().map(|p| p.transform(m)).collect(),
                }),
                EntityData::Face3D(face) => EntityData::Face3D(ThreeDFace {
                    vertices: face.vertices.map(|v| v.transform_xy(m)),
                }),
                EntityData::Solid(solid) => EntityData::Solid(Solid {
                    vertices: solid.vertices.map(|v| v.transform(m)),
                }),
                EntityData::Image(frame) => EntityData::Image(frame.transformed(m)),
                EntityData::Wipeout(frame) => EntityData::Wipeout(frame.transformed(m)),
                EntityData::Viewport(viewport) => EntityData::Viewport(Viewport {
                    center: viewport.center.transform(m),
                    ..viewport.clone()
                }),
                EntityData::Unsupported { dxf_type } => EntityData::Unsupported {
                    dxf_type: dxf_type.clone(),
                },
            };
            Entity {
                handle: None,
                layer: self.layer.clone(),
                paper_space: self.paper_space,
                tags: self.tags.clone(),
                data,
            }
        }
    }

    impl Entity {
        /// 把以 OCS 记录的平面实体换算到 WCS。
        ///
        /// 圆、圆弧、二维多段线、文字、块参照、填充与二维实体按任意轴算法变换；
        /// 椭圆本身位于 WCS，拉伸方向为 -Z 时参数方向反转。其余实体原样返回。
        pub fn into_wcs(self, extrusion: DVec3) -> Entity {
            let Some(m) = ocs_to_wcs(extrusion) else {
                return self;
            };
            let placed = match &self.data {
                EntityData::Circle(_)
                | EntityData::Arc(_)
                | EntityData::Text(_)
                | EntityData::BlockReference(_)
                | EntityData::Hatch(_)
                | EntityData::Solid(_) => Some(self.transformed(&m).data),
                EntityData::Polyline(polyline) if polyline.flavor != PolylineFlavor::ThreeD => {
                    Some(self.transformed(&m).data)
                }
                EntityData::Ellipse(ellipse) if extrusion.z < 0.0 => {
                    Some(EntityData::Ellipse(Ellipse {
                        start_parameter: -ellipse.end_parameter,
                        end_parameter: -ellipse.start_parameter,
                        ..ellipse.clone()
                    }))
                }
                _ => None,
            };
            match placed {
                Some(data) => Entity { data, ..self },
                None => self,
            }
        }
    }

    impl EntityData {
        fn transformed_ellipse(&self, m: &DAffine2) -> EntityData {
            match self {
                EntityData::Ellipse(ellipse) => match ellipse.transformed(m) {
                    Some((transformed, _)) => EntityData::Ellipse(transformed),
                    None => self.clone(),
                },
                _ => self.clone(),
            }
        }
    }

    /// 经 `m` 放置后的旋转角。镜像变换 `k·R(a)·F` 满足 `R(a)·F·R(r) = R(a - r)·F`。
    fn placed_rotation(rotation: f64, m: &DAffine2) -> f64 {
        if is_mirroring(m) {
            rotation_of(m) - rotation
        } else {
            rotation + rotation_of(m)
        }
    }

    fn angle_from(center: Point2, point: Point2) -> f64 {
        let direction = point.as_vec2() - center.as_vec2();
        direction.y.atan2(direction.x)
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Point {
        pub location: Point2,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
    }

    /// 圆弧，角度以弧度存储，逆时针从起始角到终止角。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
    }

    impl Arc {
        pub fn start_point(&self) -> Point2 {
            Point2::from_vec(
                self.center.as_vec2() + DVec2::from_angle(self.start_angle) * self.radius,
            )
        }

        pub fn end_point(&self) -> Point2 {
            Point2::from_vec(self.center.as_vec2() + DVec2::from_angle(self.end_angle) * self.radius)
        }
    }

    /// 椭圆实体，记录主轴向量与参数范围（单位为弧度）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Ellipse {
        pub center: Point2,
        pub major_axis: Vector2,
        pub ratio: f64,
        pub start_parameter: f64,
        pub end_parameter: f64,
    }

    impl Ellipse {
        /// 变换后的椭圆，以及参数方向是否被翻转。
        fn transformed(&self, m: &DAffine2) -> Option<(Ellipse, bool)> {
            let major = m.transform_vector2(self.major_axis.as_vec2());
            let minor = m.transform_vector2(self.major_axis.as_vec2().perp() * self.ratio);
            let major_len = major.length();
            if major_len <= f64::EPSILON {
                return None;
            }
            // 副轴落在主轴顺时针一侧时参数方向翻转。
            let flipped = major.perp_dot(minor) < 0.0;
            let (start_parameter, end_parameter) = if flipped {
                (-self.end_parameter, -self.start_parameter)
            } else {
                (self.start_parameter, self.end_parameter)
            };
            Some((
                Ellipse {
                    center: self.center.transform(m),
                    major_axis: Vector2::from(major),
                    ratio: minor.length() / major_len,
                    start_parameter,
                    end_parameter,
                },
                flipped,
            ))
        }

        fn from_circular(center: Point2, radius: f64, start: f64, end: f64) -> Self {
            Self {
                center,
                major_axis: Vector2::new(radius, 0.0),
                ratio: 1.0,
                start_parameter: start,
                end_parameter: end,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum PolylineFlavor {
        /// LWPOLYLINE
        Lightweight,
        /// 旧式二维 POLYLINE
        TwoD,
        /// 三维 POLYLINE（标志位 8）
        ThreeD,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        pub flavor: PolylineFlavor,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point2,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point2) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point2, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    /// 多面网格。面索引从 1 开始，负值表示该边不可见，0 表示未使用。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PolyfaceMesh {
        pub vertices: Vec<Point3>,
        pub faces: Vec<[i32; 4]>,
    }

    impl PolyfaceMesh {
        /// 每个面解析为世界坐标顶点；越界索引被忽略。
        pub fn face_vertices(&self) -> Vec<Vec<Point3>> {
            self.faces
                .iter()
                .map(|face| {
                    face.iter()
                        .filter(|index| **index != 0)
                        .filter_map(|index| {
                            let position = index.unsigned_abs() as usize;
                            self.vertices.get(position - 1).copied()
                        })
                        .collect::<Vec<_>>()
                })
                .filter(|vertices| !vertices.is_empty())
                .collect()
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Spline {
        pub degree: i32,
        pub is_closed: bool,
        pub control_points: Vec<Point2>,
        pub fit_points: Vec<Point2>,
        pub knot_values: Vec<f64>,
        pub weights: Vec<f64>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MText {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
    }

    /// 块参照；旋转角以弧度存储。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        pub scale: Vector2,
        pub z_scale: f64,
        pub rotation: f64,
    }

    impl BlockReference {
        pub fn placement(&self, base_point: Point2) -> DAffine2 {
            placement(self.insert, self.rotation, self.scale, base_point)
        }
    }

    /// 标注本身没有几何，外观存放在匿名块 `*D…` 中。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Dimension {
        pub block_name: Option<String>,
        pub definition_point: Point2,
        pub text_midpoint: Point2,
        pub measurement: Option<f64>,
        pub text: Option<String>,
        /// 标注位于块内被展开时累积的放置变换。
        pub placement: DAffine2,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Hatch {
        pub pattern_name: String,
        pub solid_fill: bool,
        pub loops: Vec<HatchLoop>,
    }

    /// 填充边界环。`flags` 保留组码 92 的原值。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct HatchLoop {
        #[serde(default)]
        pub flags: i32,
        pub edges: Vec<HatchEdge>,
    }

    impl HatchLoop {
        pub const EXTERNAL: i32 = 1;
        pub const POLYLINE: i32 = 2;
        pub const DERIVED: i32 = 4;
        pub const TEXTBOX: i32 = 8;
        pub const OUTERMOST: i32 = 16;

        pub fn new(flags: i32, edges: Vec<HatchEdge>) -> Self {
            Self { flags, edges }
        }

        #[inline]
        pub fn is_external(&self) -> bool {
            self.flags & Self::EXTERNAL != 0
        }

        #[inline]
        pub fn is_outermost(&self) -> bool {
            self.flags & Self::OUTERMOST != 0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum HatchEdge {
        Line {
            start: Point2,
            end: Point2,
        },
        Arc {
            center: Point2,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            is_counter_clockwise: bool,
        },
        Ellipse {
            center: Point2,
            major_axis: Vector2,
            ratio: f64,
            start_angle: f64,
            end_angle: f64,
            is_counter_clockwise: bool,
        },
        Spline {
            degree: i32,
            control_points: Vec<Point2>,
            knot_values: Vec<f64>,
        },
        Polyline {
            vertices: Vec<PolylineVertex>,
            is_closed: bool,
        },
    }

    impl HatchEdge {
        fn transformed(&self, m: &DAffine2) -> HatchEdge {
            match self {
                HatchEdge::Line { start, end } => HatchEdge::Line {
                    start: start.transform(m),
                    end: end.transform(m),
                },
                HatchEdge::Arc {
                    center,
                    radius,
                    start_angle,
                    end_angle,
                    is_counter_clockwise,
                } => {
                    let major = Vector2::new(*radius, 0.0);
                    HatchEdge::Ellipse {
                        center: *center,
                        major_axis: major,
                        ratio: 1.0,
                        start_angle: *start_angle,
                        end_angle: *end_angle,
                        is_counter_clockwise: *is_counter_clockwise,
                    }
                    .transformed(m)
                }
                HatchEdge::Ellipse {
                    center,
                    major_axis,
                    ratio,
                    start_angle,
                    end_angle,
                    is_counter_clockwise,
                } => {
                    let source = Ellipse {
                        center: *center,
                        major_axis: *major_axis,
                        ratio: *ratio,
                        start_parameter: *start_angle,
                        end_parameter: *end_angle,
                    };
                    match source.transformed(m) {
                        Some((ellipse, flipped)) => HatchEdge::Ellipse {
                            center: ellipse.center,
                            major_axis: ellipse.major_axis,
                            ratio: ellipse.ratio,
                            start_angle: ellipse.start_parameter,
                            end_angle: ellipse.end_parameter,
                            is_counter_clockwise: *is_counter_clockwise != flipped,
                        },
                        None => self.clone(),
                    }
                }
                HatchEdge::Spline {
                    degree,
                    control_points,
                    knot_values,
                } => HatchEdge::Spline {
                    degree: *degree,
                    control_points: control_points.iter().map(|p| p.transform(m)).collect(),
                    knot_values: knot_values.clone(),
                },
                HatchEdge::Polyline { vertices, is_closed } => {
                    let mirror = is_mirroring(m);
                    HatchEdge::Polyline {
                        vertices: vertices
                            .iter()
                            .map(|vertex| PolylineVertex {
                                position: vertex.position.transform(m),
                                bulge: if mirror { -vertex.bulge } else { vertex.bulge },
                            })
                            .collect(),
                        is_closed: *is_closed,
                    }
                }
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Leader {
        pub vertices: Vec<Point2>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ThreeDFace {
        pub vertices: [Point3; 4],
    }

    /// SOLID/TRACE：第三、四个顶点按 DXF 约定交叉存储。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Solid {
        pub vertices: [Point2; 4],
    }

    impl Solid {
        /// 按轮廓顺序返回顶点（1, 2, 4, 3）。
        pub fn outline(&self) -> [Point2; 4] {
            [
                self.vertices[0],
                self.vertices[1],
                self.vertices[3],
                self.vertices[2],
            ]
        }
    }

    /// IMAGE 与 WIPEOUT 共用的像素框定义。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RasterFrame {
        pub insert: Point2,
        pub u_vector: Vector2,
        pub v_vector: Vector2,
        pub image_size: Vector2,
        /// 裁剪边界（像素坐标，原点位于图像左上角）；两点表示矩形。
        pub clip_boundary: Vec<Point2>,
    }

    impl RasterFrame {
        fn transformed(&self, m: &DAffine2) -> RasterFrame {
            RasterFrame {
                insert: self.insert.transform(m),
                u_vector: self.u_vector.transform(m),
                v_vector: self.v_vector.transform(m),
                image_size: self.image_size,
                clip_boundary: self.clip_boundary.clone(),
            }
        }

        /// 世界坐标下的边界轮廓（未闭合）。
        pub fn boundary(&self) -> Vec<Point2> {
            let width = self.image_size.x();
            let height = self.image_size.y();
            let pixels: Vec<Point2> = match self.clip_boundary.as_slice() {
                [] => rectangle_corners(Point2::new(-0.5, -0.5), Point2::new(width - 0.5, height - 0.5)),
                [first, second] => rectangle_corners(*first, *second),
                vertices => vertices.to_vec(),
            };
            let u = self.u_vector.as_vec2();
            let v = self.v_vector.as_vec2();
            let origin = self.insert.as_vec2() + u * 0.5 - v * 0.5;
            pixels
                .into_iter()
                .map(|pixel| Point2::from_vec(origin + u * pixel.x() + v * (height - pixel.y())))
                .collect()
        }
    }

    fn rectangle_corners(first: Point2, second: Point2) -> Vec<Point2> {
        let mut bounds = Bounds2D::empty();
        bounds.include_point(first);
        bounds.include_point(second);
        bounds.corners().to_vec()
    }

    /// 布局视口：中心与尺寸位于图纸空间，`view_*` 描述其显示的模型空间范围。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Viewport {
        pub center: Point2,
        pub width: f64,
        pub height: f64,
        pub view_center: Point2,
        pub view_height: f64,
        pub id: i32,
    }

    impl Viewport {
        /// 视口显示的模型空间矩形。
        pub fn modelspace_bounds(&self) -> Option<Bounds2D> {
            if self.height.abs() <= f64::EPSILON || self.view_height <= 0.0 {
                return None;
            }
            let view_width = self.view_height * self.width / self.height;
            let half = DVec2::new(view_width.abs() * 0.5, self.view_height * 0.5);
            let center = self.view_center.as_vec2();
            Some(Bounds2D::new(
                Point2::from_vec(center - half),
                Point2::from_vec(center + half),
            ))
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub handle: Option<String>,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    impl BlockDefinition {
        /// 匿名块（`*D`、`*U` 等）由标注、动态块等生成。
        pub fn is_anonymous(&self) -> bool {
            self.name.starts_with('*')
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum EntitySlot {
        Layout(usize),
        Block(usize),
    }

    /// 文档：原始段、解码后的实体、块定义以及句柄索引。
    #[derive(Debug, Default)]
    pub struct Document {
        sections: Vec<Section>,
        entities: Vec<Entity>,
        blocks: HashMap<String, Rc<BlockDefinition>>,
        block_order: Vec<String>,
        entity_db: HashMap<String, (EntitySlot, usize)>,
    }

    impl Document {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_section(&mut self, section: Section) {
            self.sections.push(section);
        }

        pub fn sections(&self) -> impl Iterator<Item = &Section> {
            self.sections.iter()
        }

        /// 按段名查找（大小写不敏感）。
        pub fn section(&self, name: &str) -> Option<&Section> {
            self.sections
                .iter()
                .find(|section| section.name().eq_ignore_ascii_case(name))
        }

        /// 追加实体并登记句柄；同一句柄首次出现者优先。
        pub fn add_entity(&mut self, entity: Entity) -> usize {
            let index = self.entities.len();
            if let Some(handle) = entity.handle() {
                self.entity_db
                    .entry(handle.to_string())
                    .or_insert((EntitySlot::Layout(index), 0));
            }
            self.entities.push(entity);
            index
        }

        pub fn entities(&self) -> impl Iterator<Item = &Entity> {
            self.entities.iter()
        }

        /// 模型空间实体（排除组码 67 标记的图纸空间实体）。
        pub fn modelspace(&self) -> impl Iterator<Item = &Entity> {
            self.entities.iter().filter(|entity| !entity.paper_space)
        }

        /// 登记块定义；同名块保留首次定义，返回 `false` 表示被忽略。
        pub fn add_block(&mut self, block: BlockDefinition) -> bool {
            if self.blocks.contains_key(&block.name) {
                return false;
            }
            let block_index = self.block_order.len();
            for (index, entity) in block.entities.iter().enumerate() {
                if let Some(handle) = entity.handle() {
                    self.entity_db
                        .entry(handle.to_string())
                        .or_insert((EntitySlot::Block(block_index), index));
                }
            }
            self.block_order.push(block.name.clone());
            self.blocks.insert(block.name.clone(), Rc::new(block));
            true
        }

        pub fn block(&self, name: &str) -> Option<Rc<BlockDefinition>> {
            self.blocks.get(name).cloned()
        }

        /// 按文件中的出现顺序遍历块定义。
        pub fn blocks(&self) -> impl Iterator<Item = &Rc<BlockDefinition>> {
            self.block_order
                .iter()
                .filter_map(|name| self.blocks.get(name))
        }

        /// 句柄索引：覆盖布局实体与块内实体。
        pub fn entity_by_handle(&self, handle: &str) -> Option<&Entity> {
            let (slot, index) = self.entity_db.get(handle.trim())?;
            match slot {
                EntitySlot::Layout(position) => self.entities.get(*position),
                EntitySlot::Block(block_index) => {
                    let name = self.block_order.get(*block_index)?;
                    self.blocks.get(name)?.entities.get(*index)
                }
            }
        }

        /// 块参照或标注展开后的虚拟实体；其他实体返回空列表。
        pub fn virtual_entities(&self, entity: &Entity) -> Vec<Entity> {
            match &entity.data {
                EntityData::BlockReference(reference) => match self.blocks.get(&reference.name) {
                    Some(block) => {
                        let m = reference.placement(block.base_point);
                        block.entities.iter().map(|child| child.transformed(&m)).collect()
                    }
                    None => Vec::new(),
                },
                EntityData::Dimension(dimension) => {
                    let block = dimension
                        .block_name
                        .as_deref()
                        .and_then(|name| self.blocks.get(name));
                    match block {
                        Some(block) => block
                            .entities
                            .iter()
                            .map(|child| child.transformed(&dimension.placement))
                            .collect(),
                        None => Vec::new(),
                    }
                }
                _ => Vec::new(),
            }
        }
    }

}
