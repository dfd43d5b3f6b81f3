use glam::{DAffine2, DVec3};
use shapediff_core::document::{
    Arc, BlockDefinition, BlockReference, Circle, Dimension, Document, Ellipse, Entity,
    EntityData, Hatch, HatchEdge, HatchLoop, Leader, Line, MText, Point, PolyfaceMesh, Polyline,
    PolylineFlavor, PolylineVertex, RasterFrame, Solid, Spline, Text, ThreeDFace, Viewport,
};
use shapediff_core::geometry::{Point2, Point3, Vector2};
use shapediff_core::raw::{Record, Section, SectionRole, Tag};
use tracing::{debug, warn};

use crate::DxfError;

const POLYLINE_CLOSED: i32 = 1;
const POLYLINE_3D: i32 = 8;
const POLYLINE_MESH: i32 = 16;
const POLYLINE_POLYFACE: i32 = 64;
const VERTEX_SPLINE_FRAME: i32 = 16;
const VERTEX_MESH: i32 = 64;
const VERTEX_POLYFACE: i32 = 128;

/// 由原始段构建文档：ENTITIES 与 BLOCKS 段解码为实体，全部段原样保留。
pub(crate) fn build_document(sections: Vec<Section>) -> Result<Document, DxfError> {
    let mut document = Document::new();
    for section in &sections {
        match section.role() {
            Some(SectionRole::Entities) => {
                for entity in decode_entities(section.records())? {
                    document.add_entity(entity);
                }
            }
            Some(SectionRole::Blocks) => {
                for block in decode_blocks(section.records())? {
                    let name = block.name.clone();
                    if !document.add_block(block) {
                        warn!(block = %name, "块名重复，保留首次定义");
                    }
                }
            }
            _ => {}
        }
    }
    for section in sections {
        document.add_section(section);
    }
    debug!(
        entities = document.entities().count(),
        blocks = document.blocks().count(),
        "文档解码完成"
    );
    Ok(document)
}

fn decode_blocks(records: &[Record]) -> Result<Vec<BlockDefinition>, DxfError> {
    let mut blocks = Vec::new();
    let mut index = 0;
    while index < records.len() {
        let record = &records[index];
        if record.kind() != "BLOCK" {
            // ENDBLK 或游离记录
            index += 1;
            continue;
        }
        let end = records[index + 1..]
            .iter()
            .position(|candidate| candidate.kind() == "ENDBLK")
            .map(|offset| index + 1 + offset)
            .ok_or_else(|| DxfError::invalid("BLOCK 定义未找到 ENDBLK 终止标记"))?;

        let mut name: Option<String> = None;
        let mut handle: Option<String> = None;
        let mut base_x = 0.0;
        let mut base_y = 0.0;
        for tag in record.tags() {
            match tag.code {
                2 => name = Some(tag.value.trim().to_string()),
                5 => {
                    let trimmed = tag.value.trim();
                    if !trimmed.is_empty() {
                        handle = Some(trimmed.to_string());
                    }
                }
                10 => base_x = parse_f64(&tag.value, "BLOCK 基点 X")?,
                20 => base_y = parse_f64(&tag.value, "BLOCK 基点 Y")?,
                _ => {}
            }
        }
        let name = name.ok_or_else(|| DxfError::invalid("BLOCK 缺少名称（组码 2）"))?;
        let content: Vec<&Record> = records[index + 1..end]
            .iter()
            .filter(|child| child.kind() != "ATTDEF")
            .collect();
        let entities = decode_entity_records(&content)?;
        blocks.push(BlockDefinition {
            name,
            handle,
            base_point: Point2::new(base_x, base_y),
            entities,
        });
        index = end + 1;
    }
    Ok(blocks)
}

pub(crate) fn decode_entities(records: &[Record]) -> Result<Vec<Entity>, DxfError> {
    let refs: Vec<&Record> = records.iter().collect();
    decode_entity_records(&refs)
}

/// 解码实体记录序列。POLYLINE 吸收其后的 VERTEX/SEQEND，INSERT 吸收 ATTRIB/SEQEND。
fn decode_entity_records(records: &[&Record]) -> Result<Vec<Entity>, DxfError> {
    let mut entities = Vec::new();
    let mut index = 0;
    while index < records.len() {
        let record = records[index];
        index += 1;
        match record.kind() {
            "POLYLINE" => {
                let mut vertices = Vec::new();
                while index < records.len() {
                    match records[index].kind() {
                        "VERTEX" => {
                            vertices.push(records[index]);
                            index += 1;
                        }
                        "SEQEND" => {
                            index += 1;
                            break;
                        }
                        _ => break,
                    }
                }
                entities.push(finish_entity(record, decode_polyline(&vertices, record)?)?);
            }
            "INSERT" => {
                entities.push(finish_entity(record, decode_insert(record)?)?);
                while index < records.len() && records[index].kind() == "ATTRIB" {
                    index += 1;
                }
                if index < records.len() && records[index].kind() == "SEQEND" {
                    index += 1;
                }
            }
            // 序列的附属记录，不单独成为实体
            "VERTEX" | "SEQEND" | "ATTRIB" | "" => {}
            kind => {
                let data = decode_entity_data(kind, record)?;
                entities.push(finish_entity(record, data)?);
            }
        }
    }
    Ok(entities)
}

fn decode_entity_data(kind: &str, record: &Record) -> Result<EntityData, DxfError> {
    match kind {
        "POINT" => decode_point(record),
        "LINE" => decode_line(record),
        "CIRCLE" => decode_circle(record),
        "ARC" => decode_arc(record),
        "ELLIPSE" => decode_ellipse(record),
        "LWPOLYLINE" => decode_lwpolyline(record),
        "SPLINE" => decode_spline(record),
        "TEXT" => decode_text(record),
        "MTEXT" => decode_mtext(record),
        "DIMENSION" => decode_dimension(record),
        "HATCH" => decode_hatch(record),
        "LEADER" => decode_leader(record),
        "3DFACE" => decode_3dface(record),
        "SOLID" | "TRACE" => decode_solid(kind, record),
        "IMAGE" => decode_raster_frame(kind, record).map(EntityData::Image),
        "WIPEOUT" => decode_raster_frame(kind, record).map(EntityData::Wipeout),
        "VIEWPORT" => decode_viewport(record),
        other => {
            debug!(kind = other, handle = ?record.handle(), "未识别的实体类型，保留原始组码");
            Ok(EntityData::Unsupported {
                dxf_type: other.to_string(),
            })
        }
    }
}

/// 补齐所有实体共享的字段：句柄、图层、图纸空间标记与原始组码，
/// 并按拉伸方向（组码 210/220/230）把 OCS 坐标换算到 WCS。
fn finish_entity(record: &Record, data: EntityData) -> Result<Entity, DxfError> {
    let mut entity = Entity::new(data).with_tags(record.tags().to_vec());
    let mut extrusion = DVec3::Z;
    for tag in record.tags() {
        match tag.code {
            5 if entity.handle.is_none() => {
                let trimmed = tag.value.trim();
                if !trimmed.is_empty() {
                    entity.handle = Some(trimmed.to_string());
                }
            }
            8 => entity.layer = tag.value.trim().to_string(),
            67 => entity.paper_space = parse_i16(&tag.value, "图纸空间标记（组码 67）")? == 1,
            210 => extrusion.x = parse_f64(&tag.value, "拉伸方向 X（组码 210）")?,
            220 => extrusion.y = parse_f64(&tag.value, "拉伸方向 Y（组码 220）")?,
            230 => extrusion.z = parse_f64(&tag.value, "拉伸方向 Z（组码 230）")?,
            // 扩展数据之后不再出现通用字段
            1001 => break,
            _ => {}
        }
    }
    Ok(entity.into_wcs(extrusion))
}

fn decode_point(record: &Record) -> Result<EntityData, DxfError> {
    let mut x = None;
    let mut y = None;
    for tag in record.tags() {
        match tag.code {
            10 => assign_coord(&mut x, &tag.value, "POINT 位置 X（组码 10）")?,
            20 => assign_coord(&mut y, &tag.value, "POINT 位置 Y（组码 20）")?,
            _ => {}
        }
    }
    let x = x.ok_or_else(|| DxfError::invalid("POINT 缺少位置 X（组码 10）"))?;
    let y = y.ok_or_else(|| DxfError::invalid("POINT 缺少位置 Y（组码 20）"))?;
    Ok(EntityData::Point(Point {
        location: Point2::new(x, y),
    }))
}

fn decode_line(record: &Record) -> Result<EntityData, DxfError> {
    let mut start_x = None;
    let mut start_y = None;
    let mut end_x = None;
    let mut end_y = None;
    for tag in record.tags() {
        match tag.code {
            10 => assign_coord(&mut start_x, &tag.value, "LINE 起点 X（组码 10）")?,
            20 => assign_coord(&mut start_y, &tag.value, "LINE 起点 Y（组码 20）")?,
            11 => assign_coord(&mut end_x, &tag.value, "LINE 终点 X（组码 11）")?,
            21 => assign_coord(&mut end_y, &tag.value, "LINE 终点 Y（组码 21）")?,
            // 忽略 Z 坐标
            _ => {}
        }
    }
    let sx = start_x.ok_or_else(|| DxfError::invalid("LINE 缺少起点 X（组码 10）"))?;
    let sy = start_y.ok_or_else(|| DxfError::invalid("LINE 缺少起点 Y（组码 20）"))?;
    let ex = end_x.ok_or_else(|| DxfError::invalid("LINE 缺少终点 X（组码 11）"))?;
    let ey = end_y.ok_or_else(|| DxfError::invalid("LINE 缺少终点 Y（组码 21）"))?;
    Ok(EntityData::Line(Line {
        start: Point2::new(sx, sy),
        end: Point2::new(ex, ey),
    }))
}

fn decode_circle(record: &Record) -> Result<EntityData, DxfError> {
    let mut center_x = None;
    let mut center_y = None;
    let mut radius = None;
    for tag in record.tags() {
        match tag.code {
            10 => assign_coord(&mut center_x, &tag.value, "CIRCLE 圆心 X（组码 10）")?,
            20 => assign_coord(&mut center_y, &tag.value, "CIRCLE 圆心 Y（组码 20）")?,
            40 => assign_coord(&mut radius, &tag.value, "CIRCLE 半径（组码 40）")?,
            _ => {}
        }
    }
    let cx = center_x.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 X（组码 10）"))?;
    let cy = center_y.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 Y（组码 20）"))?;
    let radius = radius.ok_or_else(|| DxfError::invalid("CIRCLE 缺少半径（组码 40）"))?;
    Ok(EntityData::Circle(Circle {
        center: Point2::new(cx, cy),
        radius,
    }))
}

fn decode_arc(record: &Record) -> Result<EntityData, DxfError> {
    let mut center_x = None;
    let mut center_y = None;
    let mut radius = None;
    let mut start_angle = None;
    let mut end_angle = None;
    for tag in record.tags() {
        match tag.code {
            10 => assign_coord(&mut center_x, &tag.value, "ARC 圆心 X（组码 10）")?,
            20 => assign_coord(&mut center_y, &tag.value, "ARC 圆心 Y（组码 20）")?,
            40 => assign_coord(&mut radius, &tag.value, "ARC 半径（组码 40）")?,
            50 => assign_coord(&mut start_angle, &tag.value, "ARC 起始角（组码 50）")?,
            51 => assign_coord(&mut end_angle, &tag.value, "ARC 终止角（组码 51）")?,
            _ => {}
        }
    }
    let cx = center_x.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 X（组码 10）"))?;
    let cy = center_y.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 Y（组码 20）"))?;
    let radius = radius.ok_or_else(|| DxfError::invalid("ARC 缺少半径（组码 40）"))?;
    let start_angle = start_angle.ok_or_else(|| DxfError::invalid("ARC 缺少起始角（组码 50）"))?;
    let end_angle = end_angle.ok_or_else(|| DxfError::invalid("ARC 缺少终止角（组码 51）"))?;
    Ok(EntityData::Arc(Arc {
        center: Point2::new(cx, cy),
        radius,
        start_angle: start_angle.to_radians(),
        end_angle: end_angle.to_radians(),
    }))
}

fn decode_ellipse(record: &Record) -> Result<EntityData, DxfError> {
    let mut center_x = None;
    let mut center_y = None;
    let mut major_x = None;
    let mut major_y = None;
    let mut ratio = None;
    let mut start_parameter = 0.0;
    let mut end_parameter = std::f64::consts::TAU;
    for tag in record.tags() {
        match tag.code {
            10 => assign_coord(&mut center_x, &tag.value, "ELLIPSE 中心 X（组码 10）")?,
            20 => assign_coord(&mut center_y, &tag.value, "ELLIPSE 中心 Y（组码 20）")?,
            11 => assign_coord(&mut major_x, &tag.value, "ELLIPSE 主轴 X（组码 11）")?,
            21 => assign_coord(&mut major_y, &tag.value, "ELLIPSE 主轴 Y（组码 21）")?,
            40 => assign_coord(&mut ratio, &tag.value, "ELLIPSE 轴比（组码 40）")?,
            41 => start_parameter = parse_f64(&tag.value, "ELLIPSE 起始参数（组码 41）")?,
            42 => end_parameter = parse_f64(&tag.value, "ELLIPSE 终止参数（组码 42）")?,
            _ => {}
        }
    }
    let cx = center_x.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少中心 X（组码 10）"))?;
    let cy = center_y.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少中心 Y（组码 20）"))?;
    let mx = major_x.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少主轴 X（组码 11）"))?;
    let my = major_y.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少主轴 Y（组码 21）"))?;
    let ratio = ratio.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少轴比（组码 40）"))?;
    Ok(EntityData::Ellipse(Ellipse {
        center: Point2::new(cx, cy),
        major_axis: Vector2::new(mx, my),
        ratio,
        start_parameter,
        end_parameter,
    }))
}

fn decode_lwpolyline(record: &Record) -> Result<EntityData, DxfError> {
    let mut flags = 0;
    let mut vertices: Vec<PolylineVertex> = Vec::new();
    let mut pending_x: Option<f64> = None;
    for tag in record.tags() {
        match tag.code {
            70 => flags = parse_i32(&tag.value, "LWPOLYLINE 标志（组码 70）")?,
            10 => {
                if pending_x.is_some() {
                    return Err(DxfError::invalid("LWPOLYLINE 顶点缺少 Y 坐标（组码 20）"));
                }
                pending_x = Some(parse_f64(&tag.value, "LWPOLYLINE 顶点 X（组码 10）")?);
            }
            20 => {
                let x = pending_x
                    .take()
                    .ok_or_else(|| DxfError::invalid("LWPOLYLINE 顶点 Y 之前缺少 X（组码 10）"))?;
                let y = parse_f64(&tag.value, "LWPOLYLINE 顶点 Y（组码 20）")?;
                vertices.push(PolylineVertex::new(Point2::new(x, y)));
            }
            42 => {
                let bulge = parse_f64(&tag.value, "LWPOLYLINE 凸度（组码 42）")?;
                let vertex = vertices
                    .last_mut()
                    .ok_or_else(|| DxfError::invalid("LWPOLYLINE 凸度出现在首个顶点之前"))?;
                vertex.bulge = bulge;
            }
            _ => {}
        }
    }
    if pending_x.is_some() {
        return Err(DxfError::invalid("LWPOLYLINE 最后一个顶点缺少 Y 坐标（组码 20）"));
    }
    Ok(EntityData::Polyline(Polyline {
        vertices,
        is_closed: flags & POLYLINE_CLOSED != 0,
        flavor: PolylineFlavor::Lightweight,
    }))
}

struct VertexRecord {
    position: Point3,
    bulge: f64,
    flags: i32,
    indices: [i32; 4],
}

fn decode_vertex(record: &Record) -> Result<VertexRecord, DxfError> {
    let mut x = None;
    let mut y = None;
    let mut z = None;
    let mut bulge = 0.0;
    let mut flags = 0;
    let mut indices = [0; 4];
    for tag in record.tags() {
        match tag.code {
            10 => assign_coord(&mut x, &tag.value, "VERTEX X（组码 10）")?,
            20 => assign_coord(&mut y, &tag.value, "VERTEX Y（组码 20）")?,
            30 => assign_coord(&mut z, &tag.value, "VERTEX Z（组码 30）")?,
            42 => bulge = parse_f64(&tag.value, "VERTEX 凸度（组码 42）")?,
            70 => flags = parse_i32(&tag.value, "VERTEX 标志（组码 70）")?,
            71..=74 => {
                let slot = (tag.code - 71) as usize;
                indices[slot] = parse_i32(&tag.value, "VERTEX 面索引（组码 71-74）")?;
            }
            _ => {}
        }
    }
    Ok(VertexRecord {
        position: Point3::new(x.unwrap_or(0.0), y.unwrap_or(0.0), z.unwrap_or(0.0)),
        bulge,
        flags,
        indices,
    })
}

/// 旧式 POLYLINE：按标志位区分二维/三维折线、多面网格与多边形网格。
fn decode_polyline(vertex_records: &[&Record], header: &Record) -> Result<EntityData, DxfError> {
    let mut flags = 0;
    let mut mesh_m = 0;
    let mut mesh_n = 0;
    for tag in header.tags() {
        match tag.code {
            70 => flags = parse_i32(&tag.value, "POLYLINE 标志（组码 70）")?,
            71 => mesh_m = parse_i32(&tag.value, "POLYLINE 网格 M 数量（组码 71）")?,
            72 => mesh_n = parse_i32(&tag.value, "POLYLINE 网格 N 数量（组码 72）")?,
            _ => {}
        }
    }
    let vertices = vertex_records
        .iter()
        .map(|record| decode_vertex(record))
        .collect::<Result<Vec<_>, _>>()?;

    if flags & POLYLINE_POLYFACE != 0 {
        let mut positions = Vec::new();
        let mut faces = Vec::new();
        for vertex in &vertices {
            if vertex.flags & VERTEX_POLYFACE != 0 && vertex.flags & VERTEX_MESH != 0 {
                positions.push(vertex.position);
            } else if vertex.flags & VERTEX_POLYFACE != 0 {
                faces.push(vertex.indices);
            }
        }
        return Ok(EntityData::PolyfaceMesh(PolyfaceMesh {
            vertices: positions,
            faces,
        }));
    }

    if flags & POLYLINE_MESH != 0 {
        return decode_polygon_mesh(&vertices, mesh_m, mesh_n, flags);
    }

    let flavor = if flags & POLYLINE_3D != 0 {
        PolylineFlavor::ThreeD
    } else {
        PolylineFlavor::TwoD
    };
    let vertices = vertices
        .iter()
        .filter(|vertex| vertex.flags & VERTEX_SPLINE_FRAME == 0)
        .map(|vertex| PolylineVertex::with_bulge(vertex.position.to_2d(), vertex.bulge))
        .collect();
    Ok(EntityData::Polyline(Polyline {
        vertices,
        is_closed: flags & POLYLINE_CLOSED != 0,
        flavor,
    }))
}

/// M×N 多边形网格转换为四边形面的多面网格。
fn decode_polygon_mesh(
    vertices: &[VertexRecord],
    mesh_m: i32,
    mesh_n: i32,
    flags: i32,
) -> Result<EntityData, DxfError> {
    let m = usize::try_from(mesh_m)
        .map_err(|_| DxfError::invalid(format!("POLYLINE 网格 M 数量无效（值：{mesh_m}）")))?;
    let n = usize::try_from(mesh_n)
        .map_err(|_| DxfError::invalid(format!("POLYLINE 网格 N 数量无效（值：{mesh_n}）")))?;
    let expected = m.checked_mul(n).ok_or_else(|| {
        DxfError::invalid(format!("POLYLINE 网格 M×N 溢出（M={mesh_m}，N={mesh_n}）"))
    })?;
    if expected != vertices.len() {
        return Err(DxfError::invalid(format!(
            "POLYLINE 网格顶点数量 {} 与 M×N={expected} 不一致",
            vertices.len()
        )));
    }
    let closed_m = flags & POLYLINE_CLOSED != 0;
    let closed_n = flags & 32 != 0;
    let rows = if closed_m { m } else { m.saturating_sub(1) };
    let columns = if closed_n { n } else { n.saturating_sub(1) };
    let index = |row: usize, column: usize| -> i32 { ((row % m) * n + (column % n) + 1) as i32 };
    let mut faces = Vec::with_capacity(rows * columns);
    for row in 0..rows {
        for column in 0..columns {
            faces.push([
                index(row, column),
                index(row, column + 1),
                index(row + 1, column + 1),
                index(row + 1, column),
            ]);
        }
    }
    Ok(EntityData::PolyfaceMesh(PolyfaceMesh {
        vertices: vertices.iter().map(|vertex| vertex.position).collect(),
        faces,
    }))
}

fn decode_spline(record: &Record) -> Result<EntityData, DxfError> {
    let mut flags = 0;
    let mut degree = 3;
    let mut knot_values = Vec::new();
    let mut weights = Vec::new();
    let mut control_points = Vec::new();
    let mut fit_points = Vec::new();
    let mut pending_control: Option<f64> = None;
    let mut pending_fit: Option<f64> = None;
    for tag in record.tags() {
        match tag.code {
            70 => flags = parse_i32(&tag.value, "SPLINE 标志（组码 70）")?,
            71 => degree = parse_i32(&tag.value, "SPLINE 阶数（组码 71）")?,
            40 => knot_values.push(parse_f64(&tag.value, "SPLINE 节点（组码 40）")?),
            41 => weights.push(parse_f64(&tag.value, "SPLINE 权重（组码 41）")?),
            10 => pending_control = Some(parse_f64(&tag.value, "SPLINE 控制点 X（组码 10）")?),
            20 => {
                let x = pending_control
                    .take()
                    .ok_or_else(|| DxfError::invalid("SPLINE 控制点 Y 之前缺少 X（组码 10）"))?;
                let y = parse_f64(&tag.value, "SPLINE 控制点 Y（组码 20）")?;
                control_points.push(Point2::new(x, y));
            }
            11 => pending_fit = Some(parse_f64(&tag.value, "SPLINE 拟合点 X（组码 11）")?),
            21 => {
                let x = pending_fit
                    .take()
                    .ok_or_else(|| DxfError::invalid("SPLINE 拟合点 Y 之前缺少 X（组码 11）"))?;
                let y = parse_f64(&tag.value, "SPLINE 拟合点 Y（组码 21）")?;
                fit_points.push(Point2::new(x, y));
            }
            _ => {}
        }
    }
    Ok(EntityData::Spline(Spline {
        degree,
        is_closed: flags & 1 != 0,
        control_points,
        fit_points,
        knot_values,
        weights,
    }))
}

fn decode_text(record: &Record) -> Result<EntityData, DxfError> {
    let mut insert_x = None;
    let mut insert_y = None;
    let mut height = 0.0;
    let mut rotation = 0.0;
    let mut content = String::new();
    for tag in record.tags() {
        match tag.code {
            10 => assign_coord(&mut insert_x, &tag.value, "TEXT 插入点 X（组码 10）")?,
            20 => assign_coord(&mut insert_y, &tag.value, "TEXT 插入点 Y（组码 20）")?,
            40 => height = parse_f64(&tag.value, "TEXT 字高（组码 40）")?,
            50 => rotation = parse_f64(&tag.value, "TEXT 旋转角（组码 50）")?,
            1 => content = tag.value.clone(),
            _ => {}
        }
    }
    let x = insert_x.ok_or_else(|| DxfError::invalid("TEXT 缺少插入点 X（组码 10）"))?;
    let y = insert_y.ok_or_else(|| DxfError::invalid("TEXT 缺少插入点 Y（组码 20）"))?;
    Ok(EntityData::Text(Text {
        insert: Point2::new(x, y),
        content,
        height,
        rotation: rotation.to_radians(),
    }))
}

fn decode_mtext(record: &Record) -> Result<EntityData, DxfError> {
    let mut insert_x = None;
    let mut insert_y = None;
    let mut height = 0.0;
    let mut rotation: Option<f64> = None;
    let mut direction_x: Option<f64> = None;
    let mut direction_y: Option<f64> = None;
    let mut chunks = String::new();
    let mut tail = String::new();
    for tag in record.tags() {
        match tag.code {
            10 => assign_coord(&mut insert_x, &tag.value, "MTEXT 插入点 X（组码 10）")?,
            20 => assign_coord(&mut insert_y, &tag.value, "MTEXT 插入点 Y（组码 20）")?,
            11 => direction_x = Some(parse_f64(&tag.value, "MTEXT 方向 X（组码 11）")?),
            21 => direction_y = Some(parse_f64(&tag.value, "MTEXT 方向 Y（组码 21）")?),
            40 => height = parse_f64(&tag.value, "MTEXT 字高（组码 40）")?,
            50 => {
                rotation = Some(parse_f64(&tag.value, "MTEXT 旋转角（组码 50）")?.to_radians())
            }
            // 长文本先以组码 3 分段，组码 1 为最后一段
            3 => chunks.push_str(&tag.value),
            1 => tail = tag.value.clone(),
            _ => {}
        }
    }
    let x = insert_x.ok_or_else(|| DxfError::invalid("MTEXT 缺少插入点 X（组码 10）"))?;
    let y = insert_y.ok_or_else(|| DxfError::invalid("MTEXT 缺少插入点 Y（组码 20）"))?;
    let rotation = match (rotation, direction_x, direction_y) {
        (Some(angle), _, _) => angle,
        (None, Some(dx), Some(dy)) => dy.atan2(dx),
        _ => 0.0,
    };
    chunks.push_str(&tail);
    Ok(EntityData::MText(MText {
        insert: Point2::new(x, y),
        content: decode_inline_text(&chunks),
        height,
        rotation,
    }))
}

fn decode_insert(record: &Record) -> Result<EntityData, DxfError> {
    let mut name = None;
    let mut insert_x = None;
    let mut insert_y = None;
    let mut scale_x: Option<f64> = None;
    let mut scale_y: Option<f64> = None;
    let mut scale_z: Option<f64> = None;
    let mut rotation_deg = 0.0;
    for tag in record.tags() {
        match tag.code {
            2 => {
                if name.is_some() {
                    return Err(DxfError::invalid("INSERT 遇到重复的块名（组码 2）"));
                }
                name = Some(tag.value.trim().to_string());
            }
            10 => assign_coord(&mut insert_x, &tag.value, "INSERT 插入点 X（组码 10）")?,
            20 => assign_coord(&mut insert_y, &tag.value, "INSERT 插入点 Y（组码 20）")?,
            41 => scale_x = Some(parse_f64(&tag.value, "INSERT 缩放 X（组码 41）")?),
            42 => scale_y = Some(parse_f64(&tag.value, "INSERT 缩放 Y（组码 42）")?),
            43 => scale_z = Some(parse_f64(&tag.value, "INSERT 缩放 Z（组码 43）")?),
            50 => rotation_deg = parse_f64(&tag.value, "INSERT 旋转角（组码 50）")?,
            _ => {}
        }
    }
    let name = name.ok_or_else(|| DxfError::invalid("INSERT 缺少块名（组码 2）"))?;
    let ix = insert_x.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 X（组码 10）"))?;
    let iy = insert_y.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 Y（组码 20）"))?;
    Ok(EntityData::BlockReference(BlockReference {
        name,
        insert: Point2::new(ix, iy),
        scale: Vector2::new(scale_x.unwrap_or(1.0), scale_y.unwrap_or(1.0)),
        z_scale: scale_z.unwrap_or(1.0),
        rotation: rotation_deg.to_radians(),
    }))
}

fn decode_dimension(record: &Record) -> Result<EntityData, DxfError> {
    let mut block_name = None;
    let mut definition_x = None;
    let mut definition_y = None;
    let mut text_x = None;
    let mut text_y = None;
    let mut measurement = None;
    let mut text = None;
    for tag in record.tags() {
        match tag.code {
            2 => {
                let trimmed = tag.value.trim();
                if !trimmed.is_empty() {
                    block_name = Some(trimmed.to_string());
                }
            }
            10 => assign_coord(&mut definition_x, &tag.value, "DIMENSION 定义点 X（组码 10）")?,
            20 => assign_coord(&mut definition_y, &tag.value, "DIMENSION 定义点 Y（组码 20）")?,
            11 => assign_coord(&mut text_x, &tag.value, "DIMENSION 文字中点 X（组码 11）")?,
            21 => assign_coord(&mut text_y, &tag.value, "DIMENSION 文字中点 Y（组码 21）")?,
            42 => measurement = Some(parse_f64(&tag.value, "DIMENSION 测量值（组码 42）")?),
            1 => {
                if !tag.value.is_empty() {
                    text = Some(tag.value.clone());
                }
            }
            _ => {}
        }
    }
    Ok(EntityData::Dimension(Dimension {
        block_name,
        definition_point: Point2::new(definition_x.unwrap_or(0.0), definition_y.unwrap_or(0.0)),
        text_midpoint: Point2::new(text_x.unwrap_or(0.0), text_y.unwrap_or(0.0)),
        measurement,
        text,
        placement: DAffine2::IDENTITY,
    }))
}

/// 顺序读取组码的游标，HATCH 的边界数据依赖字段顺序。
struct TagCursor<'a> {
    tags: &'a [Tag],
    position: usize,
}

impl<'a> TagCursor<'a> {
    fn new(tags: &'a [Tag]) -> Self {
        Self { tags, position: 0 }
    }

    fn advance(&mut self) -> Option<&'a Tag> {
        let tag = self.tags.get(self.position)?;
        self.position += 1;
        Some(tag)
    }

    fn peek_code(&self) -> Option<i32> {
        self.tags.get(self.position).map(|tag| tag.code)
    }

    fn expect(&mut self, code: i32, context: &str) -> Result<&'a Tag, DxfError> {
        match self.advance() {
            Some(tag) if tag.code == code => Ok(tag),
            Some(tag) => Err(DxfError::invalid(format!(
                "{context} 期望组码 {code}，实际为 {}",
                tag.code
            ))),
            None => Err(DxfError::invalid(format!("{context} 缺少组码 {code}"))),
        }
    }

    fn expect_f64(&mut self, code: i32, context: &str) -> Result<f64, DxfError> {
        let tag = self.expect(code, context)?;
        parse_f64(&tag.value, context)
    }

    fn expect_i32(&mut self, code: i32, context: &str) -> Result<i32, DxfError> {
        let tag = self.expect(code, context)?;
        parse_i32(&tag.value, context)
    }

    fn expect_point(&mut self, x_code: i32, context: &str) -> Result<Point2, DxfError> {
        let x = self.expect_f64(x_code, context)?;
        let y = self.expect_f64(x_code + 10, context)?;
        Ok(Point2::new(x, y))
    }

    fn skip_while(&mut self, code: i32) {
        while self.peek_code() == Some(code) {
            self.position += 1;
        }
    }
}

fn decode_hatch(record: &Record) -> Result<EntityData, DxfError> {
    let mut cursor = TagCursor::new(record.tags());
    let mut pattern_name = String::new();
    let mut solid_fill = false;
    let mut loops = Vec::new();
    while let Some(tag) = cursor.advance() {
        match tag.code {
            2 => pattern_name = tag.value.trim().to_string(),
            70 => solid_fill = parse_i16(&tag.value, "HATCH 实体填充标记（组码 70）")? == 1,
            91 => {
                let count = parse_i32(&tag.value, "HATCH 边界数量（组码 91）")?;
                for index in 0..count.max(0) {
                    loops.push(decode_hatch_loop(&mut cursor, index)?);
                }
                // 边界之后是图案定义与种子点，不再需要
                break;
            }
            _ => {}
        }
    }
    Ok(EntityData::Hatch(Hatch {
        pattern_name,
        solid_fill,
        loops,
    }))
}

fn decode_hatch_loop(cursor: &mut TagCursor<'_>, index: i32) -> Result<HatchLoop, DxfError> {
    let context = format!("HATCH 边界 {index}");
    let flags = cursor.expect_i32(92, &format!("{context} 类型"))?;
    let mut edges = Vec::new();
    if flags & HatchLoop::POLYLINE != 0 {
        let has_bulge = cursor.expect_i32(72, &format!("{context} 凸度标记"))? != 0;
        let is_closed = cursor.expect_i32(73, &format!("{context} 闭合标记"))? != 0;
        let count = cursor.expect_i32(93, &format!("{context} 顶点数量"))?;
        let mut vertices = Vec::new();
        for _ in 0..count.max(0) {
            let position = cursor.expect_point(10, &format!("{context} 顶点"))?;
            let bulge = if has_bulge && cursor.peek_code() == Some(42) {
                cursor.expect_f64(42, &format!("{context} 凸度"))?
            } else {
                0.0
            };
            vertices.push(PolylineVertex::with_bulge(position, bulge));
        }
        edges.push(HatchEdge::Polyline {
            vertices,
            is_closed,
        });
    } else {
        let count = cursor.expect_i32(93, &format!("{context} 边数量"))?;
        for _ in 0..count.max(0) {
            edges.push(decode_hatch_edge(cursor, &context)?);
        }
    }
    if cursor.peek_code() == Some(97) {
        cursor.advance();
        cursor.skip_while(330);
    }
    Ok(HatchLoop::new(flags, edges))
}

fn decode_hatch_edge(cursor: &mut TagCursor<'_>, context: &str) -> Result<HatchEdge, DxfError> {
    let edge_type = cursor.expect_i32(72, &format!("{context} 边类型"))?;
    match edge_type {
        1 => {
            let start = cursor.expect_point(10, &format!("{context} 直线起点"))?;
            let end = cursor.expect_point(11, &format!("{context} 直线终点"))?;
            Ok(HatchEdge::Line { start, end })
        }
        2 => {
            let center = cursor.expect_point(10, &format!("{context} 圆弧圆心"))?;
            let radius = cursor.expect_f64(40, &format!("{context} 圆弧半径"))?;
            let start = cursor.expect_f64(50, &format!("{context} 圆弧起始角"))?;
            let end = cursor.expect_f64(51, &format!("{context} 圆弧终止角"))?;
            let ccw = cursor.expect_i32(73, &format!("{context} 圆弧方向"))? != 0;
            Ok(HatchEdge::Arc {
                center,
                radius,
                start_angle: start.to_radians(),
                end_angle: end.to_radians(),
                is_counter_clockwise: ccw,
            })
        }
        3 => {
            let center = cursor.expect_point(10, &format!("{context} 椭圆中心"))?;
            let major = cursor.expect_point(11, &format!("{context} 椭圆主轴"))?;
            let ratio = cursor.expect_f64(40, &format!("{context} 椭圆轴比"))?;
            let start = cursor.expect_f64(50, &format!("{context} 椭圆起始角"))?;
            let end = cursor.expect_f64(51, &format!("{context} 椭圆终止角"))?;
            let ccw = cursor.expect_i32(73, &format!("{context} 椭圆方向"))? != 0;
            Ok(HatchEdge::Ellipse {
                center,
                major_axis: Vector2::new(major.x(), major.y()),
                ratio,
                start_angle: start.to_radians(),
                end_angle: end.to_radians(),
                is_counter_clockwise: ccw,
            })
        }
        4 => {
            let degree = cursor.expect_i32(94, &format!("{context} 样条阶数"))?;
            let rational = cursor.expect_i32(73, &format!("{context} 样条有理标记"))? != 0;
            cursor.expect_i32(74, &format!("{context} 样条周期标记"))?;
            let knot_count = cursor.expect_i32(95, &format!("{context} 样条节点数量"))?;
            let control_count = cursor.expect_i32(96, &format!("{context} 样条控制点数量"))?;
            let mut knot_values = Vec::new();
            for _ in 0..knot_count.max(0) {
                knot_values.push(cursor.expect_f64(40, &format!("{context} 样条节点"))?);
            }
            let mut control_points = Vec::new();
            for _ in 0..control_count.max(0) {
                control_points.push(cursor.expect_point(10, &format!("{context} 样条控制点"))?);
                if rational && cursor.peek_code() == Some(42) {
                    cursor.advance();
                }
            }
            if cursor.peek_code() == Some(97) {
                cursor.advance();
                while cursor.peek_code() == Some(11) {
                    cursor.expect_point(11, &format!("{context} 样条拟合点"))?;
                }
            }
            for tangent_code in [12, 13] {
                if cursor.peek_code() == Some(tangent_code) {
                    cursor.expect_point(tangent_code, &format!("{context} 样条切向"))?;
                }
            }
            Ok(HatchEdge::Spline {
                degree,
                control_points,
                knot_values,
            })
        }
        other => Err(DxfError::invalid(format!("{context} 未知的边类型 {other}"))),
    }
}

fn decode_leader(record: &Record) -> Result<EntityData, DxfError> {
    let mut vertices = Vec::new();
    let mut pending_x: Option<f64> = None;
    for tag in record.tags() {
        match tag.code {
            10 => pending_x = Some(parse_f64(&tag.value, "LEADER 顶点 X（组码 10）")?),
            20 => {
                let x = pending_x
                    .take()
                    .ok_or_else(|| DxfError::invalid("LEADER 顶点 Y 之前缺少 X（组码 10）"))?;
                let y = parse_f64(&tag.value, "LEADER 顶点 Y（组码 20）")?;
                vertices.push(Point2::new(x, y));
            }
            _ => {}
        }
    }
    Ok(EntityData::Leader(Leader { vertices }))
}

fn decode_3dface(record: &Record) -> Result<EntityData, DxfError> {
    let mut vx = [None; 4];
    let mut vy = [None; 4];
    let mut vz = [None; 4];
    for tag in record.tags() {
        match tag.code {
            10..=13 => {
                let slot = (tag.code - 10) as usize;
                assign_coord(&mut vx[slot], &tag.value, "3DFACE 顶点 X（组码 10-13）")?;
            }
            20..=23 => {
                let slot = (tag.code - 20) as usize;
                assign_coord(&mut vy[slot], &tag.value, "3DFACE 顶点 Y（组码 20-23）")?;
            }
            30..=33 => {
                let slot = (tag.code - 30) as usize;
                assign_coord(&mut vz[slot], &tag.value, "3DFACE 顶点 Z（组码 30-33）")?;
            }
            _ => {}
        }
    }

    let v1 = build_face_vertex(1, vx[0], vy[0], vz[0])?
        .ok_or_else(|| DxfError::invalid("3DFACE 缺少第 1 个顶点"))?;
    let v2 = build_face_vertex(2, vx[1], vy[1], vz[1])?
        .ok_or_else(|| DxfError::invalid("3DFACE 缺少第 2 个顶点"))?;
    let v3 = build_face_vertex(3, vx[2], vy[2], vz[2])?
        .ok_or_else(|| DxfError::invalid("3DFACE 缺少第 3 个顶点"))?;
    let v4 = build_face_vertex(4, vx[3], vy[3], vz[3])?.unwrap_or(v3);
    Ok(EntityData::Face3D(ThreeDFace {
        vertices: [v1, v2, v3, v4],
    }))
}

fn decode_solid(kind: &str, record: &Record) -> Result<EntityData, DxfError> {
    let mut vx = [None; 4];
    let mut vy = [None; 4];
    for tag in record.tags() {
        match tag.code {
            10..=13 => {
                let slot = (tag.code - 10) as usize;
                assign_coord(&mut vx[slot], &tag.value, &format!("{kind} 顶点 X"))?;
            }
            20..=23 => {
                let slot = (tag.code - 20) as usize;
                assign_coord(&mut vy[slot], &tag.value, &format!("{kind} 顶点 Y"))?;
            }
            _ => {}
        }
    }
    let mut vertices = [Point2::new(0.0, 0.0); 4];
    for slot in 0..3 {
        let (Some(x), Some(y)) = (vx[slot], vy[slot]) else {
            return Err(DxfError::invalid(format!("{kind} 缺少第 {} 个顶点", slot + 1)));
        };
        vertices[slot] = Point2::new(x, y);
    }
    vertices[3] = match (vx[3], vy[3]) {
        (Some(x), Some(y)) => Point2::new(x, y),
        _ => vertices[2],
    };
    Ok(EntityData::Solid(Solid { vertices }))
}

fn decode_raster_frame(kind: &str, record: &Record) -> Result<RasterFrame, DxfError> {
    let mut insert = [None, None];
    let mut u_vector = [None, None];
    let mut v_vector = [None, None];
    let mut size = [None, None];
    let mut clip_type = 1;
    let mut clip_boundary = Vec::new();
    let mut pending_x: Option<f64> = None;
    for tag in record.tags() {
        match tag.code {
            10 => assign_coord(&mut insert[0], &tag.value, &format!("{kind} 插入点 X"))?,
            20 => assign_coord(&mut insert[1], &tag.value, &format!("{kind} 插入点 Y"))?,
            11 => assign_coord(&mut u_vector[0], &tag.value, &format!("{kind} U 向量 X"))?,
            21 => assign_coord(&mut u_vector[1], &tag.value, &format!("{kind} U 向量 Y"))?,
            12 => assign_coord(&mut v_vector[0], &tag.value, &format!("{kind} V 向量 X"))?,
            22 => assign_coord(&mut v_vector[1], &tag.value, &format!("{kind} V 向量 Y"))?,
            13 => assign_coord(&mut size[0], &tag.value, &format!("{kind} 像素宽度"))?,
            23 => assign_coord(&mut size[1], &tag.value, &format!("{kind} 像素高度"))?,
            71 => clip_type = parse_i32(&tag.value, &format!("{kind} 裁剪类型（组码 71）"))?,
            14 => pending_x = Some(parse_f64(&tag.value, &format!("{kind} 裁剪顶点 X"))?),
            24 => {
                let x = pending_x
                    .take()
                    .ok_or_else(|| DxfError::invalid(format!("{kind} 裁剪顶点 Y 之前缺少 X")))?;
                let y = parse_f64(&tag.value, &format!("{kind} 裁剪顶点 Y"))?;
                clip_boundary.push(Point2::new(x, y));
            }
            _ => {}
        }
    }
    let required = |pair: [Option<f64>; 2], what: &str| -> Result<(f64, f64), DxfError> {
        match pair {
            [Some(x), Some(y)] => Ok((x, y)),
            _ => Err(DxfError::invalid(format!("{kind} 缺少{what}"))),
        }
    };
    let (ix, iy) = required(insert, "插入点（组码 10/20）")?;
    let (ux, uy) = required(u_vector, " U 向量（组码 11/21）")?;
    let (vx, vy) = required(v_vector, " V 向量（组码 12/22）")?;
    let (width, height) = required(size, "像素尺寸（组码 13/23）")?;
    // 矩形裁剪只记录对角两点；多边形裁剪末尾重复首点
    if clip_type == 2 && clip_boundary.len() > 2 && clip_boundary.first() == clip_boundary.last() {
        clip_boundary.pop();
    }
    Ok(RasterFrame {
        insert: Point2::new(ix, iy),
        u_vector: Vector2::new(ux, uy),
        v_vector: Vector2::new(vx, vy),
        image_size: Vector2::new(width, height),
        clip_boundary,
    })
}

fn decode_viewport(record: &Record) -> Result<EntityData, DxfError> {
    let mut center = [None, None];
    let mut view_center = [None, None];
    let mut width = 0.0;
    let mut height = 0.0;
    let mut view_height = 0.0;
    let mut id = 0;
    for tag in record.tags() {
        match tag.code {
            10 => assign_coord(&mut center[0], &tag.value, "VIEWPORT 中心 X（组码 10）")?,
            20 => assign_coord(&mut center[1], &tag.value, "VIEWPORT 中心 Y（组码 20）")?,
            12 => assign_coord(&mut view_center[0], &tag.value, "VIEWPORT 视图中心 X（组码 12）")?,
            22 => assign_coord(&mut view_center[1], &tag.value, "VIEWPORT 视图中心 Y（组码 22）")?,
            40 => width = parse_f64(&tag.value, "VIEWPORT 宽度（组码 40）")?,
            41 => height = parse_f64(&tag.value, "VIEWPORT 高度（组码 41）")?,
            45 => view_height = parse_f64(&tag.value, "VIEWPORT 视图高度（组码 45）")?,
            69 => id = parse_i32(&tag.value, "VIEWPORT 编号（组码 69）")?,
            _ => {}
        }
    }
    Ok(EntityData::Viewport(Viewport {
        center: Point2::new(center[0].unwrap_or(0.0), center[1].unwrap_or(0.0)),
        width,
        height,
        view_center: Point2::new(view_center[0].unwrap_or(0.0), view_center[1].unwrap_or(0.0)),
        view_height,
        id,
    }))
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn build_face_vertex(
    index: usize,
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
) -> Result<Option<Point3>, DxfError> {
    match (x, y, z) {
        (None, None, None) => Ok(None),
        (Some(x), Some(y), z) => Ok(Some(Point3::new(x, y, z.unwrap_or(0.0)))),
        _ => Err(DxfError::invalid(format!(
            "3DFACE 顶点 {index} 缺少完整的 XY 坐标"
        ))),
    }
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}

/// MTEXT 内联格式转纯文本：换行、不换行空格与堆叠分数。
fn decode_inline_text(raw: &str) -> String {
    let mut result = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('P') | Some('p') => result.push('\n'),
                Some('~') => result.push(' '),
                Some('\\') => result.push('\\'),
                Some('{') => result.push('{'),
                Some('}') => result.push('}'),
                Some('S') | Some('s') => {
                    for next in chars.by_ref() {
                        if next == ';' {
                            break;
                        }
                        result.push(if next == '^' || next == '#' { '/' } else { next });
                    }
                }
                // 字体、颜色、高度等带参数的格式码以分号结束
                Some('f') | Some('F') | Some('H') | Some('h') | Some('C') | Some('c')
                | Some('T') | Some('t') | Some('Q') | Some('q') | Some('W') | Some('w')
                | Some('A') | Some('a') => {
                    for next in chars.by_ref() {
                        if next == ';' {
                            break;
                        }
                    }
                }
                Some('L') | Some('l') | Some('O') | Some('o') | Some('K') | Some('k') => {}
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            },
            '{' | '}' => {}
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tags: &[(i32, &str)]) -> Record {
        Record::new(tags.iter().map(|(code, value)| Tag::new(*code, *value)).collect())
    }

    #[test]
    fn lwpolyline_bulge_attaches_to_previous_vertex() {
        let source = record(&[
            (0, "LWPOLYLINE"),
            (5, "2A"),
            (8, "OUTLINE"),
            (90, "3"),
            (70, "1"),
            (10, "0.0"),
            (20, "0.0"),
            (42, "0.5"),
            (10, "4.0"),
            (20, "0.0"),
            (10, "4.0"),
            (20, "3.0"),
        ]);
        let entities = decode_entities(&[source]).expect("decode");
        assert_eq!(entities.len(), 1);
        let entity = &entities[0];
        assert_eq!(entity.handle(), Some("2A"));
        assert_eq!(entity.layer, "OUTLINE");
        assert_eq!(entity.tags.len(), 12);
        match &entity.data {
            EntityData::Polyline(polyline) => {
                assert!(polyline.is_closed);
                assert_eq!(polyline.flavor, PolylineFlavor::Lightweight);
                assert_eq!(polyline.vertices.len(), 3);
                assert!((polyline.vertices[0].bulge - 0.5).abs() < 1e-12);
                assert!(polyline.vertices[1].bulge.abs() < 1e-12);
            }
            other => panic!("expected polyline, got {other:?}"),
        }
    }

    #[test]
    fn polyline_sequence_consumes_vertices() {
        let records = vec![
            record(&[(0, "POLYLINE"), (5, "40"), (70, "8")]),
            record(&[(0, "VERTEX"), (5, "41"), (10, "0"), (20, "0"), (30, "1"), (70, "32")]),
            record(&[(0, "VERTEX"), (5, "42"), (10, "5"), (20, "0"), (30, "2"), (70, "32")]),
            record(&[(0, "SEQEND"), (5, "43")]),
            record(&[(0, "POINT"), (5, "44"), (10, "1"), (20, "1")]),
        ];
        let entities = decode_entities(&records).expect("decode");
        assert_eq!(entities.len(), 2);
        match &entities[0].data {
            EntityData::Polyline(polyline) => {
                assert_eq!(polyline.flavor, PolylineFlavor::ThreeD);
                assert_eq!(polyline.vertices.len(), 2);
            }
            other => panic!("expected polyline, got {other:?}"),
        }
        assert!(matches!(entities[1].data, EntityData::Point(_)));
    }

    #[test]
    fn polygon_mesh_becomes_quad_faces() {
        let mut records = vec![record(&[
            (0, "POLYLINE"),
            (70, "16"),
            (71, "2"),
            (72, "3"),
        ])];
        for row in 0..2 {
            for column in 0..3 {
                let x = column.to_string();
                let y = row.to_string();
                records.push(record(&[(0, "VERTEX"), (10, x.as_str()), (20, y.as_str()), (70, "64")]));
            }
        }
        records.push(record(&[(0, "SEQEND")]));
        let entities = decode_entities(&records).expect("decode");
        match &entities[0].data {
            EntityData::PolyfaceMesh(mesh) => {
                assert_eq!(mesh.vertices.len(), 6);
                assert_eq!(mesh.faces, vec![[1, 2, 5, 4], [2, 3, 6, 5]]);
            }
            other => panic!("expected mesh, got {other:?}"),
        }
    }

    #[test]
    fn hatch_polyline_and_edge_loops_are_decoded() {
        let source = record(&[
            (0, "HATCH"),
            (2, "SOLID"),
            (70, "1"),
            (91, "2"),
            (92, "2"),
            (72, "0"),
            (73, "1"),
            (93, "3"),
            (10, "0"),
            (20, "0"),
            (10, "2"),
            (20, "0"),
            (10, "2"),
            (20, "2"),
            (97, "0"),
            (92, "17"),
            (93, "2"),
            (72, "1"),
            (10, "0"),
            (20, "0"),
            (11, "1"),
            (21, "0"),
            (72, "2"),
            (10, "0"),
            (20, "0"),
            (40, "1"),
            (50, "0"),
            (51, "180"),
            (73, "1"),
            (97, "1"),
            (330, "1F"),
            (75, "0"),
            (98, "1"),
            (10, "5"),
            (20, "5"),
        ]);
        match decode_hatch(&source).expect("decode hatch") {
            EntityData::Hatch(hatch) => {
                assert!(hatch.solid_fill);
                assert_eq!(hatch.loops.len(), 2);
                assert_eq!(hatch.loops[1].edges.len(), 2);
                // 组码 92 原值保留，外部标记不因多段线位丢失
                assert_eq!(hatch.loops[0].flags, 2);
                assert!(hatch.loops[1].is_external());
                assert!(hatch.loops[1].is_outermost());
                assert!(!hatch.loops[0].is_external());
            }
            other => panic!("expected hatch, got {other:?}"),
        }
    }

    #[test]
    fn mirrored_extrusion_maps_ocs_to_wcs() {
        let records = vec![
            record(&[
                (0, "CIRCLE"),
                (5, "C1"),
                (10, "5.0"),
                (20, "0.0"),
                (40, "1.0"),
                (210, "0.0"),
                (220, "0.0"),
                (230, "-1.0"),
            ]),
            record(&[
                (0, "ARC"),
                (5, "C2"),
                (10, "0.0"),
                (20, "0.0"),
                (40, "1.0"),
                (50, "0.0"),
                (51, "90.0"),
                (230, "-1.0"),
            ]),
            record(&[
                (0, "LWPOLYLINE"),
                (5, "C3"),
                (90, "2"),
                (10, "1.0"),
                (20, "2.0"),
                (42, "0.5"),
                (10, "3.0"),
                (20, "2.0"),
                (230, "-1.0"),
            ]),
            record(&[(0, "LINE"), (5, "C4"), (10, "1"), (20, "0"), (11, "2"), (21, "0"), (230, "-1.0")]),
        ];
        let entities = decode_entities(&records).expect("decode");

        assert_eq!(entities[0].handle(), Some("C1"));
        match &entities[0].data {
            EntityData::Circle(circle) => {
                assert!((circle.center.x() + 5.0).abs() < 1e-12);
                assert!(circle.center.y().abs() < 1e-12);
                assert!((circle.radius - 1.0).abs() < 1e-12);
            }
            other => panic!("expected circle, got {other:?}"),
        }
        // OCS 中 0°..90° 的圆弧落在 WCS 第二象限
        match &entities[1].data {
            EntityData::Arc(arc) => {
                let start = arc.start_point();
                let end = arc.end_point();
                assert!(start.x().abs() < 1e-9 && (start.y() - 1.0).abs() < 1e-9);
                assert!((end.x() + 1.0).abs() < 1e-9 && end.y().abs() < 1e-9);
            }
            other => panic!("expected arc, got {other:?}"),
        }
        match &entities[2].data {
            EntityData::Polyline(polyline) => {
                assert!((polyline.vertices[0].position.x() + 1.0).abs() < 1e-12);
                assert!((polyline.vertices[0].bulge + 0.5).abs() < 1e-12);
            }
            other => panic!("expected polyline, got {other:?}"),
        }
        // LINE 坐标本身位于 WCS
        match &entities[3].data {
            EntityData::Line(line) => assert!((line.start.x() - 1.0).abs() < 1e-12),
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[test]
    fn hostile_mesh_counts_are_rejected() {
        let records = vec![
            record(&[(0, "POLYLINE"), (70, "16"), (71, "2147483647"), (72, "2147483647")]),
            record(&[(0, "VERTEX"), (10, "0"), (20, "0"), (70, "64")]),
            record(&[(0, "SEQEND")]),
        ];
        match decode_entities(&records) {
            Err(DxfError::Invalid { message }) => assert!(message.contains("POLYLINE 网格")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unknown_entity_is_kept_as_unsupported() {
        let entities = decode_entities(&[record(&[(0, "MESH"), (5, "77"), (8, "SOLIDS")])])
            .expect("decode");
        assert_eq!(entities[0].dxf_type(), "MESH");
        assert_eq!(entities[0].layer, "SOLIDS");
    }

    #[test]
    fn duplicate_line_coordinate_is_rejected() {
        let source = record(&[(0, "LINE"), (10, "0"), (10, "1"), (20, "0"), (11, "1"), (21, "1")]);
        match decode_entities(&[source]) {
            Err(DxfError::Invalid { message }) => assert!(message.contains("重复")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn mtext_inline_codes_are_stripped() {
        assert_eq!(decode_inline_text("{\\fArial;Hello}\\PWorld"), "Hello\nWorld");
        assert_eq!(decode_inline_text("1\\S1^2;"), "11/2");
    }
}
