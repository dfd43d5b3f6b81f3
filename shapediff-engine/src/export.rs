//! 导出映射：按图层、块插入和回退类别对解析结果分组，并整理块目录。

use std::collections::BTreeMap;

use geo::{Geometry, Point};
use serde::Serialize;
use shapediff_core::document::{Document, Entity, EntityData};
use tracing::{debug, info};

use crate::resolve::{Origin, Resolved, Resolver};
use crate::shape;

pub const BLOCK_INSERTS_PREFIX: &str = "BLOCK_INSERTS_OF_";
pub const FAIL_CASE_PREFIX: &str = "FAIL_CASE_";

/// 结果所属的分组键。
pub fn mapping_key(resolved: &Resolved) -> String {
    match &resolved.origin {
        Origin::Entity(entity) => entity.layer.clone(),
        Origin::BlockInsertion { block, .. } => format!("{BLOCK_INSERTS_PREFIX}{}", block.name),
        Origin::FailCase { entity, .. } => format!("{FAIL_CASE_PREFIX}{}", entity.layer),
    }
}

/// 解析一组实体并按键分组。来源为实体本身的几何会先清理，清理后为空则丢弃。
pub fn to_mapping<'a, I>(resolver: &Resolver<'_>, entities: I) -> BTreeMap<String, Vec<Resolved>>
where
    I: IntoIterator<Item = &'a Entity>,
{
    let mut mapping: BTreeMap<String, Vec<Resolved>> = BTreeMap::new();
    for entity in entities {
        for resolved in resolver.resolve(entity) {
            let Some(resolved) = cleaned(resolved) else {
                continue;
            };
            mapping.entry(mapping_key(&resolved)).or_default().push(resolved);
        }
    }
    mapping
}

fn cleaned(resolved: Resolved) -> Option<Resolved> {
    if !matches!(resolved.origin, Origin::Entity(_)) {
        return Some(resolved);
    }
    let Resolved { geometry, origin } = resolved;
    match shape::clean(geometry) {
        Some(geometry) => Some(Resolved { geometry, origin }),
        None => {
            debug!(handle = ?origin.entity().handle(), "清理后几何为空，丢弃");
            None
        }
    }
}

/// 导出行：图层、几何与附带文本。
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub layer: String,
    pub handle: Option<String>,
    pub geometry: Geometry<f64>,
    pub text: String,
}

impl ExportRow {
    pub fn from_resolved(layer: &str, resolved: &Resolved) -> Self {
        let entity = resolved.origin.entity();
        Self {
            layer: layer.to_string(),
            handle: entity.handle().map(str::to_string),
            geometry: resolved.geometry.clone(),
            text: row_text(entity),
        }
    }
}

/// 文字取内容，块参照取旋转与比例，其余为空。
pub fn row_text(entity: &Entity) -> String {
    match &entity.data {
        EntityData::Text(text) => text.content.clone(),
        EntityData::MText(text) => text.content.clone(),
        EntityData::BlockReference(reference) => format!(
            "rotation={} xs={} ys={} zs={}",
            reference.rotation.to_degrees(),
            reference.scale.x(),
            reference.scale.y(),
            reference.z_scale
        ),
        _ => String::new(),
    }
}

/// 映射展开为逐行导出记录。
pub fn export_rows(mapping: &BTreeMap<String, Vec<Resolved>>) -> Vec<ExportRow> {
    mapping
        .iter()
        .flat_map(|(layer, items)| {
            items
                .iter()
                .map(move |resolved| ExportRow::from_resolved(layer, resolved))
        })
        .collect()
}

/// 模型空间中的一次块插入。
#[derive(Debug, Clone, Serialize)]
pub struct BlockPointInsert {
    pub handle: Option<String>,
    pub layer: String,
    pub location: Point<f64>,
    /// 旋转角（度）。
    pub rotation: f64,
    pub x_scale: f64,
    pub y_scale: f64,
    pub z_scale: f64,
}

impl BlockPointInsert {
    fn from_entity(entity: &Entity) -> Option<Self> {
        let EntityData::BlockReference(reference) = &entity.data else {
            return None;
        };
        Some(Self {
            handle: entity.handle().map(str::to_string),
            layer: entity.layer.clone(),
            location: Point::new(reference.insert.x(), reference.insert.y()),
            rotation: reference.rotation.to_degrees(),
            x_scale: reference.scale.x(),
            y_scale: reference.scale.y(),
            z_scale: reference.z_scale,
        })
    }

    /// 仿射系数 `[a, b, d, e, xoff, yoff]`。
    pub fn transformation(&self) -> [f64; 6] {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        [
            self.x_scale * cos,
            -self.y_scale * sin,
            self.x_scale * sin,
            self.y_scale * cos,
            self.location.x(),
            self.location.y(),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockEntry {
    pub name: String,
    pub geometries: Vec<Geometry<f64>>,
    pub inserts: Vec<BlockPointInsert>,
}

/// 块目录：只包含在模型空间中被插入过的块。
pub fn block_catalogue(resolver: &Resolver<'_>, document: &Document) -> Vec<BlockEntry> {
    let mut inserts: BTreeMap<&str, Vec<BlockPointInsert>> = BTreeMap::new();
    for entity in document.modelspace() {
        if let (EntityData::BlockReference(reference), Some(insert)) =
            (&entity.data, BlockPointInsert::from_entity(entity))
        {
            inserts.entry(reference.name.as_str()).or_default().push(insert);
        }
    }

    let mut catalogue = Vec::new();
    for block in document.blocks() {
        let Some(points) = inserts.remove(block.name.as_str()) else {
            continue;
        };
        let mut geometries = Vec::new();
        for entity in &block.entities {
            if matches!(entity.data, EntityData::BlockReference(_)) {
                info!(block = %block.name, "块内嵌套插入不展开到块目录");
                continue;
            }
            for resolved in resolver.resolve(entity) {
                if let Origin::Entity(_) = resolved.origin {
                    geometries.extend(shape::clean(resolved.geometry));
                }
            }
        }
        catalogue.push(BlockEntry {
            name: block.name.clone(),
            geometries,
            inserts: points,
        });
    }
    catalogue
}
