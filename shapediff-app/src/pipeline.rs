use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glam::DAffine2;
use serde::Serialize;
use shapediff_config::{AppConfig, ConversionConfig, DiffConfig};
use shapediff_core::document::Document;
use shapediff_core::raw::SectionRole;
use shapediff_engine::delta::{DeltaKind, DeltaOptions, EntityDelta, entity_differences};
use shapediff_engine::export::{block_catalogue, export_rows, to_mapping};
use shapediff_engine::resolve::{FallbackToggles, ResolveOptions, Resolver};
use shapediff_engine::section_diff::{
    SectionDiff, document_differences, parse_roles, raw_differences,
};
use shapediff_io::{DocumentLoader, DxfFacade};
use tracing::info;

/// 配置中的转换参数映射为解析选项。仿射系数按 `[a, b, d, e, xoff, yoff]` 解释。
pub fn resolve_options(config: &ConversionConfig) -> ResolveOptions {
    ResolveOptions {
        step_size: config.step_size,
        precision: config.precision,
        transform: config
            .transform
            .map(|[a, b, d, e, x, y]| DAffine2::from_cols_array(&[a, d, b, e, x, y])),
        apply_transform: config.apply_transform,
        degenerate_radius: config.degenerate_radius,
        degenerate_step: config.degenerate_step,
        fallbacks: FallbackToggles {
            radius: config.fallbacks.radius,
            flattening: config.fallbacks.flattening,
            vertices: config.fallbacks.vertices,
        },
        max_block_depth: config.max_block_depth,
    }
}

pub fn delta_options(config: &DiffConfig) -> DeltaOptions {
    DeltaOptions {
        dilation: config.dilation,
        overlay_tolerance: config.overlay_tolerance,
        strict_pairing: config.strict_pairing,
    }
}

fn load(path: &Path) -> Result<Document> {
    DxfFacade::new()
        .load(path)
        .with_context(|| format!("加载 {} 失败", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("序列化 JSON 失败")?;
    fs::write(path, content).with_context(|| format!("写入 {} 失败", path.display()))?;
    info!(path = %path.display(), "已写出 JSON");
    Ok(())
}

pub fn convert(path: &Path, json: Option<&Path>, config: &AppConfig) -> Result<()> {
    let document = load(path)?;
    let resolver = Resolver::new(&document, resolve_options(&config.conversion));
    let mapping = to_mapping(&resolver, document.modelspace());
    for (key, items) in &mapping {
        println!("{key}\t{}", items.len());
    }
    info!(
        file = %path.display(),
        groups = mapping.len(),
        geometries = mapping.values().map(Vec::len).sum::<usize>(),
        "转换完成"
    );
    if let Some(out) = json {
        write_json(out, &export_rows(&mapping))?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct DiffReport<'a> {
    sections: BTreeMap<&'static str, &'a SectionDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entities: Option<&'a BTreeMap<String, EntityDelta>>,
}

fn print_sections(sections: &[(SectionRole, SectionDiff)]) {
    for (role, diff) in sections {
        println!(
            "{}\tcreated={} deleted={} modified={}",
            role.as_str(),
            diff.created.len(),
            diff.deleted.len(),
            diff.modified.len()
        );
    }
}

fn kind_label(kind: DeltaKind) -> &'static str {
    match kind {
        DeltaKind::New => "new",
        DeltaKind::Deleted => "deleted",
        DeltaKind::Modified => "modified",
    }
}

pub fn diff(
    old: &Path,
    new: &Path,
    json: Option<&Path>,
    raw: bool,
    config: &AppConfig,
) -> Result<()> {
    let precision = config.diff.field_precision();

    if raw {
        let facade = DxfFacade::new();
        let before = facade
            .load_sections(old)
            .with_context(|| format!("加载 {} 失败", old.display()))?;
        let after = facade
            .load_sections(new)
            .with_context(|| format!("加载 {} 失败", new.display()))?;
        let sections = raw_differences(&before, &after, precision);
        print_sections(&sections);
        if let Some(out) = json {
            let report = DiffReport {
                sections: sections.iter().map(|(role, diff)| (role.as_str(), diff)).collect(),
                entities: None,
            };
            write_json(out, &report)?;
        }
        return Ok(());
    }

    let before = load(old)?;
    let after = load(new)?;
    let roles = parse_roles(&config.diff.sections);
    let sections = document_differences(&before, &after, &roles, precision);
    print_sections(&sections);

    let entities = match sections.iter().find(|(role, _)| *role == SectionRole::Entities) {
        Some((_, diff)) => entity_differences(
            &before,
            &after,
            diff,
            &resolve_options(&config.conversion),
            &delta_options(&config.diff),
        )
        .context("计算实体几何差异失败")?,
        None => BTreeMap::new(),
    };
    for (handle, delta) in &entities {
        println!(
            "{handle}\t{}\tadded={} remaining={} removed={}",
            kind_label(delta.kind),
            delta.added.len() + delta.new_geometry.len(),
            delta.remaining.len(),
            delta.removed.len() + delta.deleted_geometry.len()
        );
    }

    if let Some(out) = json {
        let report = DiffReport {
            sections: sections.iter().map(|(role, diff)| (role.as_str(), diff)).collect(),
            entities: Some(&entities),
        };
        write_json(out, &report)?;
    }
    Ok(())
}

pub fn blocks(path: &Path, json: Option<&Path>, config: &AppConfig) -> Result<()> {
    let document = load(path)?;
    let resolver = Resolver::new(&document, resolve_options(&config.conversion));
    let catalogue = block_catalogue(&resolver, &document);
    for entry in &catalogue {
        println!(
            "{}\tgeometries={} inserts={}",
            entry.name,
            entry.geometries.len(),
            entry.inserts.len()
        );
    }
    if let Some(out) = json {
        write_json(out, &catalogue)?;
    }
    Ok(())
}
