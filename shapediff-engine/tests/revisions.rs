use std::path::PathBuf;

use geo::{Area, Geometry, LineString};
use shapediff_core::document::Document;
use shapediff_core::raw::SectionRole;
use shapediff_engine::delta::{DeltaKind, DeltaOptions, entity_differences};
use shapediff_engine::resolve::ResolveOptions;
use shapediff_engine::section_diff::{
    SectionDiff, document_differences, parse_roles, raw_differences,
};
use shapediff_io::{DocumentLoader, DxfFacade};

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("shapediff-io")
        .join("tests")
        .join("data")
        .join(name)
}

fn load(name: &str) -> Document {
    DxfFacade::new().load(&data(name)).expect("加载测试图纸")
}

fn entities_diff(before: &Document, after: &Document) -> SectionDiff {
    let roles = parse_roles(&["ENTITIES", "TABLES"]);
    document_differences(before, after, &roles, Some(6))
        .into_iter()
        .find(|(role, _)| *role == SectionRole::Entities)
        .map(|(_, diff)| diff)
        .expect("ENTITIES 差异")
}

fn run_length(lines: &[LineString<f64>]) -> f64 {
    lines
        .iter()
        .flat_map(|line| line.lines())
        .map(|segment| segment.dx().hypot(segment.dy()))
        .sum()
}

fn area(geometries: &[Geometry<f64>]) -> f64 {
    geometries.iter().map(|g| g.unsigned_area()).sum()
}

#[test]
fn revisions_report_created_deleted_and_modified_handles() {
    let before = load("revision_a.dxf");
    let after = load("revision_b.dxf");
    let diff = entities_diff(&before, &after);

    assert_eq!(diff.created, ["54"]);
    assert_eq!(diff.deleted, ["52"]);
    let modified: Vec<&str> = diff.modified.iter().map(|(h, _)| h.as_str()).collect();
    assert_eq!(modified, ["50", "55"]);
    // 句柄 0 不参与比对
    assert!(!diff.created.iter().chain(&diff.deleted).any(|h| h == "0"));
    assert!(!modified.contains(&"0"));

    let (_, line_fields) = &diff.modified[0];
    assert!(!line_fields.replace.is_empty());
}

#[test]
fn table_records_are_compared_by_handle() {
    let before = load("revision_a.dxf");
    let after = load("revision_b.dxf");
    let roles = parse_roles(&["TABLES"]);
    let sections = document_differences(&before, &after, &roles, None);
    assert_eq!(sections.len(), 1);
    let (role, diff) = &sections[0];
    assert_eq!(*role, SectionRole::Tables);
    let modified: Vec<&str> = diff.modified.iter().map(|(h, _)| h.as_str()).collect();
    assert_eq!(modified, ["11"]);
}

#[test]
fn identical_revisions_have_no_differences() {
    let sections = DxfFacade::new()
        .load_sections(&data("revision_a.dxf"))
        .expect("读取原始段");
    let diffs = raw_differences(&sections, &sections, Some(6));
    assert!(!diffs.is_empty());
    assert!(diffs.iter().all(|(_, diff)| diff.is_empty()));
}

#[test]
fn geometry_deltas_follow_section_diff() {
    let before = load("revision_a.dxf");
    let after = load("revision_b.dxf");
    let diff = entities_diff(&before, &after);
    let deltas = entity_differences(
        &before,
        &after,
        &diff,
        &ResolveOptions::default(),
        &DeltaOptions::default(),
    )
    .expect("几何差异");

    let keys: Vec<&str> = deltas.keys().map(String::as_str).collect();
    assert_eq!(keys, ["50", "52", "54", "55"]);

    let room = &deltas["55"];
    assert_eq!(room.kind, DeltaKind::Modified);
    assert!((area(&room.added) - 8.0).abs() < 1e-9);
    assert!((area(&room.remaining) - 16.0).abs() < 1e-9);
    assert!(room.removed.is_empty());

    let wall = &deltas["50"];
    let extension: f64 = wall
        .added
        .iter()
        .map(|g| match g {
            Geometry::MultiLineString(lines) => run_length(&lines.0),
            Geometry::LineString(line) => run_length(std::slice::from_ref(line)),
            _ => 0.0,
        })
        .sum();
    assert!((extension - 2.0).abs() < 1e-3);

    let created = &deltas["54"];
    assert_eq!(created.kind, DeltaKind::New);
    assert_eq!(created.new_geometry.len(), 1);
    assert!(created.diff_buffer.is_some());

    let deleted = &deltas["52"];
    assert_eq!(deleted.kind, DeltaKind::Deleted);
    assert!((area(&deleted.deleted_geometry) - 16.0).abs() < 1e-9);
    let envelope = deleted.diff_buffer.as_ref().expect("包络");
    assert!(envelope.unsigned_area() > 16.0);
}
