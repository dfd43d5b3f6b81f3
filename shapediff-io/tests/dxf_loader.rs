use std::path::PathBuf;

use serde_json::json;
use shapediff_core::document::{EntityData, EntityKind, PolylineFlavor};
use shapediff_core::raw::SectionRole;
use shapediff_io::{DocumentLoader, DxfFacade, IoError};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn load_entities_fixture_decodes_every_kind() {
    let doc = DxfFacade::new()
        .load(&fixture("entities.dxf"))
        .expect("读取 entities.dxf 失败");

    let kinds: Vec<&str> = doc.entities().map(|entity| entity.dxf_type()).collect();
    assert_eq!(
        kinds,
        vec![
            "LINE", "CIRCLE", "LWPOLYLINE", "INSERT", "TEXT", "MTEXT", "DIMENSION", "POLYLINE",
            "ARC", "HATCH", "VIEWPORT", "MESH", "IMAGE", "WIPEOUT",
        ]
    );

    let line = doc.entity_by_handle("1F").expect("未找到句柄 1F");
    assert_eq!(line.layer, "WALLS");
    assert_eq!(line.tags.len(), 11);
    assert_eq!(line.tags[0].value, "LINE");

    let mesh = doc.entity_by_handle("33").expect("未找到句柄 33");
    assert_eq!(mesh.kind(), EntityKind::Unsupported);

    let wipeout = doc.entity_by_handle("35").expect("未找到句柄 35");
    assert_eq!(wipeout.kind(), EntityKind::Image);
    match &wipeout.data {
        EntityData::Wipeout(frame) => assert_eq!(frame.clip_boundary.len(), 2),
        other => panic!("期望 WIPEOUT，实际为 {other:?}"),
    }
}

#[test]
fn insert_absorbs_attributes_and_block_skips_attdef() {
    let doc = DxfFacade::new()
        .load(&fixture("entities.dxf"))
        .expect("读取 entities.dxf 失败");

    assert!(doc.entity_by_handle("23").is_none(), "ATTRIB 不应成为独立实体");
    let door = doc.block("DOOR").expect("缺少 DOOR 块");
    assert_eq!(door.entities.len(), 2);
    assert_eq!(door.handle.as_deref(), Some("40"));
    assert!(doc.block("*D1").expect("缺少 *D1 块").is_anonymous());

    let insert = doc.entity_by_handle("22").expect("未找到 INSERT");
    match &insert.data {
        EntityData::BlockReference(reference) => {
            assert_eq!(reference.name, "DOOR");
            assert!((reference.scale.x() - 2.0).abs() < 1e-12);
            assert!((reference.scale.y() - 1.0).abs() < 1e-12);
            assert!((reference.rotation - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        }
        other => panic!("期望块参照，实际为 {other:?}"),
    }
    // 块内实体同样登记在句柄索引中
    assert!(doc.entity_by_handle("41").is_some());
    assert_eq!(doc.virtual_entities(insert).len(), 2);
}

#[test]
fn polyface_polyline_collects_positions_and_faces() {
    let doc = DxfFacade::new()
        .load(&fixture("entities.dxf"))
        .expect("读取 entities.dxf 失败");
    let entity = doc.entity_by_handle("28").expect("未找到多面网格");
    assert_eq!(entity.kind(), EntityKind::PolyfaceMesh);
    match &entity.data {
        EntityData::PolyfaceMesh(mesh) => {
            assert_eq!(mesh.vertices.len(), 4);
            assert_eq!(mesh.faces, vec![[1, 2, 3, 0], [1, 3, -4, 0]]);
            assert_eq!(mesh.face_vertices()[1].len(), 3);
        }
        other => panic!("期望多面网格，实际为 {other:?}"),
    }
}

#[test]
fn text_and_hatch_content_survive_decoding() {
    let doc = DxfFacade::new()
        .load(&fixture("entities.dxf"))
        .expect("读取 entities.dxf 失败");

    match &doc.entity_by_handle("26").expect("未找到 MTEXT").data {
        EntityData::MText(mtext) => {
            assert_eq!(mtext.content, "Line1\nLine2");
            assert!(mtext.rotation.abs() < 1e-12);
        }
        other => panic!("期望 MTEXT，实际为 {other:?}"),
    }

    match &doc.entity_by_handle("21").expect("未找到 LWPOLYLINE").data {
        EntityData::Polyline(polyline) => {
            assert!(polyline.is_closed);
            assert_eq!(polyline.flavor, PolylineFlavor::Lightweight);
            assert_eq!(polyline.vertices.len(), 4);
        }
        other => panic!("期望多段线，实际为 {other:?}"),
    }

    let hatch = doc.entity_by_handle("31").expect("未找到 HATCH");
    let value = serde_json::to_value(&hatch.data).expect("序列化 HATCH 失败");
    assert_eq!(value["Hatch"]["pattern_name"], json!("SOLID"));
    assert_eq!(value["Hatch"]["solid_fill"], json!(true));
    assert_eq!(value["Hatch"]["loops"].as_array().map(Vec::len), Some(1));
}

#[test]
fn viewport_in_paper_space_is_excluded_from_modelspace() {
    let doc = DxfFacade::new()
        .load(&fixture("entities.dxf"))
        .expect("读取 entities.dxf 失败");
    let viewport = doc.entity_by_handle("32").expect("未找到视口");
    assert!(viewport.paper_space);
    assert!(doc.modelspace().all(|entity| entity.handle() != Some("32")));
    assert_eq!(doc.modelspace().count(), doc.entities().count() - 1);
}

#[test]
fn raw_sections_keep_every_record() {
    let sections = DxfFacade::new()
        .load_sections(&fixture("revision_a.dxf"))
        .expect("读取原始段失败");
    let roles: Vec<Option<SectionRole>> = sections.iter().map(|section| section.role()).collect();
    assert_eq!(
        roles,
        vec![
            Some(SectionRole::Header),
            Some(SectionRole::Tables),
            Some(SectionRole::Blocks),
            Some(SectionRole::Entities),
            Some(SectionRole::Objects),
        ]
    );

    let tables = &sections[1];
    let dimstyle = tables
        .records()
        .iter()
        .find(|record| record.kind() == "DIMSTYLE")
        .expect("缺少 DIMSTYLE 表项");
    assert_eq!(dimstyle.handle(), Some("27"));
    assert_eq!(sections[0].records()[0].kind(), "");
    assert_eq!(sections[3].records().len(), 6);
}

#[test]
fn missing_file_reports_path() {
    let path = fixture("does_not_exist.dxf");
    match DxfFacade::new().load(&path) {
        Err(IoError::ReadError { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("期望读取错误，实际为 {other:?}"),
    }
}

#[test]
fn binary_dxf_is_rejected() {
    let err = DxfFacade::new()
        .parse("AutoCAD Binary DXF\r\n\u{1a}\0")
        .expect_err("二进制 DXF 应被拒绝");
    assert!(matches!(err, IoError::UnsupportedFeature(_)));
}
