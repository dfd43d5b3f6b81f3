use std::path::PathBuf;

use geo::{Area, Geometry};
use shapediff_core::document::Document;
use shapediff_engine::export::{block_catalogue, to_mapping};
use shapediff_engine::resolve::{FallbackCase, Origin, ResolveOptions, Resolver};
use shapediff_io::{DocumentLoader, DxfFacade};

fn load(name: &str) -> Document {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("shapediff-io")
        .join("tests")
        .join("data")
        .join(name);
    DxfFacade::new().load(&path).expect("加载测试图纸")
}

#[test]
fn modelspace_is_grouped_by_layer_and_origin() {
    let doc = load("entities.dxf");
    let resolver = Resolver::new(&doc, ResolveOptions::default());
    let mapping = to_mapping(&resolver, doc.modelspace());

    let keys: Vec<&str> = mapping.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        [
            "0",
            "BLOCK_INSERTS_OF_DOOR",
            "DIMS",
            "FAIL_CASE_DETAIL",
            "FILL",
            "MESH",
            "NOTES",
            "RASTER",
            "ROOMS",
            "WALLS",
        ]
    );
    assert_eq!(mapping["WALLS"].len(), 2);
    assert_eq!(mapping["NOTES"].len(), 2);
    // 块内的直线与圆弧位于图层 0
    assert_eq!(mapping["0"].len(), 2);
    assert_eq!(mapping["RASTER"].len(), 2);
    assert!(mapping["NOTES"].iter().all(|r| matches!(r.geometry, Geometry::Point(_))));
}

#[test]
fn block_insert_point_precedes_expanded_children() {
    let doc = load("entities.dxf");
    let resolver = Resolver::new(&doc, ResolveOptions::default());
    let insert = doc.entity_by_handle("22").expect("INSERT 22");
    let results: Vec<_> = resolver.resolve(insert).collect();
    assert_eq!(results.len(), 3);
    match (&results[0].geometry, &results[0].origin) {
        (Geometry::Point(point), Origin::BlockInsertion { block, .. }) => {
            assert_eq!((point.x(), point.y()), (20.0, 5.0));
            assert_eq!(block.name, "DOOR");
        }
        other => panic!("unexpected first result: {other:?}"),
    }
    // 直线 (0,0)-(0,1) 经 x 比例 2、旋转 90° 后指向 -x
    match &results[1].geometry {
        Geometry::LineString(line) => {
            assert!((line.0[0].x - 20.0).abs() < 1e-9 && (line.0[0].y - 5.0).abs() < 1e-9);
            assert!((line.0[1].x - 19.0).abs() < 1e-9 && (line.0[1].y - 5.0).abs() < 1e-9);
        }
        other => panic!("expected line, got {other:?}"),
    }
}

#[test]
fn degenerate_arc_is_recovered_by_radius_tier() {
    let doc = load("entities.dxf");
    let resolver = Resolver::new(&doc, ResolveOptions::default());
    let arc = doc.entity_by_handle("30").expect("ARC 30");
    let results: Vec<_> = resolver.resolve(arc).collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].origin.fail_case(), Some(FallbackCase::Radius));
    assert_eq!(FallbackCase::Radius.as_str(), "radius");
    match &results[0].geometry {
        Geometry::LineString(line) => assert!(line.0.len() > 2),
        other => panic!("expected line, got {other:?}"),
    }
}

#[test]
fn special_kinds_resolve_to_outlines() {
    let doc = load("entities.dxf");
    let resolver = Resolver::new(&doc, ResolveOptions::default());

    let mesh = doc.entity_by_handle("28").expect("POLYLINE 28");
    match resolver.resolve(mesh).next().map(|r| r.geometry) {
        Some(Geometry::MultiLineString(faces)) => assert_eq!(faces.0.len(), 2),
        other => panic!("expected face loops, got {other:?}"),
    }

    let viewport = doc.entity_by_handle("32").expect("VIEWPORT 32");
    match resolver.resolve(viewport).next().map(|r| r.geometry) {
        Some(Geometry::Polygon(extent)) => assert!((extent.unsigned_area() - 5000.0).abs() < 1e-6),
        other => panic!("expected extent polygon, got {other:?}"),
    }

    let hatch = doc.entity_by_handle("31").expect("HATCH 31");
    match resolver.resolve(hatch).next().map(|r| r.geometry) {
        Some(Geometry::Polygon(fill)) => assert!((fill.unsigned_area() - 4.0).abs() < 1e-9),
        other => panic!("expected fill polygon, got {other:?}"),
    }

    let unsupported = doc.entity_by_handle("33").expect("MESH 33");
    assert_eq!(resolver.resolve(unsupported).count(), 0);
}

fn extent(geometry: &Geometry<f64>) -> (f64, f64, f64, f64) {
    let Geometry::LineString(line) = geometry else {
        panic!("expected boundary line, got {geometry:?}");
    };
    assert!(line.is_closed());
    assert_eq!(line.0.len(), 5);
    line.0.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(x0, y0, x1, y1), c| (x0.min(c.x), y0.min(c.y), x1.max(c.x), y1.max(c.y)),
    )
}

#[test]
fn image_and_wipeout_resolve_to_closed_frames() {
    let doc = load("entities.dxf");
    let resolver = Resolver::new(&doc, ResolveOptions::default());

    let image = doc.entity_by_handle("34").expect("IMAGE 34");
    let results: Vec<_> = resolver.resolve(image).collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].origin, Origin::Entity(_)));
    assert_eq!(extent(&results[0].geometry), (100.0, 0.0, 104.0, 2.0));

    // 两点裁剪边界覆盖整幅像素，像素尺寸 0.5
    let wipeout = doc.entity_by_handle("35").expect("WIPEOUT 35");
    let results: Vec<_> = resolver.resolve(wipeout).collect();
    assert_eq!(results.len(), 1);
    assert_eq!(extent(&results[0].geometry), (200.0, 0.0, 202.0, 2.0));
}

#[test]
fn resolution_restarts_on_every_call() {
    let doc = load("entities.dxf");
    let resolver = Resolver::new(&doc, ResolveOptions::default());
    let dimension = doc.entity_by_handle("27").expect("DIMENSION 27");
    assert_eq!(resolver.resolve(dimension).count(), 1);
    assert_eq!(resolver.resolve(dimension).count(), 1);
}

#[test]
fn catalogue_reports_door_insert() {
    let doc = load("entities.dxf");
    let resolver = Resolver::new(&doc, ResolveOptions::default());
    let catalogue = block_catalogue(&resolver, &doc);
    assert_eq!(catalogue.len(), 1);
    let door = &catalogue[0];
    assert_eq!(door.name, "DOOR");
    assert_eq!(door.geometries.len(), 2);
    assert_eq!(door.inserts[0].handle.as_deref(), Some("22"));
    assert!((door.inserts[0].rotation - 90.0).abs() < 1e-9);
    assert_eq!(door.inserts[0].x_scale, 2.0);
    assert_eq!(door.inserts[0].y_scale, 1.0);
}
