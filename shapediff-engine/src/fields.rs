//! 原始组码编译为带类型的字段，供结构比对使用。

use std::hash::{Hash, Hasher};

use serde::Serialize;
use shapediff_core::raw::Tag;

use crate::flatten::round_to;

/// 字段值。浮点按位比较，`-0.0` 与 `0.0` 视为相同。
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Point(Vec<f64>),
}

fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => canonical_bits(*a) == canonical_bits(*b),
            (FieldValue::Point(a), FieldValue::Point(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| canonical_bits(*x) == canonical_bits(*y))
            }
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FieldValue::Text(text) => text.hash(state),
            FieldValue::Int(value) => value.hash(state),
            FieldValue::Float(value) => canonical_bits(*value).hash(state),
            FieldValue::Point(components) => {
                for component in components {
                    canonical_bits(*component).hash(state);
                }
            }
        }
    }
}

/// 带组码的字段；点字段使用 X 分量的组码。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Field {
    pub code: i32,
    pub value: FieldValue,
}

impl Field {
    pub fn new(code: i32, value: FieldValue) -> Self {
        Self { code, value }
    }

    pub fn float(code: i32, value: f64) -> Self {
        Self::new(code, FieldValue::Float(value))
    }

    pub fn text(code: i32, value: impl Into<String>) -> Self {
        Self::new(code, FieldValue::Text(value.into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueType {
    Text,
    Int,
    Float,
}

fn value_type(code: i32) -> ValueType {
    match code {
        10..=59 | 110..=149 | 210..=239 | 460..=469 | 1010..=1059 => ValueType::Float,
        60..=99 | 160..=179 | 270..=289 | 370..=389 | 400..=409 | 420..=429 | 440..=459
        | 1060..=1071 => ValueType::Int,
        _ => ValueType::Text,
    }
}

fn is_point_x(code: i32) -> bool {
    matches!(code, 10..=18 | 110..=112 | 1010..=1013)
}

/// 按组码范围确定单个组码的类型；数值解析失败时保留文本。
pub fn typed_field(tag: &Tag) -> Field {
    let raw = tag.value.trim();
    let value = match value_type(tag.code) {
        ValueType::Float => raw
            .parse::<f64>()
            .map(FieldValue::Float)
            .unwrap_or_else(|_| FieldValue::Text(tag.value.clone())),
        ValueType::Int => raw
            .parse::<i64>()
            .map(FieldValue::Int)
            .unwrap_or_else(|_| FieldValue::Text(tag.value.clone())),
        ValueType::Text => FieldValue::Text(tag.value.clone()),
    };
    Field::new(tag.code, value)
}

/// 逐个组码转为字段，不合并坐标。
pub fn typed(tags: &[Tag]) -> Vec<Field> {
    tags.iter().map(typed_field).collect()
}

/// 编译组码序列：连续的 X/Y(/Z) 坐标合并为一个点字段。
pub fn compile(tags: &[Tag]) -> Vec<Field> {
    let mut fields = Vec::with_capacity(tags.len());
    let mut index = 0;
    while index < tags.len() {
        let tag = &tags[index];
        if is_point_x(tag.code) {
            if let Some((point, consumed)) = compile_point(&tags[index..]) {
                fields.push(Field::new(tag.code, FieldValue::Point(point)));
                index += consumed;
                continue;
            }
        }
        fields.push(typed_field(tag));
        index += 1;
    }
    fields
}

fn compile_point(tags: &[Tag]) -> Option<(Vec<f64>, usize)> {
    let x_tag = tags.first()?;
    let y_tag = tags.get(1).filter(|tag| tag.code == x_tag.code + 10)?;
    let x = x_tag.value.trim().parse::<f64>().ok()?;
    let y = y_tag.value.trim().parse::<f64>().ok()?;
    let z = tags
        .get(2)
        .filter(|tag| tag.code == x_tag.code + 20)
        .and_then(|tag| tag.value.trim().parse::<f64>().ok());
    match z {
        Some(z) => Some((vec![x, y, z], 3)),
        None => Some((vec![x, y], 2)),
    }
}

/// 浮点与点分量取整到指定小数位。
pub fn round_fields(fields: &mut [Field], precision: u32) {
    for field in fields {
        match &mut field.value {
            FieldValue::Float(value) => *value = round_to(*value, precision),
            FieldValue::Point(components) => {
                for component in components.iter_mut() {
                    *component = round_to(*component, precision);
                }
            }
            FieldValue::Text(_) | FieldValue::Int(_) => {}
        }
    }
}

/// 编译并按需取整，比对前的标准入口。
pub fn prepare(tags: &[Tag], precision: Option<u32>) -> Vec<Field> {
    let mut fields = compile(tags);
    if let Some(precision) = precision {
        round_fields(&mut fields, precision);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(i32, &str)]) -> Vec<Tag> {
        pairs.iter().map(|(code, value)| Tag::new(*code, *value)).collect()
    }

    #[test]
    fn coordinates_are_grouped_into_points() {
        let fields = compile(&tags(&[
            (0, "LINE"),
            (8, "WALLS"),
            (10, "1.5"),
            (20, "2.5"),
            (30, "0.0"),
            (11, "4.0"),
            (21, "5.0"),
            (62, "3"),
        ]));
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[2], Field::new(10, FieldValue::Point(vec![1.5, 2.5, 0.0])));
        assert_eq!(fields[3], Field::new(11, FieldValue::Point(vec![4.0, 5.0])));
        assert_eq!(fields[4], Field::new(62, FieldValue::Int(3)));
    }

    #[test]
    fn lone_coordinate_stays_a_float() {
        let fields = compile(&tags(&[(10, "1.0"), (40, "2.0"), (20, "3.0")]));
        assert_eq!(fields[0], Field::float(10, 1.0));
        assert_eq!(fields[2], Field::float(20, 3.0));
    }

    #[test]
    fn unparseable_numbers_stay_text() {
        let field = typed_field(&Tag::new(40, "abc"));
        assert_eq!(field, Field::text(40, "abc"));
        assert_eq!(typed_field(&Tag::new(2, "42")), Field::text(2, "42"));
    }

    #[test]
    fn rounding_makes_nearby_values_equal() {
        let mut left = compile(&tags(&[(10, "1.0000001"), (20, "-0.0000001")]));
        let mut right = compile(&tags(&[(10, "1.0"), (20, "0.0")]));
        assert_ne!(left, right);
        round_fields(&mut left, 6);
        round_fields(&mut right, 6);
        assert_eq!(left, right);
    }
}
