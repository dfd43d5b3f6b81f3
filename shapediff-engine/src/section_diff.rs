//! 按句柄对齐两个版本的原始段，计算字段级编辑脚本。

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use shapediff_core::document::Document;
use shapediff_core::raw::{Record, Section, SectionRole, is_valid_handle};
use tracing::{debug, warn};

use crate::fields::{Field, prepare};
use crate::matcher::{OpTag, opcodes};

/// 一条记录的字段差异。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldDelta {
    /// 新增字段，键为右侧区间 `"j1:j2"`。
    pub insert: BTreeMap<String, Vec<Field>>,
    /// 替换字段，键为 `"i1:i2,j1:j2"`，值为左右两侧按下标索引的字段。
    pub replace: BTreeMap<String, (BTreeMap<usize, Field>, BTreeMap<usize, Field>)>,
    /// 删除字段，键为左侧下标。
    pub delete: BTreeMap<usize, Field>,
}

impl FieldDelta {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.replace.is_empty() && self.delete.is_empty()
    }
}

/// 比较两段字段序列；全部相等时返回 `None`。
pub fn field_difference(left: &[Field], right: &[Field]) -> Option<FieldDelta> {
    let mut delta = FieldDelta::default();
    for op in opcodes(left, right) {
        match op.tag {
            OpTag::Equal => {}
            OpTag::Insert => {
                delta
                    .insert
                    .insert(format!("{}:{}", op.j1, op.j2), right[op.j1..op.j2].to_vec());
            }
            OpTag::Delete => {
                for index in op.i1..op.i2 {
                    delta.delete.insert(index, left[index].clone());
                }
            }
            OpTag::Replace => {
                let before = (op.i1..op.i2).map(|i| (i, left[i].clone())).collect();
                let after = (op.j1..op.j2).map(|j| (j, right[j].clone())).collect();
                delta.replace.insert(
                    format!("{}:{},{}:{}", op.i1, op.i2, op.j1, op.j2),
                    (before, after),
                );
            }
        }
    }
    (!delta.is_empty()).then_some(delta)
}

/// 两条原始记录编译后比较；`precision` 为 `None` 时不取整。
pub fn record_difference(left: &Record, right: &Record, precision: Option<u32>) -> Option<FieldDelta> {
    field_difference(
        &prepare(left.tags(), precision),
        &prepare(right.tags(), precision),
    )
}

/// 段级差异。每个句柄最多出现在其中一个集合里。
#[derive(Debug, Clone, Default, Serialize)]
pub struct SectionDiff {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub modified: Vec<(String, FieldDelta)>,
}

impl SectionDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }

    /// 任一集合中出现的句柄数量。
    pub fn len(&self) -> usize {
        self.created.len() + self.deleted.len() + self.modified.len()
    }
}

fn index_by_handle(section: &Section) -> HashMap<&str, &Record> {
    let mut index = HashMap::new();
    for record in section.records() {
        if let Some(handle) = record.handle().filter(|handle| is_valid_handle(handle)) {
            index.entry(handle).or_insert(record);
        }
    }
    index
}

/// 比较同一角色的两个段。
pub fn section_difference(left: &Section, right: &Section, precision: Option<u32>) -> SectionDiff {
    let left_index = index_by_handle(left);
    let right_index = index_by_handle(right);
    let mut diff = SectionDiff::default();

    // 同一句柄重复出现时以首条记录为准
    let mut seen: HashSet<&str> = HashSet::new();
    for before in left.records() {
        let Some(handle) = before.handle().filter(|handle| is_valid_handle(handle)) else {
            continue;
        };
        if !seen.insert(handle) {
            continue;
        }
        match right_index.get(handle) {
            None => diff.deleted.push(handle.to_string()),
            Some(after) => {
                if let Some(delta) = record_difference(before, after, precision) {
                    diff.modified.push((handle.to_string(), delta));
                }
            }
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for record in right.records() {
        let Some(handle) = record.handle().filter(|handle| is_valid_handle(handle)) else {
            continue;
        };
        if seen.insert(handle) && !left_index.contains_key(handle) {
            diff.created.push(handle.to_string());
        }
    }

    debug!(
        section = left.name(),
        created = diff.created.len(),
        deleted = diff.deleted.len(),
        modified = diff.modified.len(),
        "段比对完成"
    );
    diff
}

/// 按给定角色逐段比较两份文档；缺失的段跳过并告警。
pub fn document_differences(
    before: &Document,
    after: &Document,
    roles: &[SectionRole],
    precision: Option<u32>,
) -> Vec<(SectionRole, SectionDiff)> {
    roles
        .iter()
        .filter_map(|role| {
            let name = role.as_str();
            match (before.section(name), after.section(name)) {
                (Some(left), Some(right)) => {
                    Some((*role, section_difference(left, right, precision)))
                }
                (left, right) => {
                    warn!(
                        section = name,
                        in_before = left.is_some(),
                        in_after = right.is_some(),
                        "段缺失，跳过比对"
                    );
                    None
                }
            }
        })
        .collect()
}

/// 文件级原始比对：覆盖全部已知段。
pub fn raw_differences(
    before: &[Section],
    after: &[Section],
    precision: Option<u32>,
) -> Vec<(SectionRole, SectionDiff)> {
    fn find(sections: &[Section], role: SectionRole) -> Option<&Section> {
        sections.iter().find(|section| section.role() == Some(role))
    }
    SectionRole::ALL
        .into_iter()
        .filter_map(|role| match (find(before, role), find(after, role)) {
            (Some(left), Some(right)) => Some((role, section_difference(left, right, precision))),
            (None, None) => None,
            (left, right) => {
                warn!(
                    section = role.as_str(),
                    in_before = left.is_some(),
                    in_after = right.is_some(),
                    "段缺失，跳过比对"
                );
                None
            }
        })
        .collect()
}

/// 解析配置中的段名，未知名称告警后忽略。
pub fn parse_roles<S: AsRef<str>>(names: &[S]) -> Vec<SectionRole> {
    let mut roles = Vec::new();
    for name in names {
        match SectionRole::from_name(name.as_ref()) {
            Some(role) if !roles.contains(&role) => roles.push(role),
            Some(_) => {}
            None => warn!(section = name.as_ref(), "未知的段名"),
        }
    }
    roles
}
