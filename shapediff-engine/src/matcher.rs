//! 最长公共子块匹配（Ratcliff/Obershelp），输出覆盖两侧序列的编辑脚本。
//!
//! 与 Python `difflib.SequenceMatcher` 在关闭 autojunk、无 junk 时的结果一致。

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpTag {
    Equal,
    Insert,
    Delete,
    Replace,
}

/// 编辑操作：左侧 `[i1, i2)` 对应右侧 `[j1, j2)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EditOp {
    pub tag: OpTag,
    pub i1: usize,
    pub i2: usize,
    pub j1: usize,
    pub j2: usize,
}

/// 连续匹配块：`a[a..a+size] == b[b..b+size]`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub a: usize,
    pub b: usize,
    pub size: usize,
}

pub struct SequenceMatcher<'s, T> {
    a: &'s [T],
    b: &'s [T],
    b2j: HashMap<&'s T, Vec<usize>>,
}

impl<'s, T: Eq + Hash> SequenceMatcher<'s, T> {
    pub fn new(a: &'s [T], b: &'s [T]) -> Self {
        let mut b2j: HashMap<&'s T, Vec<usize>> = HashMap::new();
        for (j, item) in b.iter().enumerate() {
            b2j.entry(item).or_default().push(j);
        }
        Self { a, b, b2j }
    }

    /// `a[alo..ahi]` 与 `b[blo..bhi]` 中最长的匹配块；并列时取最靠前者。
    pub fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Match {
        let mut best = Match {
            a: alo,
            b: blo,
            size: 0,
        };
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let previous = j
                        .checked_sub(1)
                        .and_then(|k| j2len.get(&k).copied())
                        .unwrap_or(0);
                    let length = previous + 1;
                    next.insert(j, length);
                    if length > best.size {
                        best = Match {
                            a: i + 1 - length,
                            b: j + 1 - length,
                            size: length,
                        };
                    }
                }
            }
            j2len = next;
        }
        best
    }

    /// 全部匹配块，按位置排序并合并相邻块，末尾附加长度为 0 的哨兵。
    pub fn matching_blocks(&self) -> Vec<Match> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut blocks: Vec<Match> = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let found = self.find_longest_match(alo, ahi, blo, bhi);
            if found.size == 0 {
                continue;
            }
            blocks.push(found);
            if alo < found.a && blo < found.b {
                queue.push((alo, found.a, blo, found.b));
            }
            if found.a + found.size < ahi && found.b + found.size < bhi {
                queue.push((found.a + found.size, ahi, found.b + found.size, bhi));
            }
        }
        blocks.sort_by_key(|block| (block.a, block.b));

        let mut merged: Vec<Match> = Vec::with_capacity(blocks.len() + 1);
        for block in blocks {
            match merged.last_mut() {
                Some(last) if last.a + last.size == block.a && last.b + last.size == block.b => {
                    last.size += block.size;
                }
                _ => merged.push(block),
            }
        }
        merged.push(Match {
            a: la,
            b: lb,
            size: 0,
        });
        merged
    }

    /// 把两侧序列完整划分为 equal/insert/delete/replace 操作。
    pub fn opcodes(&self) -> Vec<EditOp> {
        let mut i = 0;
        let mut j = 0;
        let mut ops = Vec::new();
        for block in self.matching_blocks() {
            let tag = match (i < block.a, j < block.b) {
                (true, true) => Some(OpTag::Replace),
                (true, false) => Some(OpTag::Delete),
                (false, true) => Some(OpTag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                ops.push(EditOp {
                    tag,
                    i1: i,
                    i2: block.a,
                    j1: j,
                    j2: block.b,
                });
            }
            i = block.a + block.size;
            j = block.b + block.size;
            if block.size > 0 {
                ops.push(EditOp {
                    tag: OpTag::Equal,
                    i1: block.a,
                    i2: i,
                    j1: block.b,
                    j2: j,
                });
            }
        }
        ops
    }
}

/// 便捷入口：直接计算两段序列的编辑脚本。
pub fn opcodes<T: Eq + Hash>(a: &[T], b: &[T]) -> Vec<EditOp> {
    SequenceMatcher::new(a, b).opcodes()
}
