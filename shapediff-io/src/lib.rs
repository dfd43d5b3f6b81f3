use std::fs;
use std::mem;
use std::path::Path;

use shapediff_core::document::Document;
use shapediff_core::raw::{Record, Section, Tag};
use thiserror::Error;

mod decode;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

/// ASCII DXF 读取入口：先切分原始段与记录，再解码实体与块定义。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 解析内存中的 DXF 文本。
    pub fn parse(&self, source: &str) -> Result<Document, IoError> {
        let sections = DxfParser::new(source).parse().map_err(IoError::from)?;
        decode::build_document(sections).map_err(IoError::from)
    }

    /// 仅读取原始段结构，不解码实体。
    pub fn load_sections(&self, path: &Path) -> Result<Vec<Section>, IoError> {
        let data = read_source(path)?;
        DxfParser::new(&data).parse().map_err(IoError::from)
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = read_source(path)?;
        self.parse(&data)
    }
}

fn read_source(path: &Path) -> Result<String, IoError> {
    let bytes = fs::read(path).map_err(|source| IoError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    // 旧版本 DXF 常以本地代码页保存，无法按 UTF-8 解码的字节以替换字符保留。
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug)]
enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl From<DxfError> for IoError {
    fn from(err: DxfError) -> Self {
        match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } => IoError::InvalidDocument(message),
        }
    }
}

/// 原始结构读取器：按组码 0 把每个段切分成记录，保留全部组码。
struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    fn parse(mut self) -> Result<Vec<Section>, DxfError> {
        if self.reader.is_binary() {
            return Err(DxfError::unsupported("二进制 DXF 尚未支持"));
        }
        let mut sections = Vec::new();
        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 999 {
                continue;
            }
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.trim() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    sections.push(self.parse_section(name.trim().to_string())?);
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(sections)
    }

    fn parse_section(&mut self, name: String) -> Result<Section, DxfError> {
        let mut records = Vec::new();
        let mut current: Vec<Tag> = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some((0, value)) => {
                    if !current.is_empty() {
                        records.push(Record::new(mem::take(&mut current)));
                    }
                    current.push(Tag::new(0, value.trim()));
                }
                Some((999, _)) => continue,
                Some((code, value)) => current.push(Tag::new(code, value)),
                None => {
                    return Err(DxfError::invalid(format!(
                        "{name} 段未找到 ENDSEC 终止标记"
                    )));
                }
            }
        }
        if !current.is_empty() {
            records.push(Record::new(current));
        }
        Ok(Section::new(name, records))
    }
}

struct DxfReader<'a> {
    source: &'a str,
    lines: std::str::Lines<'a>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        Self {
            source,
            lines: source.lines(),
            line_number: 0,
        }
    }

    fn is_binary(&self) -> bool {
        self.source.starts_with("AutoCAD Binary DXF")
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 容忍文件尾部的空行
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_split_records_at_group_code_zero() {
        let source = "0\nSECTION\n2\nENTITIES\n0\nLINE\n5\n1F\n8\nWALLS\n0\nPOINT\n5\n20\n0\nENDSEC\n0\nEOF\n";
        let sections = DxfParser::new(source).parse().expect("parse sections");
        assert_eq!(sections.len(), 1);
        let section = &sections[0];
        assert_eq!(section.name(), "ENTITIES");
        assert_eq!(section.records().len(), 2);
        assert_eq!(section.records()[0].kind(), "LINE");
        assert_eq!(section.records()[0].handle(), Some("1F"));
        assert_eq!(section.records()[1].len(), 2);
    }

    #[test]
    fn comments_are_dropped_and_missing_endsec_is_rejected() {
        let source = "999\nexported\n0\nSECTION\n2\nOBJECTS\n0\nDICTIONARY\n999\nnote\n5\nC\n";
        let err = DxfParser::new(source).parse().expect_err("missing ENDSEC");
        match err {
            DxfError::Invalid { message } => assert!(message.contains("ENDSEC")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn odd_number_of_lines_reports_line_number() {
        let source = "0\nSECTION\n2\n";
        match DxfParser::new(source).parse() {
            Err(DxfError::Invalid { message }) => assert!(message.contains("第 3 行")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
