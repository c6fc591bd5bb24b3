// ==========================================
// 流式文档渲染器（docx）
// ==========================================
// 有模板文件: 逐段落替换占位符（段落内跨 run 拼接后替换，结果写回首个文本节点），
//             表格单元格内的段落同样处理，页眉页脚一并替换
// 无模板文件: 生成 标题 + 字段/值 两列表格 的最小文档
// ==========================================

use crate::config::TemplateConfig;
use crate::domain::OutputKind;
use crate::report::dispatch::{RenderRequest, ReportRenderer};
use crate::report::error::ReportResult;
use std::path::Path;

pub struct DocxRenderer;

impl ReportRenderer for DocxRenderer {
    fn kind(&self) -> OutputKind {
        OutputKind::FlowDocument
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "docx")
    }

    #[cfg(feature = "docx")]
    fn render(&self, request: &RenderRequest<'_>) -> ReportResult<()> {
        imp::render(request).map_err(|e| crate::report::ReportError::render(self.kind(), e))
    }

    #[cfg(not(feature = "docx"))]
    fn render(&self, _request: &RenderRequest<'_>) -> ReportResult<()> {
        Err(crate::report::ReportError::RenderUnavailable(self.kind()))
    }
}

/// 写出模板骨架：标题 + 每个占位符一段
#[cfg(feature = "docx")]
pub fn write_skeleton_template(path: &Path, template: &TemplateConfig) -> ReportResult<()> {
    imp::write_skeleton(path, template)
        .map_err(|e| crate::report::ReportError::render(OutputKind::FlowDocument, e))
}

#[cfg(not(feature = "docx"))]
pub fn write_skeleton_template(_path: &Path, _template: &TemplateConfig) -> ReportResult<()> {
    Err(crate::report::ReportError::RenderUnavailable(
        OutputKind::FlowDocument,
    ))
}

#[cfg(feature = "docx")]
pub(crate) mod imp {
    use crate::config::TemplateConfig;
    use crate::domain::ResolvedFields;
    use crate::i18n::{t, t_with_args};
    use crate::report::dispatch::RenderRequest;
    use crate::report::renderers::{field_rows, report_title};
    use anyhow::Result;
    use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
    use quick_xml::{Reader, Writer};
    use std::fs::File;
    use std::io::{Cursor, Read, Write};
    use std::path::Path;
    use tracing::debug;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipArchive, ZipWriter};

    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

    const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

    const LABEL_COL_TWIPS: u32 = 3000;
    const VALUE_COL_TWIPS: u32 = 6000;

    pub fn render(request: &RenderRequest<'_>) -> Result<()> {
        match request.template_file.as_deref().filter(|p| p.exists()) {
            Some(src) => {
                debug!(template = %src.display(), "使用模板文件生成");
                fill_template(src, request.destination, request.fields)
            }
            None => {
                let title = report_title(request.template);
                let header = (t("report.column_field"), t("report.column_value"));
                let xml = document_xml(|w| {
                    write_paragraph(w, &title, true, Some(32), true)?;
                    write_table(w, &header, &field_rows(request.fields))?;
                    write_paragraph(w, "", false, None, false)
                })?;
                write_package(request.destination, &xml)
            }
        }
    }

    pub fn write_skeleton(path: &Path, template: &TemplateConfig) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let heading = t_with_args("report.template_heading", &[("name", &template.name)]);
        let xml = document_xml(|w| {
            write_paragraph(w, &heading, true, Some(32), true)?;
            for placeholder in template.fields.keys() {
                write_paragraph(w, placeholder, false, None, false)?;
            }
            Ok(())
        })?;
        write_package(path, &xml)
    }

    // ==========================================
    // 模板填充
    // ==========================================

    fn fill_template(src: &Path, dest: &Path, fields: &ResolvedFields) -> Result<()> {
        let mut archive = ZipArchive::new(File::open(src)?)?;
        let mut out = ZipWriter::new(File::create(dest)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for i in 0..archive.len() {
            let name = archive.by_index_raw(i)?.name().to_string();
            if is_text_part(&name) {
                let mut xml = String::new();
                archive.by_index(i)?.read_to_string(&mut xml)?;
                let replaced = replace_placeholders(&xml, fields)?;
                out.start_file(name, options)?;
                out.write_all(replaced.as_bytes())?;
            } else {
                out.raw_copy_file(archive.by_index_raw(i)?)?;
            }
        }
        out.finish()?;
        Ok(())
    }

    fn is_text_part(name: &str) -> bool {
        name == "word/document.xml"
            || ((name.starts_with("word/header") || name.starts_with("word/footer"))
                && name.ends_with(".xml"))
    }

    /// 段落缓冲：自身事件与已处理完的内层段落（文本框内的 w:p）
    enum Piece {
        Own(Event<'static>),
        Nested(Vec<Event<'static>>),
    }

    /// 逐段落替换占位符；嵌套段落在各自层级独立替换
    pub fn replace_placeholders(xml: &str, fields: &ResolvedFields) -> Result<String> {
        let mut reader = Reader::from_str(xml);
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        let mut open: Vec<Vec<Piece>> = Vec::new();

        loop {
            let event = reader.read_event()?;
            if matches!(event, Event::Eof) {
                break;
            }
            if matches!(&event, Event::Start(e) if e.name().as_ref() == b"w:p") {
                open.push(Vec::new());
            }
            let closes = matches!(&event, Event::End(e) if e.name().as_ref() == b"w:p");

            match open.last_mut() {
                Some(pieces) => pieces.push(Piece::Own(event.into_owned())),
                None => writer.write_event(event)?,
            }

            if closes {
                close_paragraph(&mut open, &mut writer, fields)?;
            }
        }
        // 文档截断时补齐未闭合的段落
        while !open.is_empty() {
            close_paragraph(&mut open, &mut writer, fields)?;
        }

        Ok(String::from_utf8(writer.into_inner().into_inner())?)
    }

    /// 弹出最内层段落，替换后交给外层段落或直接写出
    fn close_paragraph(
        open: &mut Vec<Vec<Piece>>,
        writer: &mut Writer<Cursor<Vec<u8>>>,
        fields: &ResolvedFields,
    ) -> Result<()> {
        let Some(pieces) = open.pop() else {
            return Ok(());
        };
        let filled = fill_paragraph(pieces, fields)?;
        match open.last_mut() {
            Some(parent) => parent.push(Piece::Nested(filled)),
            None => {
                for event in filled {
                    writer.write_event(event)?;
                }
            }
        }
        Ok(())
    }

    /// 只拼接本段落自身的 w:t 文本做替换，内层段落原样保留
    fn fill_paragraph(pieces: Vec<Piece>, fields: &ResolvedFields) -> Result<Vec<Event<'static>>> {
        let mut text = String::new();
        let mut in_text = false;
        for piece in &pieces {
            match piece {
                Piece::Own(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
                Piece::Own(Event::End(e)) if e.name().as_ref() == b"w:t" => in_text = false,
                Piece::Own(Event::Text(e)) if in_text => text.push_str(&e.unescape()?),
                _ => {}
            }
        }

        let replaced = fields
            .iter()
            .fold(text.clone(), |acc, (placeholder, value)| {
                acc.replace(placeholder.as_str(), value)
            });
        let unchanged = replaced == text;

        // 合并后的文本写入首个 w:t，其余 w:t 清空
        let mut events = Vec::with_capacity(pieces.len());
        let mut written = false;
        in_text = false;
        for piece in pieces {
            let event = match piece {
                Piece::Nested(inner) => {
                    events.extend(inner);
                    continue;
                }
                Piece::Own(event) => event,
            };
            if unchanged {
                events.push(event);
                continue;
            }
            match event {
                Event::Start(e) if e.name().as_ref() == b"w:t" => {
                    in_text = true;
                    let mut start = e.clone();
                    if !written && e.try_get_attribute("xml:space")?.is_none() {
                        start.push_attribute(("xml:space", "preserve"));
                    }
                    events.push(Event::Start(start));
                }
                Event::Text(_) if in_text => {}
                Event::End(e) if e.name().as_ref() == b"w:t" => {
                    if !written {
                        events.push(Event::Text(BytesText::new(&replaced).into_owned()));
                        written = true;
                    }
                    in_text = false;
                    events.push(Event::End(e));
                }
                other => events.push(other),
            }
        }
        Ok(events)
    }

    // ==========================================
    // 文档生成
    // ==========================================

    type XmlWriter = Writer<Cursor<Vec<u8>>>;

    fn document_xml<F>(body: F) -> Result<String>
    where
        F: FnOnce(&mut XmlWriter) -> Result<()>,
    {
        let mut w = Writer::new(Cursor::new(Vec::new()));
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        let mut root = BytesStart::new("w:document");
        root.push_attribute(("xmlns:w", W_NS));
        w.write_event(Event::Start(root))?;
        w.write_event(Event::Start(BytesStart::new("w:body")))?;
        body(&mut w)?;
        w.write_event(Event::End(BytesEnd::new("w:body")))?;
        w.write_event(Event::End(BytesEnd::new("w:document")))?;
        Ok(String::from_utf8(w.into_inner().into_inner())?)
    }

    fn empty_with(w: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let mut e = BytesStart::new(name);
        for attr in attrs {
            e.push_attribute(*attr);
        }
        w.write_event(Event::Empty(e))?;
        Ok(())
    }

    fn write_paragraph(
        w: &mut XmlWriter,
        text: &str,
        bold: bool,
        size_half_points: Option<u32>,
        center: bool,
    ) -> Result<()> {
        w.write_event(Event::Start(BytesStart::new("w:p")))?;
        if center {
            w.write_event(Event::Start(BytesStart::new("w:pPr")))?;
            empty_with(w, "w:jc", &[("w:val", "center")])?;
            w.write_event(Event::End(BytesEnd::new("w:pPr")))?;
        }
        if !text.is_empty() {
            w.write_event(Event::Start(BytesStart::new("w:r")))?;
            if bold || size_half_points.is_some() {
                w.write_event(Event::Start(BytesStart::new("w:rPr")))?;
                if bold {
                    empty_with(w, "w:b", &[])?;
                }
                if let Some(size) = size_half_points {
                    let size = size.to_string();
                    empty_with(w, "w:sz", &[("w:val", size.as_str())])?;
                }
                w.write_event(Event::End(BytesEnd::new("w:rPr")))?;
            }
            let mut t = BytesStart::new("w:t");
            t.push_attribute(("xml:space", "preserve"));
            w.write_event(Event::Start(t))?;
            w.write_event(Event::Text(BytesText::new(text)))?;
            w.write_event(Event::End(BytesEnd::new("w:t")))?;
            w.write_event(Event::End(BytesEnd::new("w:r")))?;
        }
        w.write_event(Event::End(BytesEnd::new("w:p")))?;
        Ok(())
    }

    fn write_table(w: &mut XmlWriter, header: &(String, String), rows: &[(&str, &str)]) -> Result<()> {
        w.write_event(Event::Start(BytesStart::new("w:tbl")))?;

        w.write_event(Event::Start(BytesStart::new("w:tblPr")))?;
        empty_with(w, "w:tblW", &[("w:w", "0"), ("w:type", "auto")])?;
        w.write_event(Event::Start(BytesStart::new("w:tblBorders")))?;
        for edge in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
            empty_with(w, edge, &[("w:val", "single"), ("w:sz", "4"), ("w:color", "000000")])?;
        }
        w.write_event(Event::End(BytesEnd::new("w:tblBorders")))?;
        w.write_event(Event::End(BytesEnd::new("w:tblPr")))?;

        let label_w = LABEL_COL_TWIPS.to_string();
        let value_w = VALUE_COL_TWIPS.to_string();
        w.write_event(Event::Start(BytesStart::new("w:tblGrid")))?;
        empty_with(w, "w:gridCol", &[("w:w", label_w.as_str())])?;
        empty_with(w, "w:gridCol", &[("w:w", value_w.as_str())])?;
        w.write_event(Event::End(BytesEnd::new("w:tblGrid")))?;

        write_row(w, &header.0, &header.1, true, &label_w, &value_w)?;
        for (label, value) in rows {
            write_row(w, label, value, false, &label_w, &value_w)?;
        }

        w.write_event(Event::End(BytesEnd::new("w:tbl")))?;
        Ok(())
    }

    fn write_row(
        w: &mut XmlWriter,
        label: &str,
        value: &str,
        bold: bool,
        label_w: &str,
        value_w: &str,
    ) -> Result<()> {
        w.write_event(Event::Start(BytesStart::new("w:tr")))?;
        for (text, width) in [(label, label_w), (value, value_w)] {
            w.write_event(Event::Start(BytesStart::new("w:tc")))?;
            w.write_event(Event::Start(BytesStart::new("w:tcPr")))?;
            empty_with(w, "w:tcW", &[("w:w", width), ("w:type", "dxa")])?;
            w.write_event(Event::End(BytesEnd::new("w:tcPr")))?;
            write_paragraph(w, text, bold, None, false)?;
            w.write_event(Event::End(BytesEnd::new("w:tc")))?;
        }
        w.write_event(Event::End(BytesEnd::new("w:tr")))?;
        Ok(())
    }

    fn write_package(dest: &Path, document_xml: &str) -> Result<()> {
        let mut zip = ZipWriter::new(File::create(dest)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, body) in [
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", ROOT_RELS),
            ("word/document.xml", document_xml),
        ] {
            zip.start_file(name, options)?;
            zip.write_all(body.as_bytes())?;
        }
        zip.finish()?;
        Ok(())
    }

    /// 读取 document.xml（测试与校验用）
    pub fn read_document_xml(path: &Path) -> Result<String> {
        let mut archive = ZipArchive::new(File::open(path)?)?;
        let mut xml = String::new();
        archive.by_name("word/document.xml")?.read_to_string(&mut xml)?;
        Ok(xml)
    }
}

#[cfg(all(test, feature = "docx"))]
mod tests {
    use super::*;
    use crate::domain::ResolvedFields;

    fn fields() -> ResolvedFields {
        let mut f = ResolvedFields::new();
        f.insert("[VIN码]".to_string(), "LVSHFAEM1EF123456".to_string());
        f.insert("[排量]".to_string(), "2.0".to_string());
        f
    }

    #[test]
    fn test_replaces_placeholder_split_across_runs() {
        let xml = r#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>VIN: [VIN</w:t></w:r><w:r><w:t>码]</w:t></w:r></w:p><w:p><w:r><w:t>无占位符</w:t></w:r></w:p></w:body></w:document>"#;
        let out = imp::replace_placeholders(xml, &fields()).unwrap();
        assert!(out.contains("VIN: LVSHFAEM1EF123456"));
        assert!(!out.contains("[VIN"));
        assert!(out.contains("<w:t>无占位符</w:t>"));
    }

    #[test]
    fn test_replaces_inside_table_cells() {
        let xml = r#"<w:document xmlns:w="x"><w:body><w:tbl><w:tr><w:tc><w:p><w:r><w:t>[排量]</w:t></w:r></w:p></w:tc></w:tr></w:tbl></w:body></w:document>"#;
        let out = imp::replace_placeholders(xml, &fields()).unwrap();
        assert!(out.contains(">2.0</w:t>"));
    }

    #[test]
    fn test_text_box_paragraph_is_replaced_at_its_own_level() {
        let xml = r#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>外层</w:t></w:r><w:r><w:pict><w:txbxContent><w:p><w:r><w:t>[VIN码]</w:t></w:r></w:p></w:txbxContent></w:pict></w:r><w:r><w:t>[排量]</w:t></w:r></w:p></w:body></w:document>"#;
        let out = imp::replace_placeholders(xml, &fields()).unwrap();
        assert!(!out.contains("[VIN码]"));
        assert!(!out.contains("[排量]"));

        // 内层段落的文本仍在文本框内，外层文本不吸收内层内容
        let inner = out.find("<w:txbxContent>").unwrap();
        let inner_end = out.find("</w:txbxContent>").unwrap();
        assert!(out[inner..inner_end].contains(">LVSHFAEM1EF123456</w:t>"));
        assert!(out[..inner].contains(">外层2.0</w:t>"));
        assert!(out[inner_end..].contains("<w:t></w:t>"));
        assert!(!out[..inner].contains("LVSHFAEM1EF123456"));
    }

    #[test]
    fn test_fill_skeleton_template() {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("inspection_template.docx");
        let template = TemplateConfig::new("inspection")
            .with_field("[VIN码]", "vin")
            .with_field("[排量]", "engine.displacement");
        write_skeleton_template(&template_path, &template).unwrap();
        assert!(imp::read_document_xml(&template_path)
            .unwrap()
            .contains("[VIN码]"));

        let dest = dir.path().join("out.docx");
        DocxRenderer
            .render(&RenderRequest {
                fields: &fields(),
                template: &template,
                template_file: Some(template_path),
                destination: &dest,
            })
            .unwrap();
        let xml = imp::read_document_xml(&dest).unwrap();
        assert!(xml.contains("LVSHFAEM1EF123456"));
        assert!(!xml.contains("[VIN码]"));
    }

    #[test]
    fn test_without_template_writes_field_table() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.docx");
        let template = TemplateConfig::new("t").with_template_file("missing.docx");
        DocxRenderer
            .render(&RenderRequest {
                fields: &fields(),
                template: &template,
                template_file: Some(dir.path().join("missing.docx")),
                destination: &dest,
            })
            .unwrap();
        let xml = imp::read_document_xml(&dest).unwrap();
        assert!(xml.contains("<w:tbl>"));
        assert!(xml.contains(">VIN码</w:t>"));
        assert!(xml.contains(">2.0</w:t>"));
    }
}
