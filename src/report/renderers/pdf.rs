// ==========================================
// 分页文档渲染器（pdf）
// ==========================================
// 布局: A4 纵向；首页居中标题，其后为 字段 / 值 两列表格，超出一页自动换页
// 字体: 内置 CJK 字体 STSong-Light（UniGB-UCS2-H 编码，文本按 UTF-16BE 写入）
// ==========================================

use crate::domain::OutputKind;
use crate::report::dispatch::{RenderRequest, ReportRenderer};
use crate::report::error::ReportResult;

pub struct PdfRenderer;

impl ReportRenderer for PdfRenderer {
    fn kind(&self) -> OutputKind {
        OutputKind::PaginatedDocument
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "pdf")
    }

    #[cfg(feature = "pdf")]
    fn render(&self, request: &RenderRequest<'_>) -> ReportResult<()> {
        imp::render(request).map_err(|e| crate::report::ReportError::render(self.kind(), e))
    }

    #[cfg(not(feature = "pdf"))]
    fn render(&self, _request: &RenderRequest<'_>) -> ReportResult<()> {
        Err(crate::report::ReportError::RenderUnavailable(self.kind()))
    }
}

#[cfg(feature = "pdf")]
mod imp {
    use crate::i18n::t;
    use crate::report::dispatch::RenderRequest;
    use crate::report::renderers::{field_rows, report_title};
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

    const PAGE_WIDTH: f32 = 595.0;
    const PAGE_HEIGHT: f32 = 842.0;
    const MARGIN: f32 = 56.0;
    const TITLE_SIZE: f32 = 16.0;
    const BODY_SIZE: f32 = 11.0;
    const ROW_HEIGHT: f32 = 22.0;
    const LABEL_WIDTH: f32 = 180.0;
    const FONT_NAME: &str = "F1";

    pub fn render(request: &RenderRequest<'_>) -> Result<(), lopdf::Error> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = add_cjk_font(&mut doc);
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { FONT_NAME => font_id },
        });

        let mut rows = vec![(t("report.column_field"), t("report.column_value"))];
        rows.extend(
            field_rows(request.fields)
                .into_iter()
                .map(|(l, v)| (l.to_string(), v.to_string())),
        );

        let title = report_title(request.template);
        let mut page_ids: Vec<Object> = Vec::new();
        let mut ops: Vec<Operation> = Vec::new();

        // 标题
        let title_width = text_width(&title, TITLE_SIZE);
        push_text(
            &mut ops,
            &title,
            TITLE_SIZE,
            (PAGE_WIDTH - title_width) / 2.0,
            PAGE_HEIGHT - MARGIN - TITLE_SIZE,
        );
        let mut y = PAGE_HEIGHT - MARGIN - TITLE_SIZE - 30.0;

        for (i, (label, value)) in rows.iter().enumerate() {
            if y - ROW_HEIGHT < MARGIN {
                page_ids.push(finish_page(&mut doc, pages_id, std::mem::take(&mut ops))?.into());
                y = PAGE_HEIGHT - MARGIN;
            }
            let top = y;
            y -= ROW_HEIGHT;
            if i == 0 {
                // 表头底色
                ops.push(Operation::new("g", vec![0.85_f32.into()]));
                push_rect(&mut ops, MARGIN, y, PAGE_WIDTH - 2.0 * MARGIN, ROW_HEIGHT, "f");
                ops.push(Operation::new("g", vec![0.into()]));
            }
            push_rect(&mut ops, MARGIN, y, LABEL_WIDTH, top - y, "S");
            push_rect(
                &mut ops,
                MARGIN + LABEL_WIDTH,
                y,
                PAGE_WIDTH - 2.0 * MARGIN - LABEL_WIDTH,
                top - y,
                "S",
            );
            let baseline = y + (ROW_HEIGHT - BODY_SIZE) / 2.0 + 2.0;
            push_text(&mut ops, label, BODY_SIZE, MARGIN + 6.0, baseline);
            push_text(&mut ops, value, BODY_SIZE, MARGIN + LABEL_WIDTH + 6.0, baseline);
        }
        page_ids.push(finish_page(&mut doc, pages_id, ops)?.into());

        let count = page_ids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => page_ids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        doc.save(request.destination)?;
        Ok(())
    }

    fn add_cjk_font(doc: &mut Document) -> ObjectId {
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => "STSong-Light",
            "Flags" => 6,
            "FontBBox" => vec![(-25).into(), (-254).into(), 1000.into(), 880.into()],
            "ItalicAngle" => 0,
            "Ascent" => 880,
            "Descent" => -120,
            "CapHeight" => 880,
            "StemV" => 93,
        });
        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType0",
            "BaseFont" => "STSong-Light",
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("GB1"),
                "Supplement" => 4,
            },
            "FontDescriptor" => descriptor_id,
        });
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "STSong-Light",
            "Encoding" => "UniGB-UCS2-H",
            "DescendantFonts" => vec![cid_font_id.into()],
        })
    }

    fn finish_page(
        doc: &mut Document,
        pages_id: ObjectId,
        operations: Vec<Operation>,
    ) -> Result<ObjectId, lopdf::Error> {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        Ok(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        }))
    }

    fn push_text(ops: &mut Vec<Operation>, text: &str, size: f32, x: f32, y: f32) {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec![FONT_NAME.into(), size.into()]));
        ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_ucs2(text), StringFormat::Hexadecimal)],
        ));
        ops.push(Operation::new("ET", vec![]));
    }

    fn push_rect(ops: &mut Vec<Operation>, x: f32, y: f32, w: f32, h: f32, paint: &str) {
        ops.push(Operation::new(
            "re",
            vec![x.into(), y.into(), w.into(), h.into()],
        ));
        ops.push(Operation::new(paint, vec![]));
    }

    /// UTF-16BE（UniGB-UCS2-H 编码）
    fn encode_ucs2(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
    }

    /// 粗略宽度：CJK 全角，其余半角
    fn text_width(text: &str, size: f32) -> f32 {
        text.chars()
            .map(|c| if c.is_ascii() { 0.5 } else { 1.0 })
            .sum::<f32>()
            * size
    }
}

#[cfg(all(test, feature = "pdf"))]
mod tests {
    use super::*;
    use crate::config::TemplateConfig;
    use crate::domain::ResolvedFields;

    fn render_rows(n: usize) -> lopdf::Document {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.pdf");
        let fields: ResolvedFields = (0..n)
            .map(|i| (format!("[字段{}]", i), format!("值{}", i)))
            .collect();
        let template = TemplateConfig::new("t");
        PdfRenderer
            .render(&RenderRequest {
                fields: &fields,
                template: &template,
                template_file: None,
                destination: &dest,
            })
            .unwrap();
        lopdf::Document::load(&dest).unwrap()
    }

    #[test]
    fn test_single_page_report() {
        assert_eq!(render_rows(5).get_pages().len(), 1);
    }

    #[test]
    fn test_long_table_spills_to_next_page() {
        assert!(render_rows(60).get_pages().len() >= 2);
    }
}
