// ==========================================
// 表格渲染器（xlsx）
// ==========================================
// 布局: 单工作表，首行为 项目 / 值 表头，其后每个占位符一行
// ==========================================

use crate::domain::OutputKind;
use crate::report::dispatch::{RenderRequest, ReportRenderer};
use crate::report::error::ReportResult;

pub struct XlsxRenderer;

impl ReportRenderer for XlsxRenderer {
    fn kind(&self) -> OutputKind {
        OutputKind::Tabular
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "xlsx")
    }

    #[cfg(feature = "xlsx")]
    fn render(&self, request: &RenderRequest<'_>) -> ReportResult<()> {
        imp::render(request).map_err(|e| crate::report::ReportError::render(self.kind(), e))
    }

    #[cfg(not(feature = "xlsx"))]
    fn render(&self, _request: &RenderRequest<'_>) -> ReportResult<()> {
        Err(crate::report::ReportError::RenderUnavailable(self.kind()))
    }
}

#[cfg(feature = "xlsx")]
mod imp {
    use crate::i18n::t;
    use crate::report::dispatch::RenderRequest;
    use crate::report::renderers::field_rows;
    use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, XlsxError};

    pub fn render(request: &RenderRequest<'_>) -> Result<(), XlsxError> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(t("report.sheet_name"))?;

        let header = Format::new()
            .set_bold()
            .set_border(FormatBorder::Thin)
            .set_background_color(Color::RGB(0xD9D9D9));
        let cell = Format::new().set_border(FormatBorder::Thin);

        sheet.write_string_with_format(0, 0, t("report.column_field"), &header)?;
        sheet.write_string_with_format(0, 1, t("report.column_value"), &header)?;

        for (i, (label, value)) in field_rows(request.fields).into_iter().enumerate() {
            let row = (i + 1) as u32;
            sheet.write_string_with_format(row, 0, label, &cell)?;
            sheet.write_string_with_format(row, 1, value, &cell)?;
        }

        sheet.set_column_width(0, 20)?;
        sheet.set_column_width(1, 40)?;

        workbook.save(request.destination)?;
        Ok(())
    }
}
