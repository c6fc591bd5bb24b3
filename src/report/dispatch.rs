// ==========================================
// 汽车数据处理工具 - 渲染分发
// ==========================================
// 职责: 输出类型 → 渲染能力（每种类型一个 ReportRenderer）
// 约束:
// - 未知类型 → Err(UnsupportedFormat)
// - 已知类型但能力缺失 → Ok(Unavailable)，不抛错，批量可继续
// - 能力可用性在注册时检测一次
// ==========================================

use crate::config::TemplateConfig;
use crate::domain::{OutputKind, RenderOutcome, ResolvedFields};
use crate::report::error::{ReportError, ReportResult};
use crate::report::renderers::default_renderers;
use indexmap::{IndexMap, IndexSet};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// 单次渲染请求
pub struct RenderRequest<'a> {
    pub fields: &'a ResolvedFields,
    pub template: &'a TemplateConfig,
    /// 模板文件（已拼上模板目录；文件可能不存在）
    pub template_file: Option<PathBuf>,
    pub destination: &'a Path,
}

// ==========================================
// ReportRenderer Trait
// ==========================================
// 实现者: XlsxRenderer, PdfRenderer, DocxRenderer
pub trait ReportRenderer: Send + Sync {
    fn kind(&self) -> OutputKind;

    /// 能力是否可用（未编译对应特性时为 false）
    fn is_available(&self) -> bool;

    fn render(&self, request: &RenderRequest<'_>) -> ReportResult<()>;
}

// ==========================================
// RenderDispatch - 渲染能力注册表
// ==========================================
pub struct RenderDispatch {
    template_dir: PathBuf,
    renderers: IndexMap<OutputKind, Box<dyn ReportRenderer>>,
    available: IndexSet<OutputKind>,
}

impl RenderDispatch {
    /// 注册全部内置渲染器
    pub fn new<P: AsRef<Path>>(template_dir: P) -> Self {
        let mut dispatch = Self::empty(template_dir);
        for renderer in default_renderers() {
            dispatch.register(renderer);
        }
        info!(supported = ?dispatch.supported_kinds(), "渲染能力检测完成");
        dispatch
    }

    /// 不含任何渲染器
    pub fn empty<P: AsRef<Path>>(template_dir: P) -> Self {
        Self {
            template_dir: template_dir.as_ref().to_path_buf(),
            renderers: IndexMap::new(),
            available: IndexSet::new(),
        }
    }

    /// 注册（同类型覆盖）
    pub fn register(&mut self, renderer: Box<dyn ReportRenderer>) {
        let kind = renderer.kind();
        if renderer.is_available() {
            self.available.insert(kind);
        } else {
            self.available.shift_remove(&kind);
        }
        self.renderers.insert(kind, renderer);
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    /// 当前可用的输出类型
    pub fn supported_kinds(&self) -> Vec<OutputKind> {
        OutputKind::ALL
            .into_iter()
            .filter(|k| self.available.contains(k))
            .collect()
    }

    pub fn is_supported(&self, kind: OutputKind) -> bool {
        self.available.contains(&kind)
    }

    /// 按名称分发
    pub fn render(
        &self,
        fields: &ResolvedFields,
        template: &TemplateConfig,
        kind_name: &str,
        destination: &Path,
    ) -> ReportResult<RenderOutcome> {
        let kind = OutputKind::parse(kind_name)
            .ok_or_else(|| ReportError::UnsupportedFormat(kind_name.to_string()))?;
        Ok(self.render_kind(fields, template, kind, destination))
    }

    /// 按已解析的类型分发
    pub fn render_kind(
        &self,
        fields: &ResolvedFields,
        template: &TemplateConfig,
        kind: OutputKind,
        destination: &Path,
    ) -> RenderOutcome {
        let renderer = match self.renderers.get(&kind) {
            Some(r) if self.available.contains(&kind) => r,
            _ => {
                warn!(kind = %kind, "渲染能力不可用");
                return RenderOutcome::Unavailable { kind };
            }
        };

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!(path = %parent.display(), error = %e, "创建输出目录失败");
                return RenderOutcome::Failed {
                    reason: ReportError::from(e).to_string(),
                };
            }
        }

        let request = RenderRequest {
            fields,
            template,
            template_file: template
                .template_file
                .as_ref()
                .map(|f| self.template_dir.join(f)),
            destination,
        };

        match renderer.render(&request) {
            Ok(()) => {
                info!(kind = %kind, path = %destination.display(), "报告生成成功");
                RenderOutcome::Rendered {
                    path: destination.to_path_buf(),
                }
            }
            Err(ReportError::RenderUnavailable(kind)) => {
                warn!(kind = %kind, "渲染能力不可用");
                RenderOutcome::Unavailable { kind }
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "生成报告失败");
                RenderOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 测试用渲染器：写出 key=value 文本；可指定第 N 次调用报告能力丢失
    pub struct TextRenderer {
        pub kind: OutputKind,
        pub available: bool,
        pub unavailable_on_call: Option<usize>,
        pub calls: Arc<AtomicUsize>,
    }

    impl TextRenderer {
        pub fn new(kind: OutputKind) -> Self {
            Self {
                kind,
                available: true,
                unavailable_on_call: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ReportRenderer for TextRenderer {
        fn kind(&self) -> OutputKind {
            self.kind
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn render(&self, request: &RenderRequest<'_>) -> ReportResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.unavailable_on_call == Some(call) {
                return Err(ReportError::RenderUnavailable(self.kind));
            }
            let body = request
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("\n");
            std::fs::write(request.destination, body)?;
            Ok(())
        }
    }

    fn fields() -> ResolvedFields {
        let mut f = ResolvedFields::new();
        f.insert("[VIN码]".to_string(), "LVSHFAEM1EF123456".to_string());
        f
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let dispatch = RenderDispatch::empty("templates");
        let template = TemplateConfig::new("t");
        let result = dispatch.render(&fields(), &template, "html", Path::new("out.html"));
        assert!(matches!(result, Err(ReportError::UnsupportedFormat(k)) if k == "html"));
    }

    #[test]
    fn test_known_but_unavailable_kind_is_soft_failure() {
        let mut dispatch = RenderDispatch::empty("templates");
        let mut renderer = TextRenderer::new(OutputKind::PaginatedDocument);
        renderer.available = false;
        dispatch.register(Box::new(renderer));

        assert!(dispatch.supported_kinds().is_empty());
        let outcome = dispatch
            .render(&fields(), &TemplateConfig::new("t"), "pdf", Path::new("x.pdf"))
            .unwrap();
        assert_eq!(
            outcome,
            RenderOutcome::Unavailable {
                kind: OutputKind::PaginatedDocument
            }
        );
    }

    #[test]
    fn test_render_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatch = RenderDispatch::empty(dir.path());
        dispatch.register(Box::new(TextRenderer::new(OutputKind::Tabular)));

        let dest = dir.path().join("nested").join("report.xlsx");
        let outcome = dispatch
            .render(&fields(), &TemplateConfig::new("t"), "excel", &dest)
            .unwrap();
        assert!(outcome.is_success());
        assert!(std::fs::read_to_string(&dest).unwrap().contains("LVSHFAEM1EF123456"));
    }

    #[test]
    fn test_builtin_kinds_follow_features() {
        let dispatch = RenderDispatch::new("templates");
        assert_eq!(dispatch.is_supported(OutputKind::Tabular), cfg!(feature = "xlsx"));
        assert_eq!(
            dispatch.is_supported(OutputKind::PaginatedDocument),
            cfg!(feature = "pdf")
        );
        assert_eq!(dispatch.is_supported(OutputKind::FlowDocument), cfg!(feature = "docx"));
    }
}
