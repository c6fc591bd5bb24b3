// ==========================================
// 汽车数据处理工具 - 批量报告生成
// ==========================================
// 约束:
// - 按输入顺序逐条解析 + 渲染，单条失败不影响后续
// - 序号 1 基，与输入位置一致
// - 文件名 report_<序号>_<批次时间戳>.<扩展名>，时间戳在批次开始时取一次
// ==========================================

use crate::domain::{BatchResult, FailedItem, FieldMap, RenderOutcome, ResolvedFields};
use crate::i18n::t_with_args;
use crate::report::dispatch::RenderDispatch;
use crate::report::error::{ReportError, ReportResult};
use crate::report::resolver::TemplateResolver;
use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 批次时间戳格式
pub const BATCH_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub struct BatchRunner {
    resolver: Arc<TemplateResolver>,
    dispatch: Arc<RenderDispatch>,
}

impl BatchRunner {
    pub fn new(resolver: Arc<TemplateResolver>, dispatch: Arc<RenderDispatch>) -> Self {
        Self { resolver, dispatch }
    }

    pub fn run_batch(
        &self,
        records: &[FieldMap],
        template_name: &str,
        output_dir: &Path,
        kind_name: &str,
    ) -> ReportResult<BatchResult> {
        self.run_batch_with(records, template_name, output_dir, kind_name, |_, _, _| {})
    }

    /// 批量生成；每条成功后回调 (序号, 产物路径, 实际渲染的字段)
    ///
    /// 输出类型未知、模板不存在属于调用方错误，在开始前直接返回 Err
    #[instrument(skip(self, records, on_success), fields(count = records.len()))]
    pub fn run_batch_with<F>(
        &self,
        records: &[FieldMap],
        template_name: &str,
        output_dir: &Path,
        kind_name: &str,
        mut on_success: F,
    ) -> ReportResult<BatchResult>
    where
        F: FnMut(usize, &Path, &ResolvedFields),
    {
        let kind = crate::domain::OutputKind::parse(kind_name)
            .ok_or_else(|| ReportError::UnsupportedFormat(kind_name.to_string()))?;
        let template = self.resolver.templates().get(template_name)?;
        std::fs::create_dir_all(output_dir)?;

        let started = Local::now().naive_local();
        let timestamp = started.format(BATCH_TIMESTAMP_FORMAT).to_string();
        let mut result = BatchResult::default();

        for (i, record) in records.iter().enumerate() {
            let index = i + 1;
            let path = output_dir.join(format!(
                "report_{}_{}.{}",
                index,
                timestamp,
                kind.extension()
            ));

            let fields = self
                .resolver
                .resolve_at(record, &template, Local::now().naive_local());
            match self.dispatch.render_kind(&fields, &template, kind, &path) {
                RenderOutcome::Rendered { path } => {
                    on_success(index, &path, &fields);
                    result.success_count += 1;
                    result.output_paths.push(path.display().to_string());
                }
                RenderOutcome::Unavailable { kind } => {
                    let reason =
                        t_with_args("batch.unavailable", &[("kind", kind.as_str())]);
                    warn!(index, reason = %reason, "批量生成单项失败");
                    result.failed_count += 1;
                    result.failed_items.push(FailedItem { index, reason });
                }
                RenderOutcome::Failed { reason } => {
                    warn!(index, reason = %reason, "批量生成单项失败");
                    result.failed_count += 1;
                    result.failed_items.push(FailedItem { index, reason });
                }
            }
        }

        info!(
            template = template_name,
            kind = %kind,
            success = result.success_count,
            failed = result.failed_count,
            "批量生成完成"
        );
        Ok(result)
    }
}
