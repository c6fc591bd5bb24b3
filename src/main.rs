// ==========================================
// 汽车数据处理工具 - 命令行入口
// ==========================================
// 子命令: import / preview / check / query / report / batch / templates / mapping / kinds
// 输出: 结果以 JSON 打印到标准输出，日志写标准错误
// ==========================================

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use car_data_processor::api::CreateTemplateRequest;
use car_data_processor::app::AppState;
use car_data_processor::config::AppConfig;
use car_data_processor::domain::OutputKind;
use car_data_processor::{i18n, logging};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "car-data-processor",
    version,
    about = "汽车数据处理工具 - 表格结构化、入库与报告生成"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// 数据根目录（数据库 / 模板 / 映射配置 / 输出均放在其下）
    #[arg(long = "data-dir", value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// 界面语言（zh-CN / en）
    #[arg(long = "lang", global = true)]
    lang: Option<String>,

    /// 以 JSON 行输出日志
    #[arg(long = "json-log", global = true)]
    json_log: bool,
}

#[derive(Subcommand)]
enum Command {
    /// 导入一个或多个表格文件
    Import {
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// 预览文件（前 3 个工作表）
    Preview {
        file: PathBuf,
        #[arg(long, default_value_t = car_data_processor::api::DEFAULT_PREVIEW_ROWS)]
        rows: usize,
    },

    /// 结构化并校验文件，不入库
    Check { file: PathBuf },

    /// 查询车辆
    Query {
        #[command(subcommand)]
        by: QueryCommand,
    },

    /// 按 VIN 生成单份报告
    Report {
        #[arg(long)]
        vin: String,
        #[arg(long)]
        template: String,
        /// 输出类型（tabular|excel|xlsx / paginated-document|pdf / flow-document|docx|word）
        #[arg(long, default_value = "xlsx")]
        format: String,
        /// 输出文件（默认: <输出目录>/<VIN>_<模板>.<扩展名>）
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// 批量生成报告（未指定 VIN 时对全部车辆）
    Batch {
        #[arg(long)]
        template: String,
        #[arg(long, default_value = "xlsx")]
        format: String,
        #[arg(long = "vin")]
        vins: Vec<String>,
        #[arg(long = "output-dir")]
        output_dir: Option<PathBuf>,
    },

    /// 模板管理
    Templates {
        #[command(subcommand)]
        action: TemplateCommand,
    },

    /// 字段映射配置
    Mapping {
        #[command(subcommand)]
        action: MappingCommand,
    },

    /// 列出输出类型及可用性
    Kinds,
}

#[derive(Subcommand)]
enum QueryCommand {
    /// 按 VIN 查询完整档案
    Vin { vin: String },
    /// 按发动机型号查询
    Engine { code: String },
    /// 列出全部车辆
    List,
    /// 某车辆已生成的报告
    Reports { vin: String },
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// 列出模板
    List,
    /// 校验模板
    Validate { name: String },
    /// 创建模板（--field "[占位符]=点分路径"，可重复）
    Create {
        name: String,
        #[arg(long, default_value = "docx")]
        format: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
enum MappingCommand {
    /// 导出当前映射到文件
    Export { file: PathBuf },
    /// 从文件加载并合并，合并结果写回默认映射配置
    Load { file: PathBuf },
    /// 打印当前映射
    Show,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (placeholder, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("字段格式应为 占位符=路径: {}", raw))?;
    Ok((placeholder.trim().to_string(), path.trim().to_string()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn path_str(path: &std::path::Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("路径不是有效的 UTF-8: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_with(cli.json_log);
    i18n::init_from_env();
    if let Some(lang) = &cli.lang {
        i18n::set_locale(lang);
    }

    tracing::info!(version = car_data_processor::VERSION, "{}", car_data_processor::APP_NAME);

    let config = match &cli.data_dir {
        Some(dir) => AppConfig::rooted_at(dir),
        None => AppConfig::from_env(),
    };
    let state = AppState::new(config).map_err(|e| anyhow!(e))?;

    match cli.command {
        Command::Import { files } => {
            let files = files
                .iter()
                .map(|f| path_str(f).map(str::to_string))
                .collect::<Result<Vec<_>>>()?;
            let response = state.import_api.import_files(&files).await?;
            print_json(&response)?;
        }

        Command::Preview { file, rows } => {
            let preview = state.import_api.preview_file(path_str(&file)?, Some(rows))?;
            print_json(&preview)?;
        }

        Command::Check { file } => {
            let report = state.import_api.check_file(path_str(&file)?)?;
            print_json(&report)?;
        }

        Command::Query { by } => match by {
            QueryCommand::Vin { vin } => print_json(&state.query_api.search_by_vin(&vin)?)?,
            QueryCommand::Engine { code } => {
                print_json(&state.query_api.search_by_engine_code(&code)?)?
            }
            QueryCommand::List => print_json(&state.query_api.list_vehicles()?)?,
            QueryCommand::Reports { vin } => print_json(&state.query_api.list_reports(&vin)?)?,
        },

        Command::Report {
            vin,
            template,
            format,
            output,
        } => {
            let kind = OutputKind::parse(&format)
                .ok_or_else(|| anyhow!("不支持的输出格式: {}", format))?;
            let destination = output.unwrap_or_else(|| {
                state.config.output_dir.join(format!(
                    "{}_{}.{}",
                    vin.trim(),
                    template,
                    kind.extension()
                ))
            });
            let response = state
                .report_api
                .generate_report(&vin, &template, &format, &destination)?;
            print_json(&response)?;
        }

        Command::Batch {
            template,
            format,
            vins,
            output_dir,
        } => {
            let output_dir = output_dir.unwrap_or_else(|| state.config.output_dir.clone());
            let vins = (!vins.is_empty()).then_some(vins.as_slice());
            let result = state
                .report_api
                .generate_batch(vins, &template, &format, &output_dir)?;
            print_json(&result)?;
        }

        Command::Templates { action } => match action {
            TemplateCommand::List => print_json(&state.report_api.list_templates()?)?,
            TemplateCommand::Validate { name } => {
                print_json(&state.report_api.validate_template(&name))?
            }
            TemplateCommand::Create {
                name,
                format,
                title,
                fields,
            } => {
                let summary = state.report_api.create_template(CreateTemplateRequest {
                    name,
                    kind: format,
                    title,
                    fields: fields.into_iter().collect::<IndexMap<_, _>>(),
                })?;
                print_json(&summary)?;
            }
        },

        Command::Mapping { action } => match action {
            MappingCommand::Export { file } => {
                state.import_api.export_mapping(path_str(&file)?)?;
                println!("{}", i18n::t("common.success"));
            }
            MappingCommand::Load { file } => {
                state.import_api.load_mapping(path_str(&file)?)?;
                let target = state.config.mapping_config_path.clone();
                state
                    .import_api
                    .export_mapping(path_str(&target)?)
                    .context("合并后的映射配置保存失败")?;
                println!("{}", i18n::t("common.success"));
            }
            MappingCommand::Show => print_json(&state.import_api.current_mapping()?)?,
        },

        Command::Kinds => print_json(&state.report_api.output_kinds())?,
    }

    Ok(())
}
