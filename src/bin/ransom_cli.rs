//! 命令行客户端：
//! - 渲染文本（实时预览 / 重新生成）并打印字母图片地址
//! - 导出 ZIP 压缩包
//! - 列举 / 上传图片资源（上传需要管理员令牌）

use std::env;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use ransom_art::error::ProblemDetails;
use ransom_art::features::export::archive_file_name;
use ransom_art::features::lettering::models::{LoadStatus, RenderDirective, SessionSnapshot};
use ransom_art::storage::paths::content_type_for;
use ransom_art::storage::{StorageEntry, UploadReceipt};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3940/api/v1";
const DEFAULT_ADMIN_TOKEN_ENV: &str = "RANSOM_ADMIN_TOKEN";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
struct Args {
    help: bool,
    json: bool,
    base_url: Option<String>,
    token: Option<String>,
    timeout_secs: u64,
    cmd: Option<Command>,
}

#[derive(Debug, Clone)]
enum Command {
    Help,
    Render(RenderCmd),
    Export(ExportCmd),
    List(ListCmd),
    Upload(UploadCmd),
}

#[derive(Debug, Clone)]
struct RenderCmd {
    text: String,
    regenerate: bool,
}

#[derive(Debug, Clone)]
struct ExportCmd {
    text: String,
    out: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct ListCmd {
    prefix: String,
}

#[derive(Debug, Clone)]
struct UploadCmd {
    path: String,
    file: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct RenderBody<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportBody<'a> {
    session_id: &'a str,
    base_name: &'a str,
}

#[derive(Debug)]
enum CliError {
    Args(String),
    Config(String),
    Network(String),
    Decode(String),
    Io(String),
    Api {
        status: u16,
        code: String,
        detail: String,
        request_id: Option<String>,
    },
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Args(msg) => write!(f, "参数错误: {msg}"),
            CliError::Config(msg) => write!(f, "配置错误: {msg}"),
            CliError::Network(msg) => write!(f, "网络错误: {msg}"),
            CliError::Decode(msg) => write!(f, "响应解析失败: {msg}"),
            CliError::Io(msg) => write!(f, "文件读写失败: {msg}"),
            CliError::Api {
                status,
                code,
                detail,
                request_id,
            } => {
                if let Some(rid) = request_id {
                    write!(
                        f,
                        "接口错误: status={status} code={code} detail={detail} requestId={rid}"
                    )
                } else {
                    write!(f, "接口错误: status={status} code={code} detail={detail}")
                }
            }
        }
    }
}

impl std::error::Error for CliError {}

struct ArtApi {
    client: Client,
    base_url: String,
}

/// 下载得到的压缩包
struct Download {
    bytes: Vec<u8>,
    entries: Option<String>,
    skipped: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse(env::args().skip(1).collect())?;
    let Some(cmd) = args.cmd else {
        print_help();
        return Ok(());
    };
    if args.help || matches!(cmd, Command::Help) {
        print_help();
        return Ok(());
    }

    let base_url = args
        .base_url
        .or_else(|| env::var("RANSOM_BASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string();
    let api = ArtApi::new(base_url, args.timeout_secs)?;

    let outcome = match cmd {
        Command::Help => Ok(()),
        Command::Render(cmd) => run_render(&api, cmd, args.json).await,
        Command::Export(cmd) => run_export(&api, cmd, args.json).await,
        Command::List(cmd) => run_list(&api, cmd, args.json).await,
        Command::Upload(cmd) => match resolve_admin_token(args.token) {
            Ok(token) => run_upload(&api, cmd, &token, args.json).await,
            Err(e) => Err(e),
        },
    };

    if let Err(err) = outcome {
        eprintln!("{err}");
        std::process::exit(2);
    }
    Ok(())
}

impl Args {
    fn parse(argv: Vec<String>) -> Result<Self, CliError> {
        let mut help = false;
        let mut json = false;
        let mut base_url = None;
        let mut token = None;
        let mut timeout_secs = DEFAULT_TIMEOUT_SECS;
        let mut idx = 0usize;

        while idx < argv.len() {
            match argv[idx].as_str() {
                "-h" | "--help" => {
                    help = true;
                    idx += 1;
                }
                "--json" => {
                    json = true;
                    idx += 1;
                }
                "--base-url" => {
                    idx += 1;
                    base_url = Some(flag_value(&argv, idx, "--base-url")?);
                    idx += 1;
                }
                "--token" => {
                    idx += 1;
                    token = Some(flag_value(&argv, idx, "--token")?);
                    idx += 1;
                }
                "--timeout-secs" => {
                    idx += 1;
                    let raw = flag_value(&argv, idx, "--timeout-secs")?;
                    timeout_secs = raw.parse::<u64>().map_err(|_| {
                        CliError::Args(format!("--timeout-secs 需要正整数，收到: {raw}"))
                    })?;
                    idx += 1;
                }
                _ => break,
            }
        }

        let cmd = if idx >= argv.len() {
            None
        } else {
            Some(parse_command(&argv[idx], &argv[(idx + 1)..])?)
        };

        Ok(Self {
            help,
            json,
            base_url,
            token,
            timeout_secs,
            cmd,
        })
    }
}

fn flag_value(argv: &[String], idx: usize, flag: &str) -> Result<String, CliError> {
    argv.get(idx)
        .cloned()
        .ok_or_else(|| CliError::Args(format!("缺少 {flag} 的值")))
}

fn parse_command(name: &str, rest: &[String]) -> Result<Command, CliError> {
    match name {
        "render" => parse_render_cmd(rest).map(Command::Render),
        "export" => parse_export_cmd(rest).map(Command::Export),
        "list" => parse_list_cmd(rest).map(Command::List),
        "upload" => parse_upload_cmd(rest).map(Command::Upload),
        "help" => Ok(Command::Help),
        _ => Err(CliError::Args(format!("未知命令: {name}"))),
    }
}

fn parse_render_cmd(rest: &[String]) -> Result<RenderCmd, CliError> {
    let mut text = None;
    let mut regenerate = false;
    for a in rest {
        match a.as_str() {
            "--regenerate" => regenerate = true,
            flag if flag.starts_with("--") => {
                return Err(CliError::Args(format!("render 不支持参数: {flag}")));
            }
            value if text.is_none() => text = Some(value.to_string()),
            extra => return Err(CliError::Args(format!("render 多余的参数: {extra}"))),
        }
    }
    let text = text.ok_or_else(|| CliError::Args("render 需要文本参数".to_string()))?;
    Ok(RenderCmd { text, regenerate })
}

fn parse_export_cmd(rest: &[String]) -> Result<ExportCmd, CliError> {
    let mut text = None;
    let mut out = None;
    let mut idx = 0usize;
    while idx < rest.len() {
        match rest[idx].as_str() {
            "--out" => {
                idx += 1;
                out = Some(PathBuf::from(flag_value(rest, idx, "--out")?));
            }
            flag if flag.starts_with("--") => {
                return Err(CliError::Args(format!("export 不支持参数: {flag}")));
            }
            value if text.is_none() => text = Some(value.to_string()),
            extra => return Err(CliError::Args(format!("export 多余的参数: {extra}"))),
        }
        idx += 1;
    }
    let text = text.ok_or_else(|| CliError::Args("export 需要文本参数".to_string()))?;
    Ok(ExportCmd { text, out })
}

fn parse_list_cmd(rest: &[String]) -> Result<ListCmd, CliError> {
    let mut prefix = String::new();
    let mut idx = 0usize;
    while idx < rest.len() {
        match rest[idx].as_str() {
            "--prefix" => {
                idx += 1;
                prefix = flag_value(rest, idx, "--prefix")?;
            }
            unknown => return Err(CliError::Args(format!("list 不支持参数: {unknown}"))),
        }
        idx += 1;
    }
    Ok(ListCmd { prefix })
}

fn parse_upload_cmd(rest: &[String]) -> Result<UploadCmd, CliError> {
    let mut path = None;
    let mut file = None;
    let mut idx = 0usize;
    while idx < rest.len() {
        match rest[idx].as_str() {
            "--path" => {
                idx += 1;
                path = Some(flag_value(rest, idx, "--path")?);
            }
            "--file" => {
                idx += 1;
                file = Some(PathBuf::from(flag_value(rest, idx, "--file")?));
            }
            unknown => return Err(CliError::Args(format!("upload 不支持参数: {unknown}"))),
        }
        idx += 1;
    }
    Ok(UploadCmd {
        path: path.ok_or_else(|| CliError::Args("upload 缺少 --path".to_string()))?,
        file: file.ok_or_else(|| CliError::Args("upload 缺少 --file".to_string()))?,
    })
}

fn resolve_admin_token(token_from_arg: Option<String>) -> Result<String, CliError> {
    token_from_arg
        .or_else(|| env::var(DEFAULT_ADMIN_TOKEN_ENV).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            CliError::Config(format!(
                "未找到管理员令牌。请使用 --token，或设置环境变量 {DEFAULT_ADMIN_TOKEN_ENV}"
            ))
        })
}

impl ArtApi {
    fn new(base_url: String, timeout_secs: u64) -> Result<Self, CliError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CliError::Config(format!("创建 HTTP Client 失败: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn create_session(&self) -> Result<String, CliError> {
        let req = self
            .client
            .request(Method::POST, self.endpoint("/lettering/sessions"));
        let resp: CreateSessionResponse = self.send_json(req).await?;
        Ok(resp.session_id)
    }

    /// 渲染并等待预加载结束，返回最终状态
    async fn render(
        &self,
        session_id: &str,
        text: &str,
        regenerate: bool,
    ) -> Result<SessionSnapshot, CliError> {
        let action = if regenerate { "regenerate" } else { "render" };
        let req = self
            .client
            .request(
                Method::POST,
                self.endpoint(&format!("/lettering/sessions/{session_id}/{action}")),
            )
            .query(&[("wait", "true")])
            .json(&RenderBody { text });
        self.send_json(req).await
    }

    async fn export(&self, session_id: &str, base_name: &str) -> Result<Download, CliError> {
        let res = self
            .client
            .request(Method::POST, self.endpoint("/export"))
            .json(&ExportBody {
                session_id,
                base_name,
            })
            .send()
            .await
            .map_err(|e| CliError::Network(format!("请求失败: {e}")))?;
        let status = res.status();
        let header = |name: &str| {
            res.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let entries = header("x-export-entries");
        let skipped = header("x-export-skipped");
        let bytes = res
            .bytes()
            .await
            .map_err(|e| CliError::Network(format!("读取响应失败: {e}")))?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &String::from_utf8_lossy(&bytes)));
        }
        Ok(Download {
            bytes: bytes.to_vec(),
            entries,
            skipped,
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>, CliError> {
        let req = self
            .client
            .request(Method::GET, self.endpoint("/assets"))
            .query(&[("prefix", prefix)]);
        self.send_json(req).await
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        admin_token: &str,
    ) -> Result<UploadReceipt, CliError> {
        let req = self
            .client
            .request(
                Method::PUT,
                self.endpoint(&format!("/assets/{}", path.trim_start_matches('/'))),
            )
            .header("X-Admin-Token", admin_token)
            .header(reqwest::header::CONTENT_TYPE, content_type_for(path))
            .body(bytes);
        self.send_json(req).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, CliError> {
        let res = req
            .send()
            .await
            .map_err(|e| CliError::Network(format!("请求失败: {e}")))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| CliError::Network(format!("读取响应失败: {e}")))?;
        if status.is_success() {
            return serde_json::from_str::<T>(&body)
                .map_err(|e| CliError::Decode(format!("{e}; body={body}")));
        }
        Err(api_error(status.as_u16(), &body))
    }
}

fn api_error(status: u16, body: &str) -> CliError {
    if let Ok(problem) = serde_json::from_str::<ProblemDetails>(body) {
        return CliError::Api {
            status: problem.status,
            code: problem.code,
            detail: problem.detail.unwrap_or(problem.title),
            request_id: problem.request_id,
        };
    }
    CliError::Api {
        status,
        code: "UNKNOWN".to_string(),
        detail: body.to_string(),
        request_id: None,
    }
}

async fn run_render(api: &ArtApi, cmd: RenderCmd, as_json: bool) -> Result<(), CliError> {
    let session_id = api.create_session().await?;
    let snapshot = api.render(&session_id, &cmd.text, cmd.regenerate).await?;
    if as_json {
        return print_json(&snapshot);
    }
    print_snapshot(&snapshot);
    Ok(())
}

async fn run_export(api: &ArtApi, cmd: ExportCmd, as_json: bool) -> Result<(), CliError> {
    let session_id = api.create_session().await?;
    api.render(&session_id, &cmd.text, false).await?;
    let download = api.export(&session_id, &cmd.text).await?;

    let out = cmd
        .out
        .unwrap_or_else(|| PathBuf::from(archive_file_name(&cmd.text)));
    tokio::fs::write(&out, &download.bytes)
        .await
        .map_err(|e| CliError::Io(format!("{}: {e}", out.display())))?;

    if as_json {
        return print_json(&serde_json::json!({
            "file": out.display().to_string(),
            "size": download.bytes.len(),
            "entries": download.entries,
            "skipped": download.skipped,
        }));
    }
    println!(
        "已保存 {} ({} 字节，条目 {}，跳过 {})",
        out.display(),
        download.bytes.len(),
        download.entries.as_deref().unwrap_or("-"),
        download.skipped.as_deref().unwrap_or("-")
    );
    Ok(())
}

async fn run_list(api: &ArtApi, cmd: ListCmd, as_json: bool) -> Result<(), CliError> {
    let entries = api.list(&cmd.prefix).await?;
    if as_json {
        return print_json(&entries);
    }
    println!("name\tupdatedAt");
    for e in &entries {
        println!("{}\t{}", e.name, e.updated_at.as_deref().unwrap_or("-"));
    }
    Ok(())
}

async fn run_upload(
    api: &ArtApi,
    cmd: UploadCmd,
    admin_token: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let bytes = tokio::fs::read(&cmd.file)
        .await
        .map_err(|e| CliError::Io(format!("{}: {e}", cmd.file.display())))?;
    let receipt = api.upload(&cmd.path, bytes, admin_token).await?;
    if as_json {
        return print_json(&receipt);
    }
    println!("已上传: {}", receipt.key);
    Ok(())
}

fn print_json<T: Serialize>(data: &T) -> Result<(), CliError> {
    let s = serde_json::to_string_pretty(data)
        .map_err(|e| CliError::Decode(format!("序列化 JSON 失败: {e}")))?;
    println!("{s}");
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    println!("session: {}  generation: {}", snapshot.session_id, snapshot.generation);
    println!("pos\tchar\tstyle\tstatus\timage");
    for view in &snapshot.directives {
        match &view.directive {
            RenderDirective::Space => println!("{}\t␣", view.position),
            RenderDirective::InvalidChar { ch } => println!("{}\t{ch}\t-\tinvalid", view.position),
            RenderDirective::Letter { ch, style, image } => println!(
                "{}\t{ch}\t{style}\t{}\t{}",
                view.position,
                match view.status {
                    Some(LoadStatus::Loaded) => "loaded",
                    Some(LoadStatus::Failed) => "failed",
                    Some(LoadStatus::Pending) | None => "pending",
                },
                image.as_deref().unwrap_or("-")
            ),
        }
    }
    if snapshot.loading {
        println!("（仍有图片在加载）");
    }
}

fn print_help() {
    println!(
        r#"ransom_cli（勒索信文字生成命令行客户端）

全局参数：
  --base-url URL            API 基地址（默认 $RANSOM_BASE_URL，否则 http://127.0.0.1:3940/api/v1）
  --token TOKEN             管理员令牌（仅 upload 使用，Header: X-Admin-Token）
  --timeout-secs N          请求超时秒数（默认 30）
  --json                    JSON 输出（便于脚本集成）
  -h, --help                显示帮助

命令：
  render TEXT
    --regenerate            每个字母重新随机样式

  export TEXT
    --out FILE              保存路径，默认 {{TEXT}}-art.zip

  list
    --prefix P              对象前缀，例如 A 或 "_Special Characters"

  upload
    --path P                bucket 内路径，例如 A/A_01.png
    --file F                本地文件

示例：
  cargo run --bin ransom_cli -- render "Hello 2024"
  cargo run --bin ransom_cli -- export hello --out hello.zip
  cargo run --bin ransom_cli -- list --prefix A
  cargo run --bin ransom_cli -- --token secret upload --path A/A_01.png --file ./A_01.png
"#
    );
}
