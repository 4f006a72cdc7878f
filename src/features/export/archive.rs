use std::io::{Cursor, Write};
use std::sync::Arc;

use axum::body::Bytes;
use futures_util::stream::{self, StreamExt};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ExportConfig;
use crate::error::{ExportError, FetchError};
use crate::features::lettering::models::{Letter, RenderDirective};
use crate::storage::ImageFetcher;

/// 打包结果
#[derive(Debug, Clone)]
pub struct ExportedArchive {
    pub bytes: Vec<u8>,
    /// 建议的下载文件名（`{base}-art.zip`）
    pub file_name: String,
    /// 成功写入的条目名（含目录前缀）
    pub entries: Vec<String>,
    /// 拉取失败而被跳过的条目名
    pub skipped: Vec<String>,
}

/// 压缩包导出器：按指令序列重新拉取字母图片（不复用预加载缓存）并打包。
pub struct ArchiveExporter<F> {
    fetcher: Arc<F>,
    folder: String,
    concurrency: usize,
}

impl<F: ImageFetcher> ArchiveExporter<F> {
    pub fn new(fetcher: Arc<F>, cfg: &ExportConfig) -> Self {
        Self {
            fetcher,
            folder: cfg.folder.trim_matches('/').to_string(),
            concurrency: cfg.fetch_concurrency.max(1),
        }
    }

    /// 仅打包字母指令；条目名为 `{letter}_{position}.png`，position 为在整个序列中的 1 基位置。
    /// 单张图片拉取失败只记录日志并跳过，不影响其余条目。
    pub async fn export(
        &self,
        directives: &[RenderDirective],
        base_name: &str,
    ) -> Result<ExportedArchive, ExportError> {
        let jobs: Vec<(String, Option<String>)> = directives
            .iter()
            .enumerate()
            .filter_map(|(index, d)| {
                let letter = d.letter()?;
                Some((entry_name(letter, index), d.image().map(str::to_string)))
            })
            .collect();

        let fetched: Vec<(String, Result<Bytes, FetchError>)> = stream::iter(jobs)
            .map(|(name, url)| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    let result = match url {
                        Some(url) => fetcher.fetch(&url).await,
                        None => Err(FetchError::MissingUrl),
                    };
                    (name, result)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut files = Vec::with_capacity(fetched.len());
        let mut skipped = Vec::new();
        for (name, result) in fetched {
            let path = self.entry_path(&name);
            match result {
                Ok(bytes) => files.push((path, bytes)),
                Err(e) => {
                    tracing::warn!(entry = %path, error = %e, "导出时图片拉取失败，已跳过");
                    skipped.push(path);
                }
            }
        }

        let bytes = write_archive(&self.folder, &files)?;
        let entries: Vec<String> = files.into_iter().map(|(path, _)| path).collect();
        tracing::info!(
            entries = entries.len(),
            skipped = skipped.len(),
            size = bytes.len(),
            "压缩包导出完成"
        );
        Ok(ExportedArchive {
            bytes,
            file_name: archive_file_name(base_name),
            entries,
            skipped,
        })
    }

    fn entry_path(&self, name: &str) -> String {
        if self.folder.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.folder, name)
        }
    }
}

fn entry_name(letter: Letter, index: usize) -> String {
    format!("{}_{}.png", letter, index + 1)
}

fn write_archive(folder: &str, files: &[(String, Bytes)]) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    // PNG 已压缩，直接存储
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    if !folder.is_empty() {
        zip.add_directory(format!("{folder}/"), options)?;
    }
    for (path, bytes) in files {
        zip.start_file(path.as_str(), options)?;
        zip.write_all(bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// `{base}-art.zip`；base 为空时用 `name`，不安全字符替换为 `_`
pub fn archive_file_name(base_name: &str) -> String {
    let cleaned: String = base_name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "name-art.zip".to_string()
    } else {
        format!("{cleaned}-art.zip")
    }
}

#[cfg(test)]
mod tests {
    use super::{ArchiveExporter, archive_file_name};
    use crate::config::ExportConfig;
    use crate::features::lettering::models::RenderDirective;
    use crate::test_support::MockFetcher;
    use std::io::{Cursor, Read};
    use std::sync::Arc;

    fn letter(ch: char, style: u8) -> RenderDirective {
        RenderDirective::Letter {
            ch,
            style,
            image: Some(format!("http://img/{ch}/{ch}_{style:02}.png")),
        }
    }

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        archive.file_names().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn entries_use_one_based_positions_in_full_sequence() {
        let exporter = ArchiveExporter::new(Arc::new(MockFetcher::new()), &ExportConfig::default());
        let directives = vec![
            letter('H', 1),
            RenderDirective::InvalidChar { ch: '@' },
            RenderDirective::Space,
            letter('I', 2),
        ];

        let out = exporter.export(&directives, "hi").await.expect("export");
        assert_eq!(out.file_name, "hi-art.zip");
        assert_eq!(out.entries, ["name-art/H_1.png", "name-art/I_4.png"]);
        assert!(out.skipped.is_empty());

        let mut names = entry_names(&out.bytes);
        names.sort();
        assert_eq!(names, ["name-art/", "name-art/H_1.png", "name-art/I_4.png"]);

        let mut archive = zip::ZipArchive::new(Cursor::new(&out.bytes[..])).expect("zip");
        let mut file = archive.by_name("name-art/H_1.png").expect("entry");
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).expect("read");
        assert!(buf.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn failed_fetches_are_omitted() {
        let exporter = ArchiveExporter::new(
            Arc::new(MockFetcher::new().failing("B/B_02.png")),
            &ExportConfig::default(),
        );
        let directives = vec![
            letter('A', 1),
            letter('B', 2),
            RenderDirective::Letter {
                ch: 'C',
                style: 3,
                image: None,
            },
        ];

        let out = exporter.export(&directives, "").await.expect("export");
        assert_eq!(out.file_name, "name-art.zip");
        assert_eq!(out.entries, ["name-art/A_1.png"]);
        assert_eq!(out.skipped, ["name-art/B_2.png", "name-art/C_3.png"]);
        assert!(out.entries.len() + out.skipped.len() <= 3);
    }

    #[tokio::test]
    async fn all_failures_still_produce_an_archive() {
        let exporter = ArchiveExporter::new(
            Arc::new(MockFetcher::new().fail_all()),
            &ExportConfig::default(),
        );
        let out = exporter
            .export(&[letter('X', 9)], "x")
            .await
            .expect("export");
        assert!(out.entries.is_empty());
        assert_eq!(entry_names(&out.bytes), ["name-art/"]);
    }

    #[test]
    fn file_name_is_sanitized() {
        assert_eq!(archive_file_name("  "), "name-art.zip");
        assert_eq!(archive_file_name("a/b:c"), "a_b_c-art.zip");
        assert_eq!(archive_file_name("..."), "name-art.zip");
        assert_eq!(archive_file_name("Hello World"), "Hello World-art.zip");
    }
}
