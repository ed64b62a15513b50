//! Analyzer backed by the Stanford MOSS service.
//!
//! Each artifact is sent as a directory named after its key so the report can
//! be folded back into artifact pairs by `moss_parser`.

use super::{
    Analyzer, AnalyzerError, AnalyzerLanguage, AnalyzerRequest, RawComparison, RawComparisonSet,
};
use async_trait::async_trait;
use moss_parser::{Output, ParseOptions};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};
use walkdir::WalkDir;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct MossAnalyzer {
    user_id: String,
    server: String,
    port: u16,
    /// -m: matches of a passage before it is ignored as shared code.
    pub max_matches: u32,
    /// -n: number of pairs in the report.
    pub show_limit: u32,
}

impl MossAnalyzer {
    pub fn new(user_id: &str, server: &str, port: u16) -> Self {
        Self {
            user_id: user_id.to_string(),
            server: server.to_string(),
            port,
            max_matches: 10,
            show_limit: 250,
        }
    }

    pub fn from_config() -> Self {
        let mut moss = Self::new(
            &util::config::moss_user_id(),
            &util::config::moss_server(),
            util::config::moss_port(),
        );
        moss.show_limit = moss.show_limit.max(util::config::max_comparisons() as u32);
        moss
    }

    /// Uploads everything and returns the report URL.
    pub async fn submit(&self, request: &AnalyzerRequest) -> Result<String, AnalyzerError> {
        if self.user_id.trim().is_empty() {
            return Err(AnalyzerError::Rejected("MOSS_USER_ID is not configured".into()));
        }
        if request.inputs.len() < 2 {
            return Err(AnalyzerError::Rejected(
                "at least 2 submissions are needed for a comparison".into(),
            ));
        }

        let language = moss_language(request.language);
        let extensions = match request.language {
            AnalyzerLanguage::Program(l) => Some(l.file_extensions()),
            AnalyzerLanguage::Text => None,
        };

        let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((self.server.as_str(), self.port)))
            .await
            .map_err(|_| AnalyzerError::Protocol(format!("connecting to {} timed out", self.server)))??;

        send_command(&mut stream, &format!("moss {}", self.user_id)).await?;
        send_command(&mut stream, "directory 1").await?;
        send_command(&mut stream, "X 0").await?;
        send_command(&mut stream, &format!("maxmatches {}", self.max_matches)).await?;
        send_command(&mut stream, &format!("show {}", self.show_limit)).await?;
        send_command(&mut stream, &format!("language {language}")).await?;

        let ack = read_line(&mut stream).await?;
        if ack.trim() == "no" {
            return Err(AnalyzerError::Rejected(format!(
                "language '{language}' not supported by MOSS"
            )));
        }

        if let Some(base) = &request.baseline {
            for (path, rel) in collect_files(base, extensions) {
                let name = format!("template/{rel}");
                upload_file(&mut stream, 0, language, &name, &path).await?;
            }
        }

        let mut file_id = 1u32;
        for input in &request.inputs {
            let files = collect_files(&input.path, extensions);
            if files.is_empty() {
                debug!(key = %input.key, "No comparable files in artifact");
            }
            for (path, rel) in files {
                let name = format!("{}/{rel}", input.key);
                upload_file(&mut stream, file_id, language, &name, &path).await?;
                file_id += 1;
            }
        }

        send_command(&mut stream, "query 0 ").await?;
        let response = read_line(&mut stream).await?;
        send_command(&mut stream, "end").await?;

        let url = response.trim().to_string();
        if !url.starts_with("http") {
            return Err(AnalyzerError::Protocol(format!(
                "invalid response from MOSS server: '{url}'"
            )));
        }
        info!(files = file_id - 1, %url, "MOSS run finished");
        Ok(url)
    }
}

#[async_trait]
impl Analyzer for MossAnalyzer {
    fn name(&self) -> &str {
        "moss"
    }

    async fn analyze(&self, request: &AnalyzerRequest) -> Result<RawComparisonSet, AnalyzerError> {
        let url = self.submit(request).await?;
        let opts = ParseOptions {
            min_lines: 0,
            include_matches: false,
        };
        let report = moss_parser::parse_moss(&url, &opts)
            .await
            .map_err(|e| AnalyzerError::Report(format!("{e:#}")))?;
        Ok(comparisons_from_report(&report, request))
    }
}

/// Turns per-artifact-pair percentages into unit similarities at or above the threshold.
/// Pairs naming unknown keys are ignored.
pub fn comparisons_from_report(report: &Output, request: &AnalyzerRequest) -> RawComparisonSet {
    let keys: HashSet<&str> = request.inputs.iter().map(|i| i.key.as_str()).collect();
    let comparisons = report
        .reports
        .iter()
        .filter(|r| keys.contains(r.artifact_a.as_str()) && keys.contains(r.artifact_b.as_str()))
        .filter_map(|r| {
            let similarity = (r.total_percent? / 100.0).clamp(0.0, 1.0) as f32;
            (similarity >= request.threshold).then(|| RawComparison {
                key_a: r.artifact_a.clone(),
                key_b: r.artifact_b.clone(),
                similarity,
            })
        })
        .collect();
    RawComparisonSet { comparisons }
}

fn moss_language(language: AnalyzerLanguage) -> &'static str {
    match language {
        AnalyzerLanguage::Program(l) => l.to_moss(),
        AnalyzerLanguage::Text => "ascii",
    }
}

/// Files under `root` (or `root` itself) with their `/`-separated relative names.
fn collect_files(root: &Path, extensions: Option<&[&str]>) -> Vec<(PathBuf, String)> {
    if root.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "submission.txt".into());
        return vec![(root.to_path_buf(), sanitize(&name))];
    }

    let mut files: Vec<(PathBuf, String)> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| match extensions {
            None => true,
            Some(exts) => {
                let name = e.file_name().to_string_lossy().to_ascii_lowercase();
                exts.iter().any(|x| name.ends_with(&format!(".{x}")))
            }
        })
        .filter_map(|e| {
            let rel = e.path().strip_prefix(root).ok()?;
            let rel = rel.to_string_lossy().replace('\\', "/");
            Some((e.path().to_path_buf(), sanitize(&rel)))
        })
        .collect();
    files.sort_by(|a, b| a.1.cmp(&b.1));
    files
}

fn sanitize(s: &str) -> String {
    s.trim_start_matches('/').replace(' ', "_")
}

async fn send_command(stream: &mut TcpStream, command: &str) -> Result<(), AnalyzerError> {
    stream
        .write_all(format!("{command}\n").as_bytes())
        .await
        .map_err(|e| AnalyzerError::Protocol(format!("failed to send '{command}': {e}")))
}

async fn read_line(stream: &mut TcpStream) -> Result<String, AnalyzerError> {
    let mut line = String::new();
    let mut reader = BufReader::new(stream);
    reader
        .read_line(&mut line)
        .await
        .map_err(|e| AnalyzerError::Protocol(format!("failed to read server response: {e}")))?;
    Ok(line)
}

async fn upload_file(
    stream: &mut TcpStream,
    file_id: u32,
    language: &str,
    display_name: &str,
    path: &Path,
) -> Result<(), AnalyzerError> {
    let content = tokio::fs::read(path).await?;
    let header = format!("file {file_id} {language} {} {display_name}", content.len());
    send_command(stream, &header).await?;
    stream
        .write_all(&content)
        .await
        .map_err(|e| AnalyzerError::Protocol(format!("failed to upload {display_name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerInput;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use util::languages::Language;

    /// Speaks just enough of the MOSS protocol to record uploads.
    async fn fake_moss(accept_language: bool) -> (u16, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let mut headers = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                let line = line.trim_end().to_string();
                if line.starts_with("language") {
                    let reply: &[u8] = if accept_language { b"yes\n" } else { b"no\n" };
                    reader.get_mut().write_all(reply).await.unwrap();
                } else if line.starts_with("file") {
                    let size: usize = line.split(' ').nth(3).unwrap().parse().unwrap();
                    let mut body = vec![0u8; size];
                    reader.read_exact(&mut body).await.unwrap();
                } else if line.starts_with("query") {
                    reader
                        .get_mut()
                        .write_all(b"http://moss.example/results/1\n")
                        .await
                        .unwrap();
                }
                let done = line == "end";
                headers.push(line);
                if done {
                    break;
                }
            }
            headers
        });
        (port, handle)
    }

    fn request(td: &TempDir) -> AnalyzerRequest {
        let a = td.path().join("a");
        let b = td.path().join("b");
        let t = td.path().join("t");
        for d in [&a, &b, &t] {
            std::fs::create_dir_all(d.join(".git")).unwrap();
            std::fs::write(d.join(".git/HEAD"), "ref").unwrap();
        }
        std::fs::write(a.join("Main.java"), "class A {}").unwrap();
        std::fs::write(a.join("notes.txt"), "ignored").unwrap();
        std::fs::write(b.join("Main.java"), "class B {}").unwrap();
        std::fs::write(t.join("Main.java"), "class T {}").unwrap();
        AnalyzerRequest {
            language: AnalyzerLanguage::Program(Language::Java),
            inputs: vec![
                AnalyzerInput { key: "1-u1".into(), path: a },
                AnalyzerInput { key: "2-u2".into(), path: b },
            ],
            baseline: Some(t),
            threshold: 0.5,
            clustering: false,
        }
    }

    #[tokio::test]
    async fn submit_uploads_baseline_and_keyed_directories() {
        let td = TempDir::new().unwrap();
        let (port, server) = fake_moss(true).await;
        let moss = MossAnalyzer::new("12345", "127.0.0.1", port);

        let url = moss.submit(&request(&td)).await.unwrap();
        assert_eq!(url, "http://moss.example/results/1");

        let headers = server.await.unwrap();
        assert_eq!(headers[0], "moss 12345");
        assert_eq!(headers[1], "directory 1");
        assert!(headers.contains(&"language java".to_string()));
        let files: Vec<&String> = headers.iter().filter(|h| h.starts_with("file")).collect();
        assert_eq!(files.len(), 3);
        assert!(files[0].starts_with("file 0 java") && files[0].ends_with("template/Main.java"));
        assert!(files[1].starts_with("file 1 java") && files[1].ends_with("1-u1/Main.java"));
        assert!(files[2].starts_with("file 2 java") && files[2].ends_with("2-u2/Main.java"));
        assert_eq!(headers.last().map(String::as_str), Some("end"));
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected() {
        let td = TempDir::new().unwrap();
        let (port, _server) = fake_moss(false).await;
        let moss = MossAnalyzer::new("12345", "127.0.0.1", port);
        let err = moss.submit(&request(&td)).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Rejected(_)));
    }

    #[tokio::test]
    async fn missing_user_id_is_rejected_before_connecting() {
        let td = TempDir::new().unwrap();
        let moss = MossAnalyzer::new("", "127.0.0.1", 1);
        let err = moss.submit(&request(&td)).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Rejected(m) if m.contains("MOSS_USER_ID")));
    }

    #[test]
    fn report_pairs_are_scaled_and_thresholded() {
        let html = r#"<table>
<tr><th>File 1</th><th>File 2</th><th>Lines Matched</th></tr>
<tr><td><a href="m0.html">1-u1/Main.java (80%)</a></td><td><a href="m0.html">2-u2/Main.java (60%)</a></td><td>20</td></tr>
<tr><td><a href="m1.html">1-u1/Main.java (30%)</a></td><td><a href="m1.html">3-u3/Main.java (20%)</a></td><td>5</td></tr>
<tr><td><a href="m2.html">2-u2/Main.java (90%)</a></td><td><a href="m2.html">template/Main.java (90%)</a></td><td>9</td></tr>
</table>"#;
        let report = moss_parser::parse_report_html(html, &ParseOptions::default());
        let mut req = AnalyzerRequest {
            language: AnalyzerLanguage::Text,
            inputs: ["1-u1", "2-u2", "3-u3"]
                .into_iter()
                .map(|k| AnalyzerInput { key: k.into(), path: PathBuf::from(k) })
                .collect(),
            baseline: None,
            threshold: 0.5,
            clustering: false,
        };

        let set = comparisons_from_report(&report, &req);
        assert_eq!(
            set.comparisons,
            vec![RawComparison { key_a: "1-u1".into(), key_b: "2-u2".into(), similarity: 0.8 }]
        );

        req.threshold = 0.0;
        assert_eq!(comparisons_from_report(&report, &req).comparisons.len(), 2);
    }
}
