//! Reads MOSS result pages and folds them into per-artifact-pair similarity reports.
//!
//! Every uploaded file is named `<artifact>/<path>`, so the segment before the
//! first slash identifies which artifact (repository checkout or text
//! submission) a match belongs to.

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::{Client, redirect};
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table tr").expect("static selector"));
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("static selector"));
static TH_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").expect("static selector"));
static A_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("static selector"));
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").expect("static selector"));
static PCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<name>.+?)\s*\((?P<pct>\d+)%\)\s*$").expect("static regex"));
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<artifact>[^/]+)(?:/(?P<file>.*))?$").expect("static regex"));

/// Control how the report is produced.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Keep only matches with at least this many lines.
    pub min_lines: i64,
    /// Include per-file match details in each artifact-pair report.
    pub include_matches: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            min_lines: 0,
            include_matches: true,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PairRef {
    pub raw: String,
    pub artifact: Option<String>,
    pub filename: Option<String>,
    pub percent: Option<u32>,
    pub href: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MossPair {
    pub file1: PairRef,
    pub file2: PairRef,
    pub lines_matched: i64,
    pub match_href: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FileMatchRow {
    pub a_filename: String,
    pub b_filename: String,
    pub percent: Option<u32>,
    pub lines_matched: i64,
    pub match_href: String,
}

/// Aggregated similarity between two artifacts; `artifact_a <= artifact_b`.
#[derive(Debug, Serialize, PartialEq)]
pub struct ArtifactPairReport {
    pub artifact_a: String,
    pub artifact_b: String,
    pub total_lines_matched: i64,
    /// Line-weighted mean of the per-file percentages, one decimal.
    pub total_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<FileMatchRow>>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Output {
    pub title: Option<String>,
    pub reports: Vec<ArtifactPairReport>,
}

/// Fetches a MOSS result page and parses it.
pub async fn parse_moss(url: &str, opts: &ParseOptions) -> Result<Output> {
    let html = fetch_html(url).await?;
    Ok(parse_report_html(&html, opts))
}

/// Parses the HTML of a MOSS result index page.
pub fn parse_report_html(html: &str, opts: &ParseOptions) -> Output {
    let doc = Html::parse_document(html);

    let mut pairs = extract_pairs(&doc);
    pairs.retain(|p| p.file1.artifact.is_some() && p.file1.artifact != p.file2.artifact);

    if opts.min_lines > 0 {
        pairs.retain(|p| p.lines_matched >= opts.min_lines);
    }

    let pairs = dedupe_pairs_keep_best(pairs);
    let reports = group_by_artifact_pair(pairs, opts.include_matches);
    tracing::debug!(reports = reports.len(), "Parsed MOSS report");

    Output {
        title: extract_title(&doc),
        reports,
    }
}

pub async fn fetch_html(url: &str) -> Result<String> {
    let client = Client::builder()
        .user_agent(concat!("plagiarism-checker/", env!("CARGO_PKG_VERSION"), " reqwest"))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .http1_only()
        .redirect(redirect::Policy::limited(10))
        .build()
        .context("building HTTP client")?;

    let resp = client
        .get(url)
        .timeout(std::time::Duration::from_secs(20))
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .context("non-success status")?;

    let bytes = resp.bytes().await.context("reading body")?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn extract_title(doc: &Html) -> Option<String> {
    doc.select(&TITLE_SEL)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
}

fn extract_pairs(doc: &Html) -> Vec<MossPair> {
    let mut out = Vec::new();
    for (row_idx, tr) in doc.select(&ROW_SEL).enumerate() {
        if row_idx == 0 && tr.select(&TH_SEL).next().is_some() {
            continue;
        }

        let mut tds = tr.select(&TD_SEL);
        let (Some(td1), Some(td2), Some(td3)) = (tds.next(), tds.next(), tds.next()) else {
            continue;
        };

        let (Some(file1), Some(file2)) = (cell_ref(td1), cell_ref(td2)) else {
            continue;
        };

        let lines_matched = td3
            .text()
            .collect::<String>()
            .trim()
            .parse::<i64>()
            .unwrap_or(0);

        let match_href = file1.href.clone();
        out.push(MossPair {
            file1,
            file2,
            lines_matched,
            match_href,
        });
    }
    out
}

fn cell_ref(td: scraper::ElementRef<'_>) -> Option<PairRef> {
    let a = td.select(&A_SEL).next()?;
    let href = a.value().attr("href").unwrap_or("").to_string();
    let text = a.text().collect::<String>().trim().to_string();
    let (raw, percent) = parse_name_and_pct(&text);
    let (artifact, filename) = split_name(&raw);
    Some(PairRef {
        raw,
        artifact,
        filename,
        percent,
        href,
    })
}

/// `"<artifact>/<file>"` -> (artifact, file). A trailing slash or bare name yields no file.
fn split_name(s: &str) -> (Option<String>, Option<String>) {
    let s = s.trim_start_matches("./");
    match NAME_RE.captures(s) {
        Some(c) => {
            let artifact = c.name("artifact").map(|m| m.as_str().to_string());
            let file = c
                .name("file")
                .map(|m| m.as_str().trim_end_matches('/').to_string())
                .filter(|f| !f.is_empty());
            (artifact, file)
        }
        None => (None, None),
    }
}

fn parse_name_and_pct(s: &str) -> (String, Option<u32>) {
    match PCT_RE.captures(s) {
        Some(c) => {
            let name = c
                .name("name")
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| s.to_string());
            let pct = c.name("pct").and_then(|m| m.as_str().parse::<u32>().ok());
            (name, pct)
        }
        None => (s.to_string(), None),
    }
}

fn canonical_file_key(a: &PairRef, b: &PairRef) -> (String, String) {
    if a.raw <= b.raw {
        (a.raw.clone(), b.raw.clone())
    } else {
        (b.raw.clone(), a.raw.clone())
    }
}

fn dedupe_pairs_keep_best(pairs: Vec<MossPair>) -> Vec<MossPair> {
    let mut best: HashMap<(String, String), MossPair> = HashMap::new();
    for p in pairs {
        let key = canonical_file_key(&p.file1, &p.file2);
        match best.get_mut(&key) {
            None => {
                best.insert(key, p);
            }
            Some(existing) => {
                if p.lines_matched > existing.lines_matched
                    || (p.lines_matched == existing.lines_matched
                        && p.match_href < existing.match_href)
                {
                    *existing = p;
                }
            }
        }
    }
    let mut out: Vec<MossPair> = best.into_values().collect();
    out.sort_by(|a, b| {
        canonical_file_key(&a.file1, &a.file2)
            .cmp(&canonical_file_key(&b.file1, &b.file2))
            .then(b.lines_matched.cmp(&a.lines_matched))
    });
    out
}

fn group_by_artifact_pair(pairs: Vec<MossPair>, include_matches: bool) -> Vec<ArtifactPairReport> {
    let mut by_pair: HashMap<(String, String), Vec<MossPair>> = HashMap::new();

    for p in pairs {
        let (Some(ka), Some(kb)) = (p.file1.artifact.clone(), p.file2.artifact.clone()) else {
            continue;
        };
        if ka == kb {
            continue;
        }
        let (a, b, p) = if ka <= kb {
            (ka, kb, p)
        } else {
            (
                kb,
                ka,
                MossPair {
                    file1: p.file2,
                    file2: p.file1,
                    lines_matched: p.lines_matched,
                    match_href: p.match_href,
                },
            )
        };
        by_pair.entry((a, b)).or_default().push(p);
    }

    let mut reports: Vec<ArtifactPairReport> = Vec::new();
    for ((artifact_a, artifact_b), group) in by_pair {
        let mut total_lines_matched: i64 = 0;
        let mut weighted_sum: f64 = 0.0;
        let mut weight_lines: i64 = 0;
        let mut unweighted_max: Option<u32> = None;
        let mut rows: Vec<FileMatchRow> = Vec::new();

        for p in group {
            total_lines_matched += p.lines_matched;

            let percent = match (p.file1.percent, p.file2.percent) {
                (Some(x), Some(y)) => Some(x.max(y)),
                (x, y) => x.or(y),
            };

            if let Some(pct) = percent {
                weighted_sum += f64::from(pct) * (p.lines_matched as f64);
                weight_lines += p.lines_matched;
                unweighted_max = Some(unweighted_max.map_or(pct, |m| m.max(pct)));
            }

            if include_matches {
                rows.push(FileMatchRow {
                    a_filename: p.file1.filename.unwrap_or(p.file1.raw),
                    b_filename: p.file2.filename.unwrap_or(p.file2.raw),
                    percent,
                    lines_matched: p.lines_matched,
                    match_href: p.match_href,
                });
            }
        }

        if include_matches {
            rows.sort_by(|x, y| {
                y.lines_matched
                    .cmp(&x.lines_matched)
                    .then(x.a_filename.cmp(&y.a_filename))
                    .then(x.b_filename.cmp(&y.b_filename))
            });
        }

        // Rows with a zero line count still carry a percentage.
        let total_percent = if weight_lines > 0 {
            let v = weighted_sum / (weight_lines as f64);
            Some((v * 10.0).round() / 10.0)
        } else {
            unweighted_max.map(f64::from)
        };

        reports.push(ArtifactPairReport {
            artifact_a,
            artifact_b,
            total_lines_matched,
            total_percent,
            matches: include_matches.then_some(rows),
        });
    }

    reports.sort_by(|a, b| {
        b.total_lines_matched
            .cmp(&a.total_lines_matched)
            .then(a.artifact_a.cmp(&b.artifact_a))
            .then(a.artifact_b.cmp(&b.artifact_b))
    });

    reports
}
