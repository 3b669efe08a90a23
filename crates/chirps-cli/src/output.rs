//! JSON output formatting

use chirps_core::convert::{FailedFile, SkippedFile};
use chirps_core::{CategorySummary, CorpusReport};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct CategoryCounts<'a> {
    category: &'a str,
    matched: Option<u64>,
    fetched: usize,
    already_present: usize,
    fetch_failed: usize,
    converted: usize,
    skipped: usize,
    conversion_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> From<&'a CategorySummary> for CategoryCounts<'a> {
    fn from(summary: &'a CategorySummary) -> Self {
        let fetch = summary.fetch.as_ref();
        let conversion = summary.conversion.as_ref();
        Self {
            category: &summary.category,
            matched: summary.matched,
            fetched: fetch.map(|f| f.fetched).unwrap_or(0),
            already_present: fetch.map(|f| f.skipped).unwrap_or(0),
            fetch_failed: fetch.map(|f| f.failed.len()).unwrap_or(0),
            converted: conversion.map(|c| c.converted.len()).unwrap_or(0),
            skipped: conversion.map(|c| c.skipped.len()).unwrap_or(0),
            conversion_failed: conversion.map(|c| c.failed.len()).unwrap_or(0),
            warning: summary.ambiguous.as_ref().map(|a| a.to_string()),
            error: summary.error.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct ConversionTotals<'a> {
    converted: usize,
    skipped: &'a [SkippedFile],
    failed: &'a [FailedFile],
}

#[derive(Serialize)]
struct RunOutput<'a> {
    status: &'static str,
    categories: Vec<CategoryCounts<'a>>,
    conversion: ConversionTotals<'a>,
}

/// Per-category counts plus the corpus-wide skips and failures
pub fn report_json(report: &CorpusReport) -> serde_json::Result<Value> {
    let status = if report.categories.iter().any(|c| c.error.is_some()) {
        "partial"
    } else {
        "success"
    };
    serde_json::to_value(RunOutput {
        status,
        categories: report.categories.iter().map(CategoryCounts::from).collect(),
        conversion: ConversionTotals {
            converted: report.conversion.converted.len(),
            skipped: &report.conversion.skipped,
            failed: &report.conversion.failed,
        },
    })
}

/// Print the run report as JSON
pub fn print_json_report(report: &CorpusReport) {
    match report_json(report).and_then(|value| serde_json::to_string_pretty(&value)) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing report: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chirps_core::download::FetchReport;
    use chirps_core::ConversionReport;

    #[test]
    fn test_report_json_counts() {
        let report = CorpusReport {
            categories: vec![
                CategorySummary {
                    category: "great_tit".to_string(),
                    matched: Some(120),
                    fetch: Some(FetchReport {
                        fetched: 3,
                        skipped: 2,
                        ..Default::default()
                    }),
                    conversion: Some(ConversionReport::default()),
                    ..Default::default()
                },
                CategorySummary {
                    category: "blue_tit".to_string(),
                    error: Some("request returned status 503".to_string()),
                    ..Default::default()
                },
            ],
            conversion: ConversionReport::default(),
        };

        let json = report_json(&report).unwrap();
        assert_eq!(json["status"], "partial");
        assert_eq!(json["categories"][0]["fetched"], 3);
        assert_eq!(json["categories"][0]["already_present"], 2);
        assert_eq!(json["categories"][0]["matched"], 120);
        assert!(json["categories"][0].get("error").is_none());
        assert_eq!(json["categories"][1]["error"], "request returned status 503");
        assert_eq!(json["conversion"]["converted"], 0);
    }
}
