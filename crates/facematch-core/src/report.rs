//! Display-ready result table.

use crate::outcome::ComparisonOutcome;
use crate::pair::ImagePair;
use serde::Serialize;
use std::fmt;

const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub pair_id: String,
    pub title: String,
    /// `MATCH`, `NO MATCH` or `-`.
    pub result: String,
    pub similarity: String,
    pub confidence: String,
    pub distance: String,
    /// Inline error for incomplete, undetected or failed pairs.
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ReportRow {
    fn from_pair(pair: &ImagePair) -> Self {
        let mut row = Self {
            pair_id: pair.id.clone(),
            title: pair.title.clone(),
            result: PLACEHOLDER.to_string(),
            similarity: PLACEHOLDER.to_string(),
            confidence: PLACEHOLDER.to_string(),
            distance: PLACEHOLDER.to_string(),
            message: pair.outcome.error_message().map(str::to_string),
            reasoning: None,
        };

        if let ComparisonOutcome::Scored(result) = &pair.outcome {
            row.result = if result.is_match { "MATCH" } else { "NO MATCH" }.to_string();
            row.similarity = format!("{:.2}%", result.similarity);
            row.confidence = match result.confidence {
                Some(c) => format!("{c:.1}%"),
                None => "N/A".to_string(),
            };
            if let Some(d) = result.distance {
                row.distance = format!("{d:.3}");
            }
            row.reasoning = result.reasoning.clone();
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub case_id: Option<String>,
    pub rows: Vec<ReportRow>,
}

impl Report {
    pub fn from_pairs(case_id: Option<String>, pairs: &[ImagePair]) -> Self {
        Self {
            case_id,
            rows: pairs.iter().map(ReportRow::from_pair).collect(),
        }
    }

    pub fn matches(&self) -> usize {
        self.rows.iter().filter(|r| r.result == "MATCH").count()
    }
}

const HEADERS: [&str; 5] = [
    "Comparison Pair",
    "Result",
    "Similarity",
    "Confidence",
    "Distance",
];

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<[&str; 5]> = self
            .rows
            .iter()
            .map(|r| {
                [
                    r.title.as_str(),
                    r.result.as_str(),
                    r.similarity.as_str(),
                    r.confidence.as_str(),
                    r.distance.as_str(),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(str::len);
        for row in &cells {
            for (w, cell) in widths.iter_mut().zip(row.iter()) {
                *w = (*w).max(cell.chars().count());
            }
        }

        if let Some(case_id) = &self.case_id {
            writeln!(f, "Case: {case_id}")?;
        }
        write_row(f, &HEADERS, &widths)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("-+-"))?;

        for (row, cells) in self.rows.iter().zip(cells.iter()) {
            write_row(f, cells, &widths)?;
            if let Some(message) = &row.message {
                writeln!(f, "  ! {message}")?;
            }
            if let Some(reasoning) = &row.reasoning {
                writeln!(f, "  > {reasoning}")?;
            }
        }
        Ok(())
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, cells: &[&str; 5], widths: &[usize; 5]) -> fmt::Result {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, &w)| format!("{cell:<w$}"))
        .collect();
    writeln!(f, "{}", padded.join(" | ").trim_end())
}
