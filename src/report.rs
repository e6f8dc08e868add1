//! Score aggregation and reporting
//!
//! Turns summarized TCAV results into a ranked list of `(concept, score)`
//! pairs and prints them.

use std::io::Write;

use serde::Serialize;

use crate::error::ReportError;
use crate::summary::{ConceptSummary, Summarizer};
use crate::tcav::TcavResult;

/// Width of the longest bar in the text chart
const CHART_WIDTH: usize = 40;

/// A concept and its importance score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub concept: String,
    pub score: f64,
}

/// Ranked scores for a run
#[derive(Debug, Clone)]
pub struct Ranking {
    /// All concepts, highest score first
    pub all: Vec<ScoreRecord>,
    /// The first `n` entries of `all`
    pub top: Vec<ScoreRecord>,
    /// Per-concept statistics behind the scores
    pub summaries: Vec<ConceptSummary>,
}

/// One score per concept: the best across bottlenecks, in first-seen order
fn best_per_concept(summaries: &[ConceptSummary]) -> Vec<ScoreRecord> {
    let mut records: Vec<ScoreRecord> = Vec::new();
    for summary in summaries {
        let score = summary.score();
        match records.iter_mut().find(|r| r.concept == summary.concept) {
            Some(record) => record.score = record.score.max(score),
            None => records.push(ScoreRecord {
                concept: summary.concept.clone(),
                score,
            }),
        }
    }
    records
}

/// Sort descending (stable) and take the first `n`, or everything when `n` is None
pub fn rank(mut records: Vec<ScoreRecord>, n: Option<usize>) -> Result<Ranking, ReportError> {
    records.sort_by(|a, b| b.score.total_cmp(&a.score));

    let available = records.len();
    let n = n.unwrap_or(available);
    if n == 0 || n > available {
        return Err(ReportError::InvalidCount {
            requested: n,
            available,
        });
    }

    Ok(Ranking {
        top: records[..n].to_vec(),
        all: records,
        summaries: Vec::new(),
    })
}

/// Summarize results, then rank them
pub fn aggregate(
    results: &[TcavResult],
    random_experiments: usize,
    n: Option<usize>,
    summarizer: &dyn Summarizer,
) -> Result<Ranking, ReportError> {
    let summaries = summarizer.summarize(results, random_experiments);
    let mut ranking = rank(best_per_concept(&summaries), n)?;
    ranking.summaries = summaries;
    Ok(ranking)
}

/// Round to 4 decimals, printed with at least one decimal and no trailing zeros
pub fn format_score(score: f64) -> String {
    let formatted = format!("{:.4}", (score * 10_000.0).round() / 10_000.0);
    let trimmed = formatted.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}

/// Write the top-N report
pub fn write_report(out: &mut impl Write, target: &str, top: &[ScoreRecord]) -> std::io::Result<()> {
    writeln!(out, "\nMax TCAV score(s) for target '{target}':")?;
    for record in top {
        writeln!(out, "- {}: {}", record.concept, format_score(record.score))?;
    }
    writeln!(out)
}

/// Horizontal bar chart of every concept, in ranking order
///
/// `*` marks concepts that failed the significance test.
pub fn render_chart(target: &str, ranking: &Ranking) -> String {
    let label_width = ranking
        .all
        .iter()
        .map(|r| r.concept.len())
        .max()
        .unwrap_or(0);
    let max_score = ranking
        .summaries
        .iter()
        .map(|s| s.mean)
        .chain(ranking.all.iter().map(|r| r.score))
        .fold(0.0_f64, f64::max);

    let mut chart = format!("TCAV scores for '{target}'\n");
    for record in &ranking.all {
        let summary = ranking
            .summaries
            .iter()
            .filter(|s| s.concept == record.concept)
            .max_by(|a, b| a.score().total_cmp(&b.score()));
        let (mean, std, significant) = match summary {
            Some(s) => (s.mean, s.std, s.significant),
            None => (record.score, 0.0, true),
        };
        let len = if max_score > 0.0 {
            ((mean / max_score) * CHART_WIDTH as f64).round() as usize
        } else {
            0
        };
        chart.push_str(&format!(
            "{:>width$} | {:<bar$} {:.3} ±{:.3}{}\n",
            record.concept,
            "█".repeat(len),
            mean,
            std,
            if significant { "" } else { " *" },
            width = label_width,
            bar = CHART_WIDTH,
        ));
    }
    chart
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(scores: &[(&str, f64)]) -> Vec<ScoreRecord> {
        scores
            .iter()
            .map(|(c, s)| ScoreRecord {
                concept: (*c).to_string(),
                score: *s,
            })
            .collect()
    }

    #[test]
    fn test_rank_sorts_descending_and_truncates() {
        let ranking = rank(
            records(&[("a", 0.2), ("b", 0.9), ("c", 0.5)]),
            Some(2),
        )
        .unwrap();
        assert_eq!(ranking.top.len(), 2);
        assert_eq!(ranking.top[0].concept, "b");
        assert_eq!(ranking.top[1].concept, "c");
        assert_eq!(ranking.all.len(), 3);
    }

    #[test]
    fn test_rank_ties_keep_input_order() {
        let ranking = rank(records(&[("x", 0.5), ("y", 0.5), ("z", 0.7)]), None).unwrap();
        let order: Vec<&str> = ranking.all.iter().map(|r| r.concept.as_str()).collect();
        assert_eq!(order, vec!["z", "x", "y"]);
    }

    #[test]
    fn test_rank_rejects_bad_counts() {
        assert_eq!(
            rank(records(&[("a", 0.1)]), Some(2)).unwrap_err(),
            ReportError::InvalidCount {
                requested: 2,
                available: 1
            }
        );
        assert!(rank(records(&[("a", 0.1)]), Some(0)).is_err());
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(0.5), "0.5");
        assert_eq!(format_score(1.0), "1.0");
        assert_eq!(format_score(0.123_456), "0.1235");
        assert_eq!(format_score(0.0), "0.0");
        assert_eq!(format_score(0.10004), "0.1");
    }

    #[test]
    fn test_write_report_format() {
        let mut out = Vec::new();
        write_report(&mut out, "zebra", &records(&[("striped", 0.9), ("dotted", 0.25)])).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "\nMax TCAV score(s) for target 'zebra':\n- striped: 0.9\n- dotted: 0.25\n\n"
        );
    }

    #[test]
    fn test_chart_lists_every_concept() {
        let ranking = rank(records(&[("striped", 0.8), ("dotted", 0.4)]), None).unwrap();
        let chart = render_chart("zebra", &ranking);
        assert_eq!(chart.lines().count(), 3);
        assert!(chart.contains("striped | "));
    }
}
