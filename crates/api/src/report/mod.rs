//! Report emission for finalised runs.
//!
//! Each finalised run produces two artefacts under the reports directory:
//! `inspection-run-<id>.md` and `inspection-run-<id>.pdf`, both carrying
//! the run metadata, the result table in plan order, and the summary line.

mod pdf;

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use inspect_db::models::result::InspectionResult;
use inspect_db::models::run::InspectionRun;

/// Paths of the emitted artefacts.
#[derive(Debug, Clone)]
pub struct ReportArtefacts {
    pub markdown: PathBuf,
    pub pdf: PathBuf,
}

/// Re-sort result rows into the run's plan order.
///
/// Agent-submitted results arrive in submission order; display and report
/// order is the original item-input order. Rows whose item no longer
/// appears in the plan keep their insertion order at the end.
pub fn sort_by_plan(run: &InspectionRun, results: Vec<InspectionResult>) -> Vec<InspectionResult> {
    let plan = run.plan();
    let position = |result: &InspectionResult| -> usize {
        result
            .item_id
            .and_then(|item_id| plan.iter().position(|s| s.item_id == item_id))
            .unwrap_or(usize::MAX)
    };
    let mut sorted = results;
    sorted.sort_by_key(|result| (position(result), result.id));
    sorted
}

/// Render and write both artefacts, returning their paths.
pub fn emit(
    reports_dir: &Path,
    run: &InspectionRun,
    cluster_name: &str,
    results: &[InspectionResult],
) -> io::Result<ReportArtefacts> {
    std::fs::create_dir_all(reports_dir)?;

    let stem = format!("inspection-run-{}", run.id);
    let markdown_path = reports_dir.join(format!("{stem}.md"));
    let pdf_path = reports_dir.join(format!("{stem}.pdf"));

    std::fs::write(&markdown_path, render_markdown(run, cluster_name, results))?;
    std::fs::write(&pdf_path, pdf::render(&text_lines(run, cluster_name, results)))?;

    Ok(ReportArtefacts {
        markdown: markdown_path,
        pdf: pdf_path,
    })
}

/// Sibling Markdown path for a stored PDF report path.
pub fn markdown_path_for(pdf_path: &Path) -> PathBuf {
    pdf_path.with_extension("md")
}

fn completed_display(run: &InspectionRun) -> String {
    run.completed_at
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

fn render_markdown(run: &InspectionRun, cluster_name: &str, results: &[InspectionResult]) -> String {
    let mut out = String::new();
    out.push_str("# Kubernetes Inspection Report\n\n");
    out.push_str(&format!(
        "- Run ID: {} | Operator: {}\n",
        run.id,
        run.operator.as_deref().unwrap_or("N/A")
    ));
    out.push_str(&format!("- Cluster: {cluster_name}\n"));
    out.push_str(&format!(
        "- Created: {} | Completed: {}\n",
        run.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        completed_display(run)
    ));
    out.push_str(&format!("- Status: {}\n\n", run.status));

    out.push_str("| Item | Status | Detail | Suggestion |\n");
    out.push_str("|---|---|---|---|\n");
    for result in results {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            escape_cell(&result.item_name),
            result.status,
            escape_cell(result.detail.as_deref().unwrap_or("")),
            escape_cell(result.suggestion.as_deref().unwrap_or("")),
        ));
    }

    out.push('\n');
    out.push_str(run.summary.as_deref().unwrap_or("No summary provided."));
    out.push('\n');
    out
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Flatten the report into plain text lines for the PDF renderer.
fn text_lines(run: &InspectionRun, cluster_name: &str, results: &[InspectionResult]) -> Vec<String> {
    let mut lines = vec![
        "Kubernetes Inspection Report".to_string(),
        String::new(),
        format!(
            "Run ID: {} | Operator: {}",
            run.id,
            run.operator.as_deref().unwrap_or("N/A")
        ),
        format!("Cluster: {cluster_name}"),
        format!(
            "Created: {} | Completed: {}",
            run.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            completed_display(run)
        ),
        format!("Status: {}", run.status),
        String::new(),
    ];

    for result in results {
        lines.push(format!("[{}] {}", result.status, result.item_name));
        if let Some(detail) = result.detail.as_deref() {
            for wrapped in wrap(detail, 90) {
                lines.push(format!("    {wrapped}"));
            }
        }
        if let Some(suggestion) = result.suggestion.as_deref() {
            for wrapped in wrap(suggestion, 90) {
                lines.push(format!("    -> {wrapped}"));
            }
        }
    }

    lines.push(String::new());
    lines.push(run.summary.clone().unwrap_or_else(|| "No summary provided.".to_string()));
    lines
}

/// Greedy word wrap.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspect_core::item::ItemSnapshot;

    fn run_with_plan(plan: Vec<ItemSnapshot>) -> InspectionRun {
        InspectionRun {
            id: 1,
            cluster_id: 1,
            operator: Some("ops".into()),
            status: "completed".into(),
            executor: "server".into(),
            agent_id: None,
            agent_status: None,
            total_items: plan.len() as i64,
            processed_items: plan.len() as i64,
            progress: 100,
            summary: Some("2 item(s) passed, 0 warning(s), 0 failed".into()),
            report_path: None,
            plan_json: serde_json::to_string(&plan).unwrap(),
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
            lease_expires_at: None,
        }
    }

    fn snapshot(item_id: i64, name: &str) -> ItemSnapshot {
        ItemSnapshot {
            item_id,
            name: name.into(),
            check_type: "command".into(),
            config: serde_json::json!({}),
        }
    }

    fn result(id: i64, item_id: Option<i64>, name: &str) -> InspectionResult {
        InspectionResult {
            id,
            run_id: 1,
            item_id,
            item_name: name.into(),
            status: "passed".into(),
            detail: Some("ok".into()),
            suggestion: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn results_are_sorted_into_plan_order() {
        let run = run_with_plan(vec![snapshot(10, "first"), snapshot(20, "second")]);
        // Arrival order is reversed relative to the plan.
        let sorted = sort_by_plan(&run, vec![result(1, Some(20), "second"), result(2, Some(10), "first")]);
        assert_eq!(sorted[0].item_name, "first");
        assert_eq!(sorted[1].item_name, "second");
    }

    #[test]
    fn orphan_results_sort_last() {
        let run = run_with_plan(vec![snapshot(10, "planned")]);
        let sorted = sort_by_plan(&run, vec![result(1, None, "orphan"), result(2, Some(10), "planned")]);
        assert_eq!(sorted[0].item_name, "planned");
        assert_eq!(sorted[1].item_name, "orphan");
    }

    #[test]
    fn emit_writes_both_artefacts() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_with_plan(vec![snapshot(10, "echo check")]);
        let results = vec![result(1, Some(10), "echo check")];

        let artefacts = emit(dir.path(), &run, "staging", &results).unwrap();
        assert!(artefacts.markdown.exists());
        assert!(artefacts.pdf.exists());

        let markdown = std::fs::read_to_string(&artefacts.markdown).unwrap();
        assert!(markdown.contains("Kubernetes Inspection Report"));
        assert!(markdown.contains("echo check"));
        assert!(markdown.contains("staging"));

        let pdf = std::fs::read(&artefacts.pdf).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn markdown_path_swaps_extension() {
        assert_eq!(
            markdown_path_for(Path::new("/data/reports/inspection-run-3.pdf")),
            PathBuf::from("/data/reports/inspection-run-3.md")
        );
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap("one two three four five six seven", 10);
        assert!(lines.iter().all(|l| l.len() <= 10));
        assert_eq!(lines.join(" "), "one two three four five six seven");
    }
}
