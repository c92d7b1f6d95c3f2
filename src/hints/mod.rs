//! Recovery hints attached to empty query results.
//!
//! An empty result is not an error, but it usually means a label filter,
//! metric name, or time range is off. Each backend family gets its own
//! short checklist of things to verify, phrased in terms of the discovery
//! operations a caller can run next.

use crate::backend::DatasourceKind;

const QUERY_PREVIEW_LEN: usize = 100;

/// Build the hint list for an empty result from `kind`.
///
/// Always opens with the generic lead-in and the time-range hint, then the
/// backend-specific checklist, then a preview of the executed query when
/// one is available.
pub fn empty_result_hints(kind: DatasourceKind, query: &str) -> Vec<String> {
    let mut hints = vec![
        "No data found for the panel query. Possible causes and suggestions:".to_string(),
        "- The time range may not contain data; try widening it".to_string(),
    ];

    match kind {
        DatasourceKind::Prometheus => {
            hints.push(
                "- Verify the metric name exists (use list_prometheus_metric_names)".to_string(),
            );
            hints.push(
                "- Check that label selectors match actual label values".to_string(),
            );
            hints.push(
                "- The target may not be scraped; confirm the exporter is up".to_string(),
            );
        }
        DatasourceKind::Loki => {
            hints.push(
                "- Verify the stream selector labels exist (use list_loki_label_names)".to_string(),
            );
            hints.push(
                "- Line filter expressions may be too strict; relax pipeline stages".to_string(),
            );
            hints.push(
                "- Check ingestion volume for the selector (use query_loki_stats)".to_string(),
            );
        }
        DatasourceKind::Clickhouse => {
            hints.push(
                "- Check the table has rows (run a COUNT(*) over the same range)".to_string(),
            );
            hints.push(
                "- Verify column names and types (use describe_clickhouse_table)".to_string(),
            );
            hints.push(
                "- The time filter column may not match the table's timestamp column".to_string(),
            );
        }
        DatasourceKind::Cloudwatch => {
            hints.push(
                "- Verify the namespace, metric name, and dimensions are correct".to_string(),
            );
            hints.push(
                "- Check the query targets the right region and account".to_string(),
            );
            hints.push(
                "- Detailed metrics may have aged out; CloudWatch retention varies by period"
                    .to_string(),
            );
        }
    }

    if !query.is_empty() {
        hints.push(format!("- Query executed: {}", truncate(query, QUERY_PREVIEW_LEN)));
    }

    hints
}

/// Truncate to at most `max` characters, appending an ellipsis when cut.
/// Operates on char boundaries so multi-byte queries never split mid-rune.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
