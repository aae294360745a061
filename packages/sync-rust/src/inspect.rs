//! The `viewgrid-inspect` tool: applies a view to a scan page on disk and
//! prints the result as tab-separated text.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use viewgrid_core::{ColumnSetBuilder, OperatorRegistry, ScanPage, ViewId, ViewStore};

use crate::logging::LogFormat;

/// Command-line arguments of `viewgrid-inspect`.
#[derive(Debug, Parser)]
#[command(name = "viewgrid-inspect", about = "Apply a saved view to a scan page")]
pub struct InspectArgs {
    /// Scan page JSON file (`{records, columnTypes}`).
    #[arg(long)]
    pub scan: PathBuf,

    /// View config JSON file. Without it the default view is used.
    #[arg(long, env = "VIEWGRID_VIEWS")]
    pub views: Option<PathBuf>,

    /// View to apply instead of the config's current view.
    #[arg(long)]
    pub view: Option<String>,

    /// Page to print, overriding the view's own page.
    #[arg(long)]
    pub page: Option<u32>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "VIEWGRID_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Runs the tool, writing the header and rows to `out`.
///
/// # Errors
///
/// Returns an error if the scan file cannot be read or decoded, or writing
/// to `out` fails. An unreadable view config falls back to the default view.
pub fn run(args: &InspectArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let raw_page = std::fs::read_to_string(&args.scan)
        .with_context(|| format!("cannot read {}", args.scan.display()))?;
    let page: ScanPage = serde_json::from_str(&raw_page)
        .with_context(|| format!("{} is not a scan page", args.scan.display()))?;

    let mut store = ViewStore::new();
    match &args.views {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(raw) => store.init_store(Some(&raw)),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "view config unreadable");
                store.init_store(None);
            }
        },
        None => store.init_store(None),
    }
    if let Some(id) = &args.view {
        let applied = store.on_current_view_id_change(&ViewId::from(id.as_str()));
        if applied.as_str() != id {
            tracing::warn!(requested = %id, applied = %applied, "view not found");
        }
    }
    if let Some(page) = args.page {
        store.on_current_view_page_change(page);
    }

    let columns = ColumnSetBuilder::new(&page.column_types).build();
    let registry = OperatorRegistry::default();
    let projection = store
        .current_view()
        .project(&columns, &registry, &page.records);

    writeln!(out, "{}", projection.headers().join("\t"))?;
    for row in projection.cells() {
        writeln!(out, "{}", row.join("\t"))?;
    }
    tracing::info!(
        view = %store.current_view_id(),
        shown = projection.page.rows.len(),
        total = projection.page.total,
        page = projection.page.page,
        pages = projection.page.page_count,
        "view applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn scan_file() -> NamedTempFile {
        write_temp(
            r#"{
                "records": [
                    {"id": "1", "values": {"status": "SUCCESS", "duration": 5}},
                    {"id": "2", "values": {"status": "FAILED", "duration": 7}},
                    {"id": "3", "values": {"status": "SUCCESS", "duration": 10}}
                ],
                "columnTypes": [
                    {"name": "status", "type": "STRING"},
                    {"name": "duration", "type": "INT"}
                ]
            }"#,
        )
    }

    fn args(scan: &NamedTempFile, views: Option<&NamedTempFile>) -> InspectArgs {
        InspectArgs {
            scan: scan.path().to_path_buf(),
            views: views.map(|f| f.path().to_path_buf()),
            view: None,
            page: None,
            log_format: LogFormat::Text,
        }
    }

    fn output(args: &InspectArgs) -> String {
        let mut out = Vec::new();
        run(args, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn default_view_prints_every_row_and_column() {
        let scan = scan_file();
        let text = output(&args(&scan, None));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "status\tduration");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn saved_view_filters_sorts_and_selects_columns() {
        let scan = scan_file();
        let views = write_temp(
            r#"{"views":[{"id":"ok","name":"Successes","columns":["duration"],
                "sortBy":"duration","sortDirection":"DESC",
                "filters":[{"property":"status","operator":"EQUAL","value":"SUCCESS"}]}],
               "currentViewId":"ok"}"#,
        );
        assert_eq!(output(&args(&scan, Some(&views))), "duration\n10\n5\n");
    }

    #[test]
    fn unknown_view_and_unreadable_config_fall_back() {
        let scan = scan_file();
        let mut a = args(&scan, None);
        a.views = Some(PathBuf::from("/nonexistent/views.json"));
        a.view = Some("missing".into());
        assert_eq!(output(&a).lines().count(), 4);
    }

    #[test]
    fn missing_scan_file_is_an_error() {
        let scan = scan_file();
        let mut a = args(&scan, None);
        a.scan = PathBuf::from("/nonexistent/scan.json");
        assert!(run(&a, &mut Vec::new()).is_err());
    }

    #[test]
    fn args_parse_from_command_line() {
        let parsed = InspectArgs::try_parse_from([
            "viewgrid-inspect",
            "--scan",
            "page.json",
            "--view",
            "v1",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(parsed.view.as_deref(), Some("v1"));
        assert_eq!(parsed.log_format, LogFormat::Json);
    }
}
