//! Wire types of the remote record scan.

use serde::{Deserialize, Serialize};

use crate::filter::{Filter, SortDirection};
use crate::schema::ColumnSchema;
use crate::value::Record;
use crate::view::View;

/// A scan request derived from a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// Offset of the first row.
    pub start: u64,
    /// Maximum rows to return; 0 means no limit.
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl ScanRequest {
    /// The request for `view`'s current page, or for `cursor` when
    /// continuing from a previous page's `nextCursor`.
    #[must_use]
    pub fn from_view(view: &View, cursor: Option<u64>) -> Self {
        let start =
            cursor.unwrap_or_else(|| u64::from(view.page) * u64::from(view.page_size));
        Self {
            start,
            limit: view.page_size,
            sort_by: view.sort_by.clone(),
            sort_direction: view.sort_direction,
            filters: view.filters.clone(),
        }
    }
}

/// One page of scan results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPage {
    #[serde(default)]
    pub records: Vec<Record>,
    /// Schemas observed so far; may grow between calls.
    #[serde(default)]
    pub column_types: Vec<ColumnSchema>,
    /// Offset to continue from, absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub next_cursor: Option<u64>,
    /// Total matching rows, when the source knows it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator;
    use crate::view::ViewId;

    #[test]
    fn request_follows_view_pagination_and_query() {
        let mut view = View::new(ViewId::from("v"), "V");
        view.page = 3;
        view.page_size = 20;
        view.sort_by = Some("duration".into());
        view.sort_direction = SortDirection::Desc;
        view.filters = vec![Filter::new("status", operator::EQUAL, "SUCCESS")];

        let request = ScanRequest::from_view(&view, None);
        assert_eq!(request.start, 60);
        assert_eq!(request.limit, 20);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sortBy"], "duration");
        assert_eq!(json["sortDirection"], "DESC");
        assert_eq!(json["filters"][0]["operator"], "EQUAL");

        assert_eq!(ScanRequest::from_view(&view, Some(7)).start, 7);
    }

    #[test]
    fn page_decodes_with_missing_fields_and_null_values() {
        let page: ScanPage = serde_json::from_str(
            r#"{"records":[{"id":"1","values":{"status":"OK","gone":null}}],
                "columnTypes":[{"name":"status","type":"STRING"}]}"#,
        )
        .unwrap();
        assert_eq!(page.records[0].values.len(), 1);
        assert_eq!(page.column_types.len(), 1);
        assert_eq!(page.next_cursor, None);
    }
}
