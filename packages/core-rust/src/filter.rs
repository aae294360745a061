//! Filter terms and client-side row evaluation.
//!
//! A view's filters form a conjunction: a row survives when it satisfies
//! every term. Filtering keeps the input order; ordering is the job of
//! [`sort_rows`], which is stable and always places rows without a sort key
//! last. Terms naming an unknown column or operator are dropped at compile
//! time instead of failing the view.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::column::{ColumnDescriptor, ColumnSet};
use crate::operator::{OperatorRegistry, Predicate};
use crate::value::{Record, Scalar};

/// Sort direction for a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "asc")]
    Asc,
    #[serde(alias = "desc")]
    Desc,
}

impl SortDirection {
    /// The opposite direction.
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// Operand of a filter term.
///
/// Serialized untagged: `null`, an array (range bounds or membership list)
/// or a single scalar.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    #[default]
    Empty,
    Many(Vec<Scalar>),
    One(Scalar),
}

impl FilterValue {
    /// First operand, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Scalar> {
        self.values().first()
    }

    /// All operands; a single value is a one-element slice.
    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        match self {
            Self::Empty => &[],
            Self::Many(values) => values,
            Self::One(value) => std::slice::from_ref(value),
        }
    }
}

impl From<Scalar> for FilterValue {
    fn from(value: Scalar) -> Self {
        Self::One(value)
    }
}

impl From<Vec<Scalar>> for FilterValue {
    fn from(values: Vec<Scalar>) -> Self {
        Self::Many(values)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::One(Scalar::from(value))
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::One(Scalar::Int(value))
    }
}

/// One `property + operator + value` term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Column key the term applies to.
    pub property: String,
    /// Operator id from the [`OperatorRegistry`].
    pub operator: String,
    #[serde(default)]
    pub value: FilterValue,
}

impl Filter {
    /// Creates a filter term.
    #[must_use]
    pub fn new(
        property: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<FilterValue>,
    ) -> Self {
        Self {
            property: property.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

struct CompiledTerm<'c> {
    column: &'c ColumnDescriptor,
    predicate: Predicate,
}

/// Filters resolved against a column set and operator registry, ready to be
/// evaluated against many rows.
pub struct CompiledQuery<'c> {
    terms: Vec<CompiledTerm<'c>>,
}

impl<'c> CompiledQuery<'c> {
    /// Resolves every term's column and operator. Unresolvable terms are
    /// skipped.
    #[must_use]
    pub fn compile(
        filters: &[Filter],
        columns: &'c ColumnSet,
        registry: &OperatorRegistry,
    ) -> Self {
        let mut terms = Vec::with_capacity(filters.len());
        for filter in filters {
            let Some(column) = columns.get(&filter.property) else {
                tracing::debug!(property = %filter.property, "filter on unknown column ignored");
                continue;
            };
            let Some(operator) = registry.get(&filter.operator) else {
                tracing::debug!(operator = %filter.operator, "unknown filter operator ignored");
                continue;
            };
            terms.push(CompiledTerm {
                column,
                predicate: operator.build_filter(&filter.value),
            });
        }
        Self { terms }
    }

    /// Number of active terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether no term survived compilation (identity filter).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether `record` satisfies every term.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.terms.iter().all(|term| {
            let value = term.column.extract(record);
            (term.predicate)(value.as_deref())
        })
    }

    /// Keeps matching rows in their original order.
    pub fn filter<'r, I>(&self, rows: I) -> Vec<&'r Record>
    where
        I: IntoIterator<Item = &'r Record>,
    {
        rows.into_iter().filter(|r| self.matches(r)).collect()
    }
}

/// One-shot form of [`CompiledQuery::filter`].
#[must_use]
pub fn filter_rows<'r>(
    filters: &[Filter],
    columns: &ColumnSet,
    registry: &OperatorRegistry,
    rows: &'r [Record],
) -> Vec<&'r Record> {
    CompiledQuery::compile(filters, columns, registry).filter(rows)
}

fn compare_keys(a: Option<&Scalar>, b: Option<&Scalar>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ordering = a.total_cmp(b);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
        // Missing keys go last in both directions.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable in-place sort by one column.
pub fn sort_rows(rows: &mut [&Record], column: &ColumnDescriptor, direction: SortDirection) {
    let mut keyed: Vec<(Option<Cow<'_, Scalar>>, &Record)> =
        rows.iter().map(|&r| (column.extract(r), r)).collect();
    keyed.sort_by(|(a, _), (b, _)| compare_keys(a.as_deref(), b.as_deref(), direction));
    for (slot, (_, record)) in rows.iter_mut().zip(keyed) {
        *slot = record;
    }
}

/// One page of an ordered row set.
#[derive(Debug, Clone)]
pub struct Page<'r> {
    /// Rows on this page.
    pub rows: Vec<&'r Record>,
    /// Zero-based page index actually served (clamped to the last page).
    pub page: usize,
    /// Page size used; 0 means everything on one page.
    pub page_size: usize,
    /// Row count before pagination.
    pub total: usize,
    /// Number of pages, at least 1.
    pub page_count: usize,
}

/// Cuts `rows` into pages and returns page `page`. Out-of-range pages clamp
/// to the last page so a shrinking result set never shows an empty grid.
#[must_use]
pub fn paginate(rows: Vec<&Record>, page: usize, page_size: usize) -> Page<'_> {
    let total = rows.len();
    if page_size == 0 {
        return Page {
            rows,
            page: 0,
            page_size,
            total,
            page_count: 1,
        };
    }
    let page_count = total.div_ceil(page_size).max(1);
    let page = page.min(page_count - 1);
    let rows = rows
        .into_iter()
        .skip(page * page_size)
        .take(page_size)
        .collect();
    Page {
        rows,
        page,
        page_size,
        total,
        page_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnSetBuilder;
    use crate::operator;
    use crate::schema::{ColumnSchema, ColumnType};

    fn columns() -> ColumnSet {
        let schemas = vec![
            ColumnSchema::new("id", ColumnType::Int),
            ColumnSchema::new("status", ColumnType::String),
            ColumnSchema::new("duration", ColumnType::Int),
        ];
        ColumnSetBuilder::new(&schemas).build()
    }

    fn ids(rows: &[&Record]) -> Vec<String> {
        rows.iter().map(|r| r.id.to_string()).collect()
    }

    #[test]
    fn equal_filter_keeps_matching_rows() {
        let rows = vec![
            Record::new("1").with("status", "SUCCESS").with("id", 1_i64),
            Record::new("2").with("status", "FAILED").with("id", 2_i64),
        ];
        let filters = vec![Filter::new("status", operator::EQUAL, "SUCCESS")];
        let out = filter_rows(&filters, &columns(), &OperatorRegistry::default(), &rows);
        assert_eq!(ids(&out), vec!["1"]);
    }

    #[test]
    fn empty_filter_list_is_identity() {
        let rows = vec![Record::new("a"), Record::new("b")];
        let out = filter_rows(&[], &columns(), &OperatorRegistry::default(), &rows);
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn terms_are_conjunctive() {
        let rows = vec![
            Record::new("1").with("status", "SUCCESS").with("duration", 5_i64),
            Record::new("2").with("status", "SUCCESS").with("duration", 50_i64),
            Record::new("3").with("status", "FAILED").with("duration", 50_i64),
        ];
        let filters = vec![
            Filter::new("status", operator::EQUAL, "SUCCESS"),
            Filter::new("duration", operator::GREATER, 10_i64),
        ];
        let out = filter_rows(&filters, &columns(), &OperatorRegistry::default(), &rows);
        assert_eq!(ids(&out), vec!["2"]);
    }

    #[test]
    fn unknown_column_and_operator_are_ignored() {
        let rows = vec![Record::new("1"), Record::new("2")];
        let filters = vec![
            Filter::new("nope", operator::EQUAL, "x"),
            Filter::new("status", "LIKE_ISH", "x"),
        ];
        let columns = columns();
        let registry = OperatorRegistry::default();
        let query = CompiledQuery::compile(&filters, &columns, &registry);
        assert!(query.is_empty());
        assert_eq!(query.filter(&rows).len(), 2);
    }

    #[test]
    fn missing_property_does_not_match() {
        let rows = vec![Record::new("1"), Record::new("2").with("status", "SUCCESS")];
        let filters = vec![Filter::new("status", operator::NOT_EQUAL, "FAILED")];
        let out = filter_rows(&filters, &columns(), &OperatorRegistry::default(), &rows);
        assert_eq!(ids(&out), vec!["2"]);
    }

    #[test]
    fn sort_desc_puts_missing_last() {
        let rows = vec![
            Record::new("a").with("duration", 5_i64),
            Record::new("b"),
            Record::new("c").with("duration", 10_i64),
        ];
        let columns = columns();
        let duration = columns.get("duration").unwrap();
        let mut refs: Vec<&Record> = rows.iter().collect();
        sort_rows(&mut refs, duration, SortDirection::Desc);
        assert_eq!(ids(&refs), vec!["c", "a", "b"]);
        sort_rows(&mut refs, duration, SortDirection::Asc);
        assert_eq!(ids(&refs), vec!["a", "c", "b"]);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let rows = vec![
            Record::new("a").with("duration", 1_i64),
            Record::new("b").with("duration", 1_i64),
            Record::new("c").with("duration", 0_i64),
        ];
        let columns = columns();
        let duration = columns.get("duration").unwrap();
        let mut refs: Vec<&Record> = rows.iter().collect();
        sort_rows(&mut refs, duration, SortDirection::Desc);
        assert_eq!(ids(&refs), vec!["a", "b", "c"]);
    }

    #[test]
    fn paginate_clamps_to_last_page() {
        let rows: Vec<Record> = (0..5).map(|i| Record::new(i.to_string())).collect();
        let refs: Vec<&Record> = rows.iter().collect();
        let page = paginate(refs.clone(), 1, 2);
        assert_eq!(ids(&page.rows), vec!["2", "3"]);
        assert_eq!(page.page_count, 3);
        let page = paginate(refs.clone(), 9, 2);
        assert_eq!(page.page, 2);
        assert_eq!(ids(&page.rows), vec!["4"]);
        let page = paginate(refs, 3, 0);
        assert_eq!(page.rows.len(), 5);
    }

    #[test]
    fn filter_value_json_shapes() {
        let f: Filter =
            serde_json::from_str(r#"{"property":"d","operator":"RANGE","value":[1,2]}"#).unwrap();
        assert_eq!(f.value, FilterValue::Many(vec![Scalar::Int(1), Scalar::Int(2)]));
        let f: Filter = serde_json::from_str(r#"{"property":"d","operator":"EQUAL","value":"x"}"#)
            .unwrap();
        assert_eq!(f.value, FilterValue::One(Scalar::from("x")));
        let f: Filter = serde_json::from_str(r#"{"property":"d","operator":"EQUAL"}"#).unwrap();
        assert_eq!(f.value, FilterValue::Empty);
        let dir: SortDirection = serde_json::from_str(r#""desc""#).unwrap();
        assert_eq!(dir, SortDirection::Desc);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_rows() -> impl Strategy<Value = Vec<Record>> {
            prop::collection::vec(
                (
                    prop::option::of(prop_oneof![Just("SUCCESS"), Just("FAILED"), Just("RUNNING")]),
                    prop::option::of(-5_i64..5),
                ),
                0..30,
            )
            .prop_map(|cells| {
                cells
                    .into_iter()
                    .enumerate()
                    .map(|(i, (status, duration))| {
                        let mut record = Record::new(i.to_string());
                        if let Some(status) = status {
                            record = record.with("status", status);
                        }
                        if let Some(duration) = duration {
                            record = record.with("duration", duration);
                        }
                        record
                    })
                    .collect()
            })
        }

        fn arb_filters() -> impl Strategy<Value = Vec<Filter>> {
            prop::collection::vec(
                prop_oneof![
                    (prop_oneof![Just("SUCCESS"), Just("FAILED")])
                        .prop_map(|s| Filter::new("status", operator::EQUAL, s)),
                    (-5_i64..5).prop_map(|n| Filter::new("duration", operator::GREATER_EQUAL, n)),
                    (-5_i64..5).prop_map(|n| Filter::new("duration", operator::NOT_EQUAL, n)),
                ],
                0..3,
            )
        }

        proptest! {
            #[test]
            fn filter_is_subset_and_idempotent(rows in arb_rows(), filters in arb_filters()) {
                let columns = columns();
                let registry = OperatorRegistry::default();
                let query = CompiledQuery::compile(&filters, &columns, &registry);
                let once = query.filter(&rows);
                prop_assert!(once.iter().all(|r| rows.iter().any(|o| std::ptr::eq(o, *r))));
                let twice = query.filter(once.iter().copied());
                prop_assert_eq!(ids(&once), ids(&twice));
            }

            #[test]
            fn sort_is_stable_and_direction_only_reverses_keyed_rows(rows in arb_rows()) {
                let columns = columns();
                let duration = columns.get("duration").unwrap();
                let mut asc: Vec<&Record> = rows.iter().collect();
                sort_rows(&mut asc, duration, SortDirection::Asc);
                let mut desc: Vec<&Record> = rows.iter().collect();
                sort_rows(&mut desc, duration, SortDirection::Desc);

                // Missing keys trail in input order in both directions.
                let missing: Vec<String> = rows.iter()
                    .filter(|r| r.get("duration").is_none())
                    .map(|r| r.id.to_string())
                    .collect();
                let asc_tail = ids(&asc[asc.len() - missing.len()..]);
                let desc_tail = ids(&desc[desc.len() - missing.len()..]);
                prop_assert_eq!(&asc_tail, &missing);
                prop_assert_eq!(&desc_tail, &missing);

                // Equal keys keep input order.
                for pair in asc.windows(2) {
                    if pair[0].get("duration") == pair[1].get("duration") {
                        let a: usize = pair[0].id.as_str().parse().unwrap();
                        let b: usize = pair[1].id.as_str().parse().unwrap();
                        prop_assert!(a < b);
                    }
                }

                // Keyed values come out reversed.
                let keys = |rows: &[&Record]| -> Vec<Scalar> {
                    rows.iter().filter_map(|r| r.get("duration").cloned()).collect()
                };
                let asc_keys = keys(&asc);
                let mut desc_keys = keys(&desc);
                desc_keys.reverse();
                prop_assert_eq!(asc_keys, desc_keys);
            }
        }
    }
}
