//! Merge engine for reconciling an old and a latest table keyed by ID

use crate::error::{MergeError, MergeSide};
use crate::prefix::ID_COLUMN;
use crate::table::{CellValue, Row, Table};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Conflict policy for cells where latest has no value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Missing values in latest never overwrite old values
    #[default]
    PreserveExisting,
    /// Latest is authoritative per cell, missing values included
    ReplaceWithEmpty,
}

impl MergePolicy {
    /// Policy for the `replace_with_empty` flag
    pub fn from_flag(replace_with_empty: bool) -> Self {
        if replace_with_empty {
            MergePolicy::ReplaceWithEmpty
        } else {
            MergePolicy::PreserveExisting
        }
    }
}

/// Which input a merged cell was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellSource {
    Old,
    Latest,
    /// Neither input had the cell
    Absent,
}

/// A merged cell with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCell {
    /// The cell value
    pub value: CellValue,
    /// The input that provided this value
    pub source: CellSource,
}

impl ResolvedCell {
    fn new(value: CellValue, source: CellSource) -> Self {
        Self { value, source }
    }
}

/// Counts describing how a merge went
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// IDs present in both tables
    pub matched: usize,
    /// Rows only in latest
    pub added: usize,
    /// Rows only in old
    pub retained: usize,
    /// Rows dropped because a later row had the same ID
    pub duplicate_ids: usize,
}

/// A merged table with provenance information for each cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    /// The merged table, `ID` first
    pub table: Table,
    /// One source per cell, aligned with `table.rows`
    pub provenance: Vec<Vec<CellSource>>,
    pub stats: MergeStats,
}

impl MergeResult {
    /// Position of the row whose ID renders as `id`
    pub fn find_row(&self, id: &str) -> Option<usize> {
        let idx = self.table.column_index(ID_COLUMN)?;
        self.table
            .rows
            .iter()
            .position(|r| r.get(idx).and_then(CellValue::as_text).as_deref() == Some(id))
    }

    /// Get provenance for a specific cell
    pub fn source_of(&self, row: usize, column: &str) -> Option<CellSource> {
        let col = self.table.column_index(column)?;
        self.provenance.get(row).and_then(|r| r.get(col)).copied()
    }
}

/// Resolve one cell of an ID that exists in latest.
///
/// ```
/// use sv_core::{resolve, CellValue, MergePolicy};
///
/// let old = CellValue::text("x");
/// assert_eq!(resolve(&old, &CellValue::Missing, MergePolicy::PreserveExisting), old);
/// assert_eq!(resolve(&old, &CellValue::Missing, MergePolicy::ReplaceWithEmpty), CellValue::Missing);
/// ```
pub fn resolve(old: &CellValue, latest: &CellValue, policy: MergePolicy) -> CellValue {
    resolve_cell(Some(old), Some(latest), policy).value
}

/// Resolve a cell where either side may lack the row or the column
fn resolve_cell(
    old: Option<&CellValue>,
    latest: Option<&CellValue>,
    policy: MergePolicy,
) -> ResolvedCell {
    let from_old = || match old {
        Some(value) => ResolvedCell::new(value.clone(), CellSource::Old),
        None => ResolvedCell::new(CellValue::Missing, CellSource::Absent),
    };

    match (latest, policy) {
        (None, _) => from_old(),
        (Some(value), MergePolicy::ReplaceWithEmpty) => {
            ResolvedCell::new(value.clone(), CellSource::Latest)
        }
        (Some(value), MergePolicy::PreserveExisting) if !value.is_missing() => {
            ResolvedCell::new(value.clone(), CellSource::Latest)
        }
        (Some(_), MergePolicy::PreserveExisting) => from_old(),
    }
}

/// Hashable form of an ID cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IdKey {
    Integer(i64),
    Float(u64),
    Boolean(bool),
    Text(String),
}

impl IdKey {
    fn from_cell(cell: &CellValue) -> Option<Self> {
        match cell {
            CellValue::Integer(i) => Some(IdKey::Integer(*i)),
            // -0.0 and 0.0 are the same ID
            CellValue::Float(f) => Some(IdKey::Float((f + 0.0).to_bits())),
            CellValue::Boolean(b) => Some(IdKey::Boolean(*b)),
            CellValue::String(s) => Some(IdKey::Text(s.clone())),
            CellValue::Missing => None,
        }
    }
}

/// A row slot in first-seen order
#[derive(Debug)]
enum Slot {
    Keyed(IdKey),
    /// Row without an ID; never joined
    Unkeyed(usize),
}

/// Rows of one table indexed by ID
#[derive(Debug)]
struct IdIndex {
    slots: Vec<Slot>,
    /// Last row position for each ID
    last: HashMap<IdKey, usize>,
    duplicates: usize,
}

impl IdIndex {
    fn build(table: &Table, id_idx: usize, side: MergeSide) -> Self {
        let mut slots = Vec::new();
        let mut last = HashMap::new();
        let mut duplicates = 0;

        for (pos, row) in table.rows.iter().enumerate() {
            match row.get(id_idx).and_then(IdKey::from_cell) {
                Some(key) => {
                    if last.insert(key.clone(), pos).is_some() {
                        duplicates += 1;
                    } else {
                        slots.push(Slot::Keyed(key));
                    }
                }
                None => slots.push(Slot::Unkeyed(pos)),
            }
        }

        if duplicates > 0 {
            warn!(
                "{} duplicate ID row(s) in the {} table, keeping the last occurrence",
                duplicates, side
            );
        }

        Self {
            slots,
            last,
            duplicates,
        }
    }

    fn row<'a>(&self, table: &'a Table, key: &IdKey) -> Option<&'a Row> {
        self.last.get(key).map(|&pos| &table.rows[pos])
    }
}

/// Column layout of the merged table
struct Layout {
    names: Vec<String>,
    old: Vec<Option<usize>>,
    latest: Vec<Option<usize>>,
}

impl Layout {
    /// `ID` first, then old's columns, then columns only latest has
    fn build(old: &Table, latest: &Table) -> Self {
        let mut names = vec![ID_COLUMN.to_string()];
        let mut seen: HashSet<&str> = HashSet::from([ID_COLUMN]);

        for col in old.columns.iter().chain(latest.columns.iter()) {
            if seen.insert(col.name.as_str()) {
                names.push(col.name.clone());
            }
        }

        let old_map = names.iter().map(|n| old.column_index(n)).collect();
        let latest_map = names.iter().map(|n| latest.column_index(n)).collect();

        Self {
            names,
            old: old_map,
            latest: latest_map,
        }
    }

    fn resolve_row(
        &self,
        old: Option<&Row>,
        latest: Option<&Row>,
        policy: MergePolicy,
    ) -> Vec<ResolvedCell> {
        (0..self.names.len())
            .map(|i| {
                let old_cell = old.zip(self.old[i]).and_then(|(r, j)| r.get(j));
                let latest_cell = latest.zip(self.latest[i]).and_then(|(r, j)| r.get(j));
                resolve_cell(old_cell, latest_cell, policy)
            })
            .collect()
    }
}

/// Merge `latest` into `old`, keyed by the `ID` column.
///
/// Rows come out in latest's order, followed by the IDs only old has, in
/// old's order. Duplicate IDs within one table resolve to their last row.
pub fn merge_tables(
    old: &Table,
    latest: &Table,
    policy: MergePolicy,
) -> Result<MergeResult, MergeError> {
    let old_id = old
        .column_index(ID_COLUMN)
        .ok_or(MergeError::MissingIdColumn {
            side: MergeSide::Old,
        })?;
    let latest_id = latest
        .column_index(ID_COLUMN)
        .ok_or(MergeError::MissingIdColumn {
            side: MergeSide::Latest,
        })?;

    let old_index = IdIndex::build(old, old_id, MergeSide::Old);
    let latest_index = IdIndex::build(latest, latest_id, MergeSide::Latest);
    let layout = Layout::build(old, latest);

    let mut stats = MergeStats {
        duplicate_ids: old_index.duplicates + latest_index.duplicates,
        ..MergeStats::default()
    };
    let mut resolved_rows: Vec<Vec<ResolvedCell>> = Vec::new();

    for slot in &latest_index.slots {
        let (latest_row, old_row) = match slot {
            Slot::Keyed(key) => (
                latest_index.row(latest, key),
                old_index.row(old, key),
            ),
            Slot::Unkeyed(pos) => (latest.rows.get(*pos), None),
        };

        if old_row.is_some() {
            stats.matched += 1;
        } else {
            stats.added += 1;
        }
        resolved_rows.push(layout.resolve_row(old_row, latest_row, policy));
    }

    for slot in &old_index.slots {
        let old_row = match slot {
            Slot::Keyed(key) if latest_index.last.contains_key(key) => continue,
            Slot::Keyed(key) => old_index.row(old, key),
            Slot::Unkeyed(pos) => old.rows.get(*pos),
        };

        stats.retained += 1;
        resolved_rows.push(layout.resolve_row(old_row, None, policy));
    }

    let mut table = Table::new(layout.names);
    table.sources = old.sources.iter().chain(&latest.sources).cloned().collect();

    let mut provenance = Vec::with_capacity(resolved_rows.len());
    for cells in resolved_rows {
        provenance.push(cells.iter().map(|c| c.source).collect());
        table.rows.push(Row::new(cells.into_iter().map(|c| c.value).collect()));
    }

    info!(
        "merged {} rows ({:?} policy): {} matched, {} added, {} retained",
        table.row_count(),
        policy,
        stats.matched,
        stats.added,
        stats.retained
    );

    Ok(MergeResult {
        table,
        provenance,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_csv_str;

    fn tables(old: &str, latest: &str) -> (Table, Table) {
        (
            parse_csv_str(old, "old.csv").unwrap(),
            parse_csv_str(latest, "latest.csv").unwrap(),
        )
    }

    fn row_values(result: &MergeResult, id: &str) -> Vec<CellValue> {
        let idx = result.find_row(id).unwrap();
        result.table.rows[idx].cells.clone()
    }

    #[test]
    fn test_preserve_keeps_old_when_latest_missing() {
        let (old, latest) = tables("ID,A,B\n1,x,y\n", "ID,A,B\n1,,z\n");
        let result = merge_tables(&old, &latest, MergePolicy::PreserveExisting).unwrap();

        assert_eq!(
            row_values(&result, "1"),
            vec![CellValue::Integer(1), CellValue::text("x"), CellValue::text("z")]
        );
        assert_eq!(result.source_of(0, "A"), Some(CellSource::Old));
        assert_eq!(result.source_of(0, "B"), Some(CellSource::Latest));
    }

    #[test]
    fn test_replace_takes_latest_missing() {
        let (old, latest) = tables("ID,A,B\n1,x,y\n", "ID,A,B\n1,,z\n");
        let result = merge_tables(&old, &latest, MergePolicy::ReplaceWithEmpty).unwrap();

        assert_eq!(
            row_values(&result, "1"),
            vec![CellValue::Integer(1), CellValue::Missing, CellValue::text("z")]
        );
        assert_eq!(result.source_of(0, "A"), Some(CellSource::Latest));
    }

    #[test]
    fn test_resolve() {
        let old = CellValue::text("x");
        let new = CellValue::text("z");

        for policy in [MergePolicy::PreserveExisting, MergePolicy::ReplaceWithEmpty] {
            assert_eq!(resolve(&old, &new, policy), new);
        }
        assert_eq!(
            resolve(&old, &CellValue::Missing, MergePolicy::PreserveExisting),
            old
        );
        assert_eq!(
            resolve(&old, &CellValue::Missing, MergePolicy::ReplaceWithEmpty),
            CellValue::Missing
        );
    }

    #[test]
    fn test_new_row_from_latest() {
        let (old, latest) = tables("ID,A,OldOnly\n1,x,keep\n", "ID,A\n2,new\n");
        let result = merge_tables(&old, &latest, MergePolicy::PreserveExisting).unwrap();

        assert_eq!(result.table.column_names(), vec!["ID", "A", "OldOnly"]);
        assert_eq!(
            row_values(&result, "2"),
            vec![CellValue::Integer(2), CellValue::text("new"), CellValue::Missing]
        );
        assert_eq!(result.source_of(0, "OldOnly"), Some(CellSource::Absent));
        assert_eq!(result.stats.added, 1);
    }

    #[test]
    fn test_old_only_rows_retained() {
        let (old, latest) = tables("ID,A\n1,x\n2,y\n", "ID,A\n2,Y\n");
        for policy in [MergePolicy::PreserveExisting, MergePolicy::ReplaceWithEmpty] {
            let result = merge_tables(&old, &latest, policy).unwrap();
            assert_eq!(row_values(&result, "1")[1], CellValue::text("x"));
            assert_eq!(row_values(&result, "2")[1], CellValue::text("Y"));
            assert_eq!(result.stats.retained, 1);
            assert_eq!(result.stats.matched, 1);
        }
    }

    #[test]
    fn test_old_only_columns_untouched() {
        let (old, latest) = tables("ID,A,Note\n1,x,n1\n", "ID,A\n1,\n");
        let result = merge_tables(&old, &latest, MergePolicy::ReplaceWithEmpty).unwrap();

        assert_eq!(
            row_values(&result, "1"),
            vec![CellValue::Integer(1), CellValue::Missing, CellValue::text("n1")]
        );
    }

    #[test]
    fn test_latest_only_column() {
        let (old, latest) = tables("ID,A\n1,x\n2,y\n", "ID,A,Extra\n1,x,e1\n");
        let result = merge_tables(&old, &latest, MergePolicy::PreserveExisting).unwrap();

        assert_eq!(result.table.column_names(), vec!["ID", "A", "Extra"]);
        assert_eq!(row_values(&result, "1")[2], CellValue::text("e1"));
        assert_eq!(row_values(&result, "2")[2], CellValue::Missing);
    }

    #[test]
    fn test_row_order_latest_first_then_old() {
        let (old, latest) = tables("ID,A\nc,1\na,2\nd,3\n", "ID,A\nb,4\na,5\n");
        let result = merge_tables(&old, &latest, MergePolicy::PreserveExisting).unwrap();

        let ids: Vec<String> = result
            .table
            .rows
            .iter()
            .map(|r| r.cells[0].to_string_value())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_id_column_moves_first() {
        let (old, latest) = tables("A,ID\nx,1\n", "B,ID\ny,1\n");
        let result = merge_tables(&old, &latest, MergePolicy::PreserveExisting).unwrap();

        assert_eq!(result.table.column_names(), vec!["ID", "A", "B"]);
        assert_eq!(
            row_values(&result, "1"),
            vec![CellValue::Integer(1), CellValue::text("x"), CellValue::text("y")]
        );
    }

    #[test]
    fn test_duplicate_ids_last_wins() {
        let (old, latest) = tables("ID,A\n1,first\n2,b\n1,second\n", "ID,A\n3,c\n");
        let result = merge_tables(&old, &latest, MergePolicy::PreserveExisting).unwrap();

        assert_eq!(result.table.row_count(), 3);
        assert_eq!(row_values(&result, "1")[1], CellValue::text("second"));
        assert_eq!(result.stats.duplicate_ids, 1);
    }

    #[test]
    fn test_missing_ids_are_not_joined() {
        let (old, latest) = tables("ID,A\n,x\n", "ID,A\n,y\n");
        let result = merge_tables(&old, &latest, MergePolicy::PreserveExisting).unwrap();

        assert_eq!(result.table.row_count(), 2);
        assert_eq!(result.table.rows[0].cells[1], CellValue::text("y"));
        assert_eq!(result.table.rows[1].cells[1], CellValue::text("x"));
    }

    #[test]
    fn test_ids_of_different_types_do_not_match() {
        let mut old = Table::new(["ID", "A"]);
        old.push_row(Row::new(vec![CellValue::Integer(7), CellValue::text("int")]));
        let mut latest = Table::new(["ID", "A"]);
        latest.push_row(Row::new(vec![CellValue::text("7"), CellValue::text("text")]));

        let result = merge_tables(&old, &latest, MergePolicy::PreserveExisting).unwrap();
        assert_eq!(result.table.row_count(), 2);
    }

    #[test]
    fn test_missing_id_column_is_error() {
        let (old, latest) = tables("Key,A\n1,x\n", "ID,A\n1,y\n");
        assert!(matches!(
            merge_tables(&old, &latest, MergePolicy::PreserveExisting),
            Err(MergeError::MissingIdColumn {
                side: MergeSide::Old
            })
        ));
        assert!(matches!(
            merge_tables(&latest, &old, MergePolicy::ReplaceWithEmpty),
            Err(MergeError::MissingIdColumn {
                side: MergeSide::Latest
            })
        ));
    }

    #[test]
    fn test_policy_from_flag() {
        assert_eq!(MergePolicy::from_flag(false), MergePolicy::PreserveExisting);
        assert_eq!(MergePolicy::from_flag(true), MergePolicy::ReplaceWithEmpty);
        assert_eq!(MergePolicy::default(), MergePolicy::PreserveExisting);
    }
}
