use crate::types::ProcessTableInfo;

/// Tables that left and joined an assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDiff {
    pub removed: Vec<ProcessTableInfo>,
    pub added: Vec<ProcessTableInfo>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Diffs two assignments sorted by table id with a single merge pass.
///
/// Tables present in both lists appear in neither side of the result, whatever their start
/// timestamps, so a table kept across a reassignment is never restarted.
pub fn diff_process_table_infos(old: &[ProcessTableInfo], new: &[ProcessTableInfo]) -> TableDiff {
    let mut diff = TableDiff::default();
    let (mut i, mut j) = (0, 0);

    while i < old.len() && j < new.len() {
        match old[i].id.cmp(&new[j].id) {
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                diff.removed.push(old[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                diff.added.push(new[j]);
                j += 1;
            }
        }
    }

    diff.removed.extend_from_slice(&old[i..]);
    diff.added.extend_from_slice(&new[j..]);

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(ids: &[i64]) -> Vec<ProcessTableInfo> {
        ids.iter()
            .map(|id| ProcessTableInfo { id: *id, start_ts: 0 })
            .collect()
    }

    fn ids(tables: &[ProcessTableInfo]) -> Vec<i64> {
        tables.iter().map(|table| table.id).collect()
    }

    #[test]
    fn diff_of_overlapping_assignments() {
        let diff = diff_process_table_infos(&tables(&[1, 3, 5]), &tables(&[3, 5, 7]));
        assert_eq!(ids(&diff.removed), vec![1]);
        assert_eq!(ids(&diff.added), vec![7]);
    }

    #[test]
    fn diff_with_empty_sides() {
        let diff = diff_process_table_infos(&[], &tables(&[2, 4]));
        assert!(diff.removed.is_empty());
        assert_eq!(ids(&diff.added), vec![2, 4]);

        let diff = diff_process_table_infos(&tables(&[2, 4]), &[]);
        assert_eq!(ids(&diff.removed), vec![2, 4]);
        assert!(diff.added.is_empty());

        assert!(diff_process_table_infos(&[], &[]).is_empty());
    }

    #[test]
    fn interleaved_assignments() {
        let diff = diff_process_table_infos(&tables(&[1, 2, 6, 9]), &tables(&[0, 2, 7, 9, 11]));
        assert_eq!(ids(&diff.removed), vec![1, 6]);
        assert_eq!(ids(&diff.added), vec![0, 7, 11]);
    }

    #[test]
    fn kept_tables_ignore_start_ts_changes() {
        let old = vec![ProcessTableInfo { id: 3, start_ts: 10 }];
        let new = vec![ProcessTableInfo { id: 3, start_ts: 99 }];
        assert!(diff_process_table_infos(&old, &new).is_empty());
    }
}
