use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, Value};

// ---------------------------------------------------------------------------
// Join options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Matched rows only.
    Inner,
    /// Every left row; matched where possible.
    Left,
    /// Every row from both sides.
    Outer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTransform {
    #[default]
    None,
    Trim,
    /// Trim, then lowercase.
    Lowercase,
}

pub fn apply_key_transform(raw: &str, transform: KeyTransform) -> String {
    match transform {
        KeyTransform::None => raw.to_string(),
        KeyTransform::Trim => raw.trim().to_string(),
        KeyTransform::Lowercase => raw.trim().to_lowercase(),
    }
}

/// A key column, named independently on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub left: String,
    pub right: String,
}

impl KeyPair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Same column name on both sides.
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            left: name.clone(),
            right: name,
        }
    }
}

// ---------------------------------------------------------------------------
// Joined output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Both,
    LeftOnly,
    RightOnly,
}

/// One row of a join. `left`/`right` are row positions in the input
/// datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRow {
    pub origin: Origin,
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub key: Option<String>,
}

#[derive(Debug)]
pub struct JoinedTable<'a> {
    pub left: &'a Dataset,
    pub right: &'a Dataset,
    pub keys: Vec<KeyPair>,
    pub rows: Vec<JoinedRow>,
}

impl<'a> JoinedTable<'a> {
    pub fn matched(&self) -> impl Iterator<Item = &JoinedRow> + '_ {
        self.rows.iter().filter(|r| r.origin == Origin::Both)
    }

    pub fn count(&self, origin: Origin) -> usize {
        self.rows.iter().filter(|r| r.origin == origin).count()
    }

    /// Flatten into one dataset. Key columns appear once (named as on the
    /// left). Non-key columns present on both sides get `left_suffix` /
    /// `right_suffix` appended.
    pub fn merged(&self, left_suffix: &str, right_suffix: &str) -> Dataset {
        let left_keys: Vec<&str> = self.keys.iter().map(|k| k.left.as_str()).collect();
        let right_keys: Vec<&str> = self.keys.iter().map(|k| k.right.as_str()).collect();

        let left_rest: Vec<&String> = self
            .left
            .columns()
            .iter()
            .filter(|c| !left_keys.contains(&c.as_str()))
            .collect();
        let right_rest: Vec<&String> = self
            .right
            .columns()
            .iter()
            .filter(|c| !right_keys.contains(&c.as_str()))
            .collect();

        let mut columns: Vec<String> = left_keys.iter().map(|k| k.to_string()).collect();
        for c in &left_rest {
            if right_rest.contains(c) {
                columns.push(format!("{c}{left_suffix}"));
            } else {
                columns.push((*c).clone());
            }
        }
        for c in &right_rest {
            if left_rest.contains(c) {
                columns.push(format!("{c}{right_suffix}"));
            } else {
                columns.push((*c).clone());
            }
        }

        let rows = self
            .rows
            .iter()
            .map(|jr| {
                let mut out = Vec::with_capacity(columns.len());
                for k in &self.keys {
                    let v = match (jr.left, jr.right) {
                        (Some(l), _) => self.left.get(l, &k.left),
                        (None, Some(r)) => self.right.get(r, &k.right),
                        (None, None) => &Value::Null,
                    };
                    out.push(v.clone());
                }
                for c in &left_rest {
                    out.push(jr.left.map(|l| self.left.get(l, c).clone()).unwrap_or(Value::Null));
                }
                for c in &right_rest {
                    out.push(jr.right.map(|r| self.right.get(r, c).clone()).unwrap_or(Value::Null));
                }
                out
            })
            .collect();

        // Widths are consistent by construction.
        Dataset::from_rows(columns, rows).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// Composite key for one row. `None` when any key cell is null or blank
/// after the transform: null keys never match.
fn row_key(ds: &Dataset, position: usize, cols: &[Option<usize>], transform: KeyTransform) -> Option<String> {
    let mut parts = Vec::with_capacity(cols.len());
    for col in cols {
        let row = ds.row(position)?;
        let raw = row.at((*col)?).repr()?;
        let part = apply_key_transform(&raw, transform);
        if part.is_empty() {
            return None;
        }
        parts.push(part);
    }
    Some(parts.join("\u{1f}"))
}

/// Exact-key hash join.
///
/// Matching is one-to-one: each right row is consumed by at most one left
/// row, first come first served in input order. An inner join therefore
/// never yields more than `min(|left|, |right|)` pairs and an outer join
/// never more than `|left| + |right|` rows.
///
/// Key columns are expected to exist; a missing one makes every key null.
pub fn join<'a>(
    left: &'a Dataset,
    right: &'a Dataset,
    keys: &[KeyPair],
    mode: JoinMode,
    transform: KeyTransform,
) -> JoinedTable<'a> {
    let left_cols: Vec<Option<usize>> = keys.iter().map(|k| left.column_index(&k.left)).collect();
    let right_cols: Vec<Option<usize>> = keys.iter().map(|k| right.column_index(&k.right)).collect();

    let mut right_index: HashMap<String, VecDeque<usize>> = HashMap::new();
    for pos in 0..right.len() {
        if let Some(key) = row_key(right, pos, &right_cols, transform) {
            right_index.entry(key).or_default().push_back(pos);
        }
    }

    let mut right_consumed = vec![false; right.len()];
    let mut rows = Vec::new();

    for pos in 0..left.len() {
        let key = row_key(left, pos, &left_cols, transform);
        let partner = key
            .as_ref()
            .and_then(|k| right_index.get_mut(k))
            .and_then(|queue| queue.pop_front());

        match partner {
            Some(rpos) => {
                right_consumed[rpos] = true;
                rows.push(JoinedRow {
                    origin: Origin::Both,
                    left: Some(pos),
                    right: Some(rpos),
                    key,
                });
            }
            None if mode != JoinMode::Inner => rows.push(JoinedRow {
                origin: Origin::LeftOnly,
                left: Some(pos),
                right: None,
                key,
            }),
            None => {}
        }
    }

    if mode == JoinMode::Outer {
        for (rpos, consumed) in right_consumed.iter().enumerate() {
            if !consumed {
                rows.push(JoinedRow {
                    origin: Origin::RightOnly,
                    left: None,
                    right: Some(rpos),
                    key: row_key(right, rpos, &right_cols, transform),
                });
            }
        }
    }

    tracing::debug!(
        left = left.len(),
        right = right.len(),
        matched = rows.iter().filter(|r| r.origin == Origin::Both).count(),
        "join complete"
    );

    JoinedTable {
        left,
        right,
        keys: keys.to_vec(),
        rows,
    }
}

/// True when at least one row has a usable (non-null, non-blank) key.
pub fn has_usable_key(ds: &Dataset, column: &str, transform: KeyTransform) -> bool {
    let cols = [ds.column_index(column)];
    (0..ds.len()).any(|pos| row_key(ds, pos, &cols, transform).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ds(columns: &[&str], rows: &[&[&str]]) -> Dataset {
        Dataset::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Value::text(*v)).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn inner_join_matches_by_key() {
        let a = ds(&["inv", "amt"], &[&["1", "10"], &["2", "20"], &["3", "30"]]);
        let b = ds(&["inv", "amt"], &[&["3", "30"], &["1", "11"], &["9", "90"]]);
        let j = join(&a, &b, &[KeyPair::same("inv")], JoinMode::Inner, KeyTransform::None);
        assert_eq!(j.rows.len(), 2);
        assert_eq!(j.rows[0].left, Some(0));
        assert_eq!(j.rows[0].right, Some(1));
        assert_eq!(j.rows[1].key.as_deref(), Some("3"));
    }

    #[test]
    fn left_join_keeps_every_left_row() {
        let a = ds(&["inv"], &[&["1"], &["2"]]);
        let b = ds(&["inv"], &[&["2"]]);
        let j = join(&a, &b, &[KeyPair::same("inv")], JoinMode::Left, KeyTransform::None);
        assert_eq!(j.rows.len(), 2);
        assert_eq!(j.count(Origin::LeftOnly), 1);
        assert_eq!(j.count(Origin::RightOnly), 0);
    }

    #[test]
    fn outer_join_reports_both_sides() {
        let a = ds(&["inv"], &[&["1"], &["2"]]);
        let b = ds(&["inv"], &[&["2"], &["3"]]);
        let j = join(&a, &b, &[KeyPair::same("inv")], JoinMode::Outer, KeyTransform::None);
        assert_eq!(j.count(Origin::Both), 1);
        assert_eq!(j.count(Origin::LeftOnly), 1);
        assert_eq!(j.count(Origin::RightOnly), 1);
        let right_only = j.rows.iter().find(|r| r.origin == Origin::RightOnly).unwrap();
        assert_eq!(right_only.key.as_deref(), Some("3"));
    }

    #[test]
    fn duplicate_keys_pair_one_to_one() {
        let a = ds(&["inv"], &[&["1"], &["1"], &["1"]]);
        let b = ds(&["inv"], &[&["1"], &["1"]]);
        let j = join(&a, &b, &[KeyPair::same("inv")], JoinMode::Inner, KeyTransform::None);
        assert_eq!(j.rows.len(), 2);
        assert_eq!(j.rows[0].right, Some(0));
        assert_eq!(j.rows[1].right, Some(1));
    }

    #[test]
    fn null_keys_never_match() {
        let a = ds(&["inv"], &[&[""], &["1"]]);
        let b = ds(&["inv"], &[&[""], &["1"]]);
        let j = join(&a, &b, &[KeyPair::same("inv")], JoinMode::Outer, KeyTransform::None);
        assert_eq!(j.count(Origin::Both), 1);
        assert_eq!(j.count(Origin::LeftOnly), 1);
        assert_eq!(j.count(Origin::RightOnly), 1);
    }

    #[test]
    fn composite_keys_with_different_names() {
        let a = ds(&["Invoice Number", "GSTIN"], &[&["A1", "G1"], &["A1", "G2"]]);
        let b = ds(&["invoice_number", "gstin_supplier"], &[&["A1", "G2"]]);
        let keys = [
            KeyPair::new("Invoice Number", "invoice_number"),
            KeyPair::new("GSTIN", "gstin_supplier"),
        ];
        let j = join(&a, &b, &keys, JoinMode::Inner, KeyTransform::None);
        assert_eq!(j.rows.len(), 1);
        assert_eq!(j.rows[0].left, Some(1));
    }

    #[test]
    fn exact_match_is_case_sensitive_unless_transformed() {
        let a = ds(&["inv"], &[&["INV-1"]]);
        let b = ds(&["inv"], &[&[" inv-1 "]]);
        let exact = join(&a, &b, &[KeyPair::same("inv")], JoinMode::Inner, KeyTransform::None);
        assert!(exact.rows.is_empty());
        let folded = join(&a, &b, &[KeyPair::same("inv")], JoinMode::Inner, KeyTransform::Lowercase);
        assert_eq!(folded.rows.len(), 1);
    }

    #[test]
    fn merged_view_suffixes_collisions() {
        let a = ds(&["inv", "date", "value"], &[&["1", "2025-01-01", "10"]]);
        let b = ds(&["inv", "date", "vehicle"], &[&["1", "2025-01-02", "KA01"]]);
        let j = join(&a, &b, &[KeyPair::same("inv")], JoinMode::Inner, KeyTransform::None);
        let m = j.merged("_invoice", "_ewaybill");
        assert_eq!(
            m.columns(),
            &["inv", "date_invoice", "value", "date_ewaybill", "vehicle"]
        );
        assert_eq!(m.get(0, "date_ewaybill"), &Value::text("2025-01-02"));
    }

    #[test]
    fn usable_key_detection() {
        let a = ds(&["inv", "other"], &[&["", "x"], &[" ", "y"]]);
        assert!(!has_usable_key(&a, "inv", KeyTransform::Trim));
        assert!(has_usable_key(&a, "other", KeyTransform::Trim));
    }
}
