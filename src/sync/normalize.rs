// Raw sheet rows <-> typed records

use crate::models::{
    Category, Highlight, Record, RecordId, RecordSet, COL_CATEGORY, COL_COUNT, COL_HIGHLIGHT,
    COL_IMAGE_PATH, COL_NAME, COL_OWNER, COL_UNIT_MASS, HEADER,
};
use crate::sheets::{render_number, RawRow};

fn cell<'a>(row: &'a RawRow, column: &str) -> &'a str {
    row.get(column).map(String::as_str).unwrap_or("")
}

/// Count column: integers, or floats truncated toward zero. Anything else,
/// including negatives, is 0.
pub fn coerce_count(raw: &str) -> u32 {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return n.clamp(0, i64::from(u32::MAX)) as u32;
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() && n > 0.0 => n.trunc().min(f64::from(u32::MAX)) as u32,
        _ => 0,
    }
}

/// Unit mass column in grams. Decimal commas are not accepted.
pub fn coerce_unit_mass(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() && n > 0.0 => n,
        _ => 0.0,
    }
}

/// Missing columns read as empty text.
pub fn record_from_row(row: &RawRow) -> Record {
    Record {
        id: RecordId::nil(),
        owner: cell(row, COL_OWNER).to_string(),
        name: cell(row, COL_NAME).to_string(),
        category: Category::from_label(cell(row, COL_CATEGORY)),
        count: coerce_count(cell(row, COL_COUNT)),
        unit_mass: coerce_unit_mass(cell(row, COL_UNIT_MASS)),
        image_path: cell(row, COL_IMAGE_PATH).to_string(),
        highlight: Highlight::from_label_lenient(cell(row, COL_HIGHLIGHT)),
    }
}

/// Rows owned by `owner`, in stored order.
pub fn scoped_records(rows: &[RawRow], owner: &str) -> RecordSet {
    let records = rows
        .iter()
        .map(record_from_row)
        .filter(|r| r.owner == owner)
        .collect();
    RecordSet::new(owner, records)
}

pub fn record_to_cells(record: &Record, owner: &str) -> Vec<String> {
    vec![
        owner.to_string(),
        record.name.clone(),
        record.category.label().to_string(),
        record.count.to_string(),
        render_number(record.unit_mass),
        record.image_path.clone(),
        record.highlight.label().to_string(),
    ]
}

/// Foreign rows keep their raw text; absent cells become empty strings.
fn raw_to_cells(row: &RawRow) -> Vec<String> {
    HEADER.iter().map(|c| cell(row, c).to_string()).collect()
}

/// The full table after replacing `owner`'s partition with `scoped`:
/// every other owner's rows in stored order, then the scoped records.
pub fn merge_partition(rows: &[RawRow], owner: &str, scoped: &RecordSet) -> Vec<Vec<String>> {
    rows.iter()
        .filter(|row| cell(row, COL_OWNER) != owner)
        .map(raw_to_cells)
        .chain(scoped.iter().map(|r| record_to_cells(r, owner)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_coerce_count() {
        assert_eq!(coerce_count("7"), 7);
        assert_eq!(coerce_count(" 12 "), 12);
        assert_eq!(coerce_count("abc"), 0);
        assert_eq!(coerce_count(""), 0);
        assert_eq!(coerce_count("3.9"), 3);
        assert_eq!(coerce_count("-4"), 0);
        assert_eq!(coerce_count("NaN"), 0);
    }

    #[test]
    fn test_coerce_unit_mass() {
        assert_eq!(coerce_unit_mass("3,5"), 0.0);
        assert_eq!(coerce_unit_mass("3.5"), 3.5);
        assert_eq!(coerce_unit_mass(""), 0.0);
        assert_eq!(coerce_unit_mass("inf"), 0.0);
        assert_eq!(coerce_unit_mass("-1"), 0.0);
    }

    #[test]
    fn test_missing_columns_are_synthesized() {
        let record = record_from_row(&raw(&[("User_ID", "anna"), ("Name", "Vulkan")]));
        assert_eq!(record.owner, "anna");
        assert_eq!(record.category, Category::Other(String::new()));
        assert_eq!(record.count, 0);
        assert_eq!(record.unit_mass, 0.0);
        assert_eq!(record.image_path, "");
        assert_eq!(record.highlight, Highlight::None);
    }

    #[test]
    fn test_merge_keeps_foreign_rows_verbatim() {
        let rows = vec![
            raw(&[("User_ID", "ben"), ("Name", "B1"), ("Stückzahl", "abc")]),
            raw(&[("User_ID", "anna"), ("Name", "old")]),
            raw(&[("User_ID", "ben"), ("Name", "B2"), ("NEM_pro_Stück", "3,5")]),
        ];
        let scoped = RecordSet::new("anna", vec![Record::new("", "new")]);

        let merged = merge_partition(&rows, "anna", &scoped);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], vec!["ben", "B1", "", "abc", "", "", ""]);
        assert_eq!(merged[1], vec!["ben", "B2", "", "", "3,5", "", ""]);
        assert_eq!(merged[2], vec!["anna", "new", "Sonstiges", "1", "0", "", "Kein"]);
    }
}
