use std::collections::{HashMap, HashSet};
use std::io::Read;

use crate::airr::Scalar;
use crate::error::KiraError;

/// Tokens read as a missing value, matching what dataframe readers treat as NA.
pub const NULL_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Empty,
    Bool,
    Int,
    Float,
    Str,
}

#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    headers: Vec<String>,
    columns: HashMap<String, usize>,
    rows: Vec<Vec<Option<String>>>,
}

impl SourceTable {
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, KiraError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            // tab-separated exports carry unescaped quotes inside fields
            .quoting(delimiter != b'\t')
            .flexible(true)
            .from_reader(reader);
        let headers = csv_reader
            .headers()
            .map_err(|err| KiraError::TableParse(err.to_string()))?
            .iter()
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|err| KiraError::TableParse(err.to_string()))?;
            let mut values = record
                .iter()
                .take(headers.len())
                .map(parse_cell)
                .collect::<Vec<_>>();
            values.resize(headers.len(), None);
            rows.push(values);
        }
        Ok(Self::from_parts(headers, rows))
    }

    pub fn from_parts(headers: Vec<String>, mut rows: Vec<Vec<Option<String>>>) -> Self {
        for row in &mut rows {
            row.resize(headers.len(), None);
        }
        let mut columns = HashMap::new();
        for (idx, name) in headers.iter().enumerate() {
            columns.entry(name.clone()).or_insert(idx);
        }
        Self {
            headers,
            columns,
            rows,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize, KiraError> {
        self.columns
            .get(name)
            .copied()
            .ok_or_else(|| KiraError::MissingColumn(name.to_string()))
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row {
            table: self,
            values,
        })
    }

    pub fn drop_duplicates(&mut self) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row.clone()));
    }

    pub fn drop_duplicates_on(&mut self, keys: &[&str]) -> Result<(), KiraError> {
        let indices = keys
            .iter()
            .map(|key| self.column_index(key))
            .collect::<Result<Vec<_>, _>>()?;
        let mut seen = HashSet::new();
        self.rows.retain(|row| {
            let key = indices
                .iter()
                .map(|idx| row[*idx].clone())
                .collect::<Vec<_>>();
            seen.insert(key)
        });
        Ok(())
    }

    pub fn fill_and_uppercase(&mut self, target: &str, fallback: &str) -> Result<(), KiraError> {
        let target_idx = self.column_index(target)?;
        let fallback_idx = self.column_index(fallback)?;
        for row in &mut self.rows {
            if row[target_idx].is_none() {
                row[target_idx] = row[fallback_idx].clone();
            }
            if let Some(value) = row[target_idx].as_mut() {
                *value = value.to_uppercase();
            }
        }
        Ok(())
    }

    pub fn push_position_column(&mut self, name: &str) {
        self.headers.push(name.to_string());
        self.columns
            .entry(name.to_string())
            .or_insert(self.headers.len() - 1);
        for (position, row) in self.rows.iter_mut().enumerate() {
            row.push(Some(position.to_string()));
        }
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(Row<'_>) -> bool,
    {
        let mut rows = std::mem::take(&mut self.rows);
        rows.retain(|values| {
            keep(Row {
                table: self,
                values,
            })
        });
        self.rows = rows;
    }

    pub fn column_kind(&self, name: &str) -> ColumnKind {
        let Some(idx) = self.columns.get(name).copied() else {
            return ColumnKind::Empty;
        };
        let mut kind = ColumnKind::Empty;
        for value in self.rows.iter().filter_map(|row| row[idx].as_deref()) {
            kind = widen(kind, value_kind(value));
            if kind == ColumnKind::Str {
                break;
            }
        }
        kind
    }

    pub fn column_kinds(&self, names: &[&str]) -> HashMap<String, ColumnKind> {
        names
            .iter()
            .map(|name| (name.to_string(), self.column_kind(name)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a SourceTable,
    values: &'a [Option<String>],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Result<Option<&'a str>, KiraError> {
        let idx = self.table.column_index(column)?;
        Ok(self.values[idx].as_deref())
    }

    pub fn get_opt(&self, column: &str) -> Option<&'a str> {
        let idx = self.table.columns.get(column)?;
        self.values[*idx].as_deref()
    }

    pub fn scalar(&self, column: &str, kind: ColumnKind) -> Scalar {
        match self.get_opt(column) {
            Some(value) => typed_scalar(value, kind),
            None => Scalar::Null,
        }
    }
}

fn parse_cell(raw: &str) -> Option<String> {
    if NULL_TOKENS.contains(&raw.trim()) {
        None
    } else {
        Some(raw.to_string())
    }
}

fn value_kind(value: &str) -> ColumnKind {
    if value == "True" || value == "False" {
        ColumnKind::Bool
    } else if value.parse::<i64>().is_ok() {
        ColumnKind::Int
    } else if value.parse::<f64>().is_ok_and(f64::is_finite) {
        ColumnKind::Float
    } else {
        ColumnKind::Str
    }
}

fn widen(current: ColumnKind, next: ColumnKind) -> ColumnKind {
    use ColumnKind::*;
    match (current, next) {
        (Empty, kind) => kind,
        (a, b) if a == b => a,
        (Int, Float) | (Float, Int) => Float,
        _ => Str,
    }
}

fn typed_scalar(value: &str, kind: ColumnKind) -> Scalar {
    let parsed = match kind {
        ColumnKind::Bool => Some(Scalar::Bool(value == "True")),
        ColumnKind::Int => value.parse().ok().map(Scalar::Int),
        ColumnKind::Float => value.parse().ok().map(Scalar::Float),
        ColumnKind::Str | ColumnKind::Empty => None,
    };
    parsed.unwrap_or_else(|| Scalar::Str(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> SourceTable {
        SourceTable::from_reader(text.as_bytes(), b',').unwrap()
    }

    #[test]
    fn null_tokens_become_none() {
        let t = table("a,b,c\nx,,None\nNA,y,nan\n");
        let rows = t.rows().collect::<Vec<_>>();
        assert_eq!(rows[0].get("a").unwrap(), Some("x"));
        assert_eq!(rows[0].get("b").unwrap(), None);
        assert_eq!(rows[0].get("c").unwrap(), None);
        assert_eq!(rows[1].get("a").unwrap(), None);
        assert_eq!(rows[1].get("b").unwrap(), Some("y"));
    }

    #[test]
    fn short_rows_are_padded() {
        let t = table("a,b,c\n1\n");
        let row = t.rows().next().unwrap();
        assert_eq!(row.get("a").unwrap(), Some("1"));
        assert_eq!(row.get("c").unwrap(), None);
    }

    #[test]
    fn missing_column_is_an_error() {
        let t = table("a\n1\n");
        let row = t.rows().next().unwrap();
        assert!(matches!(row.get("b"), Err(KiraError::MissingColumn(_))));
        assert_eq!(row.get_opt("b"), None);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut t = table("k,v\n1,a\n1,a\n1,b\n2,a\n");
        t.drop_duplicates();
        assert_eq!(t.len(), 3);
        t.drop_duplicates_on(&["k"]).unwrap();
        let values = t
            .rows()
            .map(|row| row.get("v").unwrap().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(values, vec!["a", "a"]);
    }

    #[test]
    fn fill_then_uppercase() {
        let mut t = table("cur,calc\ncasf,x\n,cassl\n,\n");
        t.fill_and_uppercase("cur", "calc").unwrap();
        let values = t
            .rows()
            .map(|row| row.get("cur").unwrap().map(str::to_string))
            .collect::<Vec<_>>();
        assert_eq!(
            values,
            vec![Some("CASF".to_string()), Some("CASSL".to_string()), None]
        );
    }

    #[test]
    fn retain_and_positions() {
        let mut t = table("k\na\nb\nc\n");
        t.push_position_column("pos");
        t.retain(|row| row.get("k").unwrap() != Some("b"));
        let positions = t
            .rows()
            .map(|row| row.get("pos").unwrap().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(positions, vec!["0", "2"]);
    }

    #[test]
    fn column_kinds_follow_all_values() {
        let t = table("i,f,b,s,e\n1,1,True,1,\n2,2.5,False,x,\n");
        assert_eq!(t.column_kind("i"), ColumnKind::Int);
        assert_eq!(t.column_kind("f"), ColumnKind::Float);
        assert_eq!(t.column_kind("b"), ColumnKind::Bool);
        assert_eq!(t.column_kind("s"), ColumnKind::Str);
        assert_eq!(t.column_kind("e"), ColumnKind::Empty);
        assert_eq!(t.column_kind("absent"), ColumnKind::Empty);

        let row = t.rows().next().unwrap();
        assert_eq!(row.scalar("f", ColumnKind::Float), Scalar::Float(1.0));
        assert_eq!(row.scalar("s", ColumnKind::Str), Scalar::Str("1".to_string()));
        assert_eq!(row.scalar("e", ColumnKind::Empty), Scalar::Null);
    }

    #[test]
    fn values_are_stored_verbatim() {
        let t = table("cdr3,species,blank\n CAVSF , Homo ,   \n");
        let row = t.rows().next().unwrap();
        assert_eq!(row.get("cdr3").unwrap(), Some(" CAVSF "));
        assert_eq!(row.get("species").unwrap(), Some(" Homo "));
        assert_eq!(row.get("blank").unwrap(), None);
    }

    #[test]
    fn non_finite_numbers_stay_strings() {
        let t = table("score,mixed\ninf,1.5\n2,-infinity\n");
        assert_eq!(t.column_kind("score"), ColumnKind::Str);
        assert_eq!(t.column_kind("mixed"), ColumnKind::Str);

        let row = t.rows().next().unwrap();
        assert_eq!(
            row.scalar("score", ColumnKind::Str),
            Scalar::Str("inf".to_string())
        );
    }

    #[test]
    fn from_parts_pads_short_rows() {
        let t = SourceTable::from_parts(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![Some("1".to_string())], Vec::new()],
        );
        let rows = t.rows().collect::<Vec<_>>();
        assert_eq!(rows[0].get("a").unwrap(), Some("1"));
        assert_eq!(rows[0].get("b").unwrap(), None);
        assert_eq!(rows[1].get_opt("b"), None);
    }
}
