//! Tabular MOF property data (CoREMOF-style CSV).

use std::io::Read;
use std::path::Path;

use anyhow::Context;

/// One row of the lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct MofRecord {
    pub name: String,
    fields: Vec<String>,
}

impl MofRecord {
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// In-memory lookup table keyed by material name.
#[derive(Debug, Clone)]
pub struct MofTable {
    headers: Vec<String>,
    name_column: usize,
    rows: Vec<MofRecord>,
}

impl MofTable {
    pub fn load(path: &Path, name_column: &str) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        Self::from_reader(file, name_column).with_context(|| format!("reading {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R, name_column: &str) -> anyhow::Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);

        let headers: Vec<String> = csv.headers()?.iter().map(str::to_string).collect();
        let name_idx = headers
            .iter()
            .position(|h| h == name_column)
            .ok_or_else(|| anyhow::anyhow!("no '{}' column in table header", name_column))?;

        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record?;
            let fields: Vec<String> = record.iter().map(str::to_string).collect();
            rows.push(MofRecord {
                name: fields[name_idx].clone(),
                fields,
            });
        }

        Ok(Self {
            headers,
            name_column: name_idx,
            rows,
        })
    }

    pub fn empty(name_column: &str) -> Self {
        Self {
            headers: vec![name_column.to_string()],
            name_column: 0,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[MofRecord] {
        &self.rows
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        let wanted = column.trim();
        self.headers
            .iter()
            .position(|h| h == wanted)
            .or_else(|| self.headers.iter().position(|h| h.eq_ignore_ascii_case(wanted)))
    }

    /// Columns other than the name whose values all parse as numbers.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.name_column)
            .filter(|(i, _)| {
                !self.rows.is_empty()
                    && self
                        .rows
                        .iter()
                        .all(|r| r.fields[*i].is_empty() || r.fields[*i].parse::<f64>().is_ok())
            })
            .map(|(_, h)| h.as_str())
            .collect()
    }

    /// Find a material by name, ignoring case and a `_clean` suffix.
    pub fn find(&self, name: &str) -> Option<&MofRecord> {
        let wanted = normalize(name);
        self.rows.iter().find(|r| normalize(&r.name) == wanted)
    }

    pub fn value<'a>(&self, record: &'a MofRecord, column: &str) -> Option<&'a str> {
        self.column_index(column)
            .map(|i| record.fields[i].as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn number(&self, record: &MofRecord, column: &str) -> Option<f64> {
        self.value(record, column).and_then(|v| v.parse().ok())
    }

    /// Rows ranked by a numeric column; rows without a value are skipped.
    pub fn ranked(&self, column: &str, descending: bool, limit: usize) -> Vec<(&MofRecord, f64)> {
        let Some(idx) = self.column_index(column) else {
            return Vec::new();
        };
        let mut scored: Vec<(&MofRecord, f64)> = self
            .rows
            .iter()
            .filter_map(|r| r.fields[idx].parse::<f64>().ok().map(|v| (r, v)))
            .filter(|(_, v)| v.is_finite())
            .collect();
        scored.sort_by(|a, b| {
            let ord = a.1.total_cmp(&b.1);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        scored.truncate(limit);
        scored
    }

    /// `column=value` pairs for a record, skipping the name and empty cells.
    pub fn describe(&self, record: &MofRecord, columns: &[&str]) -> String {
        self.headers
            .iter()
            .enumerate()
            .filter(|(i, h)| {
                *i != self.name_column && (columns.is_empty() || columns.contains(&h.as_str()))
            })
            .filter(|(i, _)| !record.fields[*i].is_empty())
            .map(|(i, h)| format!("{}={}", h, record.fields[i]))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn normalize(name: &str) -> String {
    let upper = name.trim().to_uppercase();
    upper
        .strip_suffix("_CLEAN")
        .map(str::to_string)
        .unwrap_or(upper)
}
