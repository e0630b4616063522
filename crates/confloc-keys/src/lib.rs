//! External label-key table: the indirection used by wide form templates
//! whose fields reference a `msgKey` instead of holding inline per-language
//! label nodes. Read wholesale before import, rewritten wholesale after.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::Path;

use confloc_core::Result;

pub const KEY_COLUMN: &str = "label_key";
pub const DEFAULT_COLUMN: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelKeyEntry {
    pub key: String,
    pub default_lang: String,
    pub labels: BTreeMap<String, String>,
}

/// Ordered key table; column order is preserved across a read/rewrite
/// cycle so the regenerated file diffs cleanly against the source.
#[derive(Debug, Clone, Default)]
pub struct LabelKeyTable {
    headers: Vec<String>,
    entries: Vec<LabelKeyEntry>,
    index: HashMap<String, usize>,
}

impl LabelKeyTable {
    pub fn new() -> Self {
        LabelKeyTable {
            headers: vec![KEY_COLUMN.to_string(), DEFAULT_COLUMN.to_string()],
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

        let mut table = LabelKeyTable {
            headers: headers.clone(),
            entries: Vec::new(),
            index: HashMap::new(),
        };

        for record in rdr.records() {
            let record = record?;
            let mut key = String::new();
            let mut default_lang = String::new();
            let mut labels = BTreeMap::new();
            for (header, value) in headers.iter().zip(record.iter()) {
                match header.as_str() {
                    KEY_COLUMN => key = value.to_string(),
                    DEFAULT_COLUMN => default_lang = value.to_string(),
                    _ => {
                        labels.insert(header.clone(), value.to_string());
                    }
                }
            }
            if key.is_empty() {
                continue;
            }
            table.push_entry(LabelKeyEntry {
                key,
                default_lang,
                labels,
            });
        }
        Ok(table)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.to_writer(file)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.headers)?;
        for entry in &self.entries {
            let record: Vec<&str> = self
                .headers
                .iter()
                .map(|h| match h.as_str() {
                    KEY_COLUMN => entry.key.as_str(),
                    DEFAULT_COLUMN => entry.default_lang.as_str(),
                    lang => entry.labels.get(lang).map(String::as_str).unwrap_or(""),
                })
                .collect();
            wtr.write_record(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn push_entry(&mut self, entry: LabelKeyEntry) {
        if let Some(&i) = self.index.get(&entry.key) {
            self.entries[i] = entry;
        } else {
            self.index.insert(entry.key.clone(), self.entries.len());
            self.entries.push(entry);
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&LabelKeyEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn label(&self, key: &str, lang: &str) -> Option<&str> {
        self.get(key)?.labels.get(lang).map(String::as_str)
    }

    /// Update a key's label for a language, creating the entry (and the
    /// language column) when missing. Returns the previous value.
    pub fn set_label(
        &mut self,
        key: &str,
        lang: &str,
        value: &str,
        system_default: &str,
    ) -> Option<String> {
        if !self.headers.iter().any(|h| h == lang) {
            self.headers.push(lang.to_string());
        }
        if !self.contains(key) {
            let default_lang = self
                .entries
                .first()
                .map(|e| e.default_lang.clone())
                .unwrap_or_else(|| system_default.to_string());
            self.push_entry(LabelKeyEntry {
                key: key.to_string(),
                default_lang,
                labels: BTreeMap::new(),
            });
        }
        let i = self.index[key];
        self.entries[i]
            .labels
            .insert(lang.to_string(), value.to_string())
    }
}

/// Country allow-list: the first cell of every row holding a three-letter
/// code.
pub fn read_country_list<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut countries = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(first) = record.get(0) {
            if first.len() == 3 {
                countries.push(first.to_string());
            }
        }
    }
    Ok(countries)
}

pub fn read_country_list_file(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    read_country_list(file)
}
