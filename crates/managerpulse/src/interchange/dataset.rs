use super::InterchangeError;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Tsv,
    Json,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Tsv => "tsv",
            Format::Json => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Csv => "text/csv; charset=utf-8",
            Format::Tsv => "text/tab-separated-values; charset=utf-8",
            Format::Json => "application/json",
        }
    }

    /// Guesses the format from a file name's extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|extension| extension.to_str())
            .and_then(|extension| extension.parse().ok())
    }

    fn delimiter(self) -> u8 {
        match self {
            Format::Tsv => b'\t',
            Format::Csv | Format::Json => b',',
        }
    }
}

impl FromStr for Format {
    type Err = InterchangeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "tsv" => Ok(Format::Tsv),
            "json" => Ok(Format::Json),
            other => Err(InterchangeError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tabular view of an exchanged file: a header row plus string cells.
/// Blank cells stand for absent values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn read(format: Format, data: &[u8]) -> Result<Self, InterchangeError> {
        match format {
            Format::Csv | Format::Tsv => read_delimited(format.delimiter(), data),
            Format::Json => read_json(data),
        }
    }

    /// Serializes the dataset. JSON output keeps the typed values in `typed`
    /// when provided so numbers and booleans are not quoted.
    pub fn write(&self, format: Format, typed: Option<&[Vec<Value>]>) -> Result<Vec<u8>, InterchangeError> {
        match format {
            Format::Csv | Format::Tsv => self.write_delimited(format.delimiter()),
            Format::Json => self.write_json(typed),
        }
    }

    fn write_delimited(&self, delimiter: u8) -> Result<Vec<u8>, InterchangeError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|err| InterchangeError::Io(err.into_error()))
    }

    fn write_json(&self, typed: Option<&[Vec<Value>]>) -> Result<Vec<u8>, InterchangeError> {
        let objects: Vec<Value> = match typed {
            Some(rows) => rows
                .iter()
                .map(|row| self.object(row.iter().cloned()))
                .collect(),
            None => self
                .rows
                .iter()
                .map(|row| self.object(row.iter().cloned().map(Value::String)))
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&objects)?)
    }

    fn object(&self, values: impl Iterator<Item = Value>) -> Value {
        let map: Map<String, Value> = self.headers.iter().cloned().zip(values).collect();
        Value::Object(map)
    }
}

fn read_delimited(delimiter: u8, data: &[u8]) -> Result<Dataset, InterchangeError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Dataset { headers, rows })
}

/// Accepts an array of flat objects. Headers are the union of keys in order
/// of first appearance.
fn read_json(data: &[u8]) -> Result<Dataset, InterchangeError> {
    let Value::Array(items) = serde_json::from_slice::<Value>(data)? else {
        return Err(InterchangeError::InvalidDocument(
            "expected a JSON array of objects".to_string(),
        ));
    };

    let mut objects = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(object) => objects.push(object),
            _ => {
                return Err(InterchangeError::InvalidDocument(format!(
                    "row {} is not an object",
                    index + 1
                )))
            }
        }
    }

    let mut headers: Vec<String> = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let rows = objects
        .iter()
        .map(|object| {
            headers
                .iter()
                .map(|header| object.get(header).map(json_cell).unwrap_or_default())
                .collect()
        })
        .collect();

    Ok(Dataset { headers, rows })
}

fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_tab_separated_rows() {
        let data = b"id\tname\tcity\n\tAcme\t Berlin \n";
        let dataset = Dataset::read(Format::Tsv, data).expect("tsv");
        assert_eq!(dataset.headers, vec!["id", "name", "city"]);
        assert_eq!(dataset.rows, vec![vec!["", "Acme", "Berlin"]]);
    }

    #[test]
    fn json_rows_flatten_to_cells() {
        let data = br#"[{"id": 4, "name": "Acme", "is_remote": true, "lat": null}, {"name": "Globex"}]"#;
        let dataset = Dataset::read(Format::Json, data).expect("json");
        assert_eq!(dataset.headers, vec!["id", "is_remote", "lat", "name"]);
        assert_eq!(dataset.rows[0], vec!["4", "1", "", "Acme"]);
        assert_eq!(dataset.rows[1], vec!["", "", "", "Globex"]);
    }

    #[test]
    fn json_document_must_be_an_array() {
        let err = Dataset::read(Format::Json, br#"{"name": "Acme"}"#).expect_err("object");
        assert!(matches!(err, InterchangeError::InvalidDocument(_)));
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("CSV".parse::<Format>().expect("csv"), Format::Csv);
        assert!("xlsx".parse::<Format>().is_err());
    }
}
