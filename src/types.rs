use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Field prefix selecting per-HDU record granularity.
pub const HDU_FIELD_PREFIX: &str = "hdu:";

/// Content-checksum field, the archive's primary key for a stored file.
pub const CHECKSUM_FIELD: &str = "md5sum";

/// Default record cap for [`crate::Client::find`].
pub const DEFAULT_FIND_LIMIT: u32 = 500;

/// One result record: field name to value, field set varying per
/// record with the requested outfields.
pub type Record = Map<String, Value>;

/// One per-HDU header as returned by the header endpoint.
pub type HduHeader = Map<String, Value>;

/// Server-side record granularity selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecType {
    /// One record per stored file.
    #[default]
    File,
    /// One record per HDU within a file.
    Hdu,
}

impl RecType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecType::File => "file",
            RecType::Hdu => "hdu",
        }
    }
}

/// An ordered set of search constraints: each entry pairs a field name
/// with `[operator-or-value, operands...]`. Operator tokens are
/// server-defined and pass through opaquely; the client does not
/// interpret or coerce them.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    entries: Vec<(String, Vec<Value>)>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one constraint, keeping insertion order.
    pub fn with(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.entries.push((field.into(), values));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Constrained field names, in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(field, _)| field.as_str())
    }

    /// Compile to the wire search-term list: one `[field, values...]`
    /// per entry, entry and element order preserved.
    pub fn compile(&self) -> Vec<Vec<Value>> {
        self.entries
            .iter()
            .map(|(field, values)| {
                let mut term = Vec::with_capacity(values.len() + 1);
                term.push(Value::String(field.clone()));
                term.extend(values.iter().cloned());
                term
            })
            .collect()
    }
}

/// Wire-level request body for the advanced-search endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSpec {
    pub outfields: Vec<String>,
    pub search: Vec<Vec<Value>>,
}

impl SearchSpec {
    /// Compile outfields and constraints into the request body. Absent
    /// outfields default to the checksum field alone.
    pub fn compile(outfields: Option<&[String]>, constraints: &Constraints) -> Self {
        let outfields = match outfields {
            Some(fields) => fields.to_vec(),
            None => vec![CHECKSUM_FIELD.to_string()],
        };
        SearchSpec {
            outfields,
            search: constraints.compile(),
        }
    }

    /// `hdu` when any requested or constrained field is HDU-scoped,
    /// else `file`.
    pub fn rectype(&self) -> RecType {
        let constrained = self
            .search
            .iter()
            .filter_map(|term| term.first())
            .filter_map(Value::as_str);
        let hdu_scoped = self
            .outfields
            .iter()
            .map(String::as_str)
            .chain(constrained)
            .any(|field| field.starts_with(HDU_FIELD_PREFIX));
        if hdu_scoped { RecType::Hdu } else { RecType::File }
    }
}

/// Options for [`crate::Client::find`].
#[derive(Debug, Clone)]
pub struct FindOptions {
    /// Fields to return per record. `None` requests the checksum field.
    pub outfields: Option<Vec<String>>,

    /// Record selection constraints. Empty means no filter.
    pub constraints: Constraints,

    /// Maximum number of records to return.
    pub limit: u32,

    /// Comma-separated field names to sort by, server-side.
    pub sort: Option<String>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            outfields: None,
            constraints: Constraints::new(),
            limit: DEFAULT_FIND_LIMIT,
            sort: None,
        }
    }
}

/// Options for [`crate::Client::vohdu`]. Absent fields are omitted
/// from the query string entirely, never sent empty.
#[derive(Debug, Clone)]
pub struct VohduOptions {
    pub instrument: Option<String>,
    pub obs_type: Option<String>,
    pub proc_type: Option<String>,
    pub verb: Option<u32>,
    pub format: Option<String>,
    pub limit: Option<u32>,
}

impl Default for VohduOptions {
    fn default() -> Self {
        Self {
            instrument: None,
            obs_type: None,
            proc_type: None,
            verb: Some(0),
            format: Some("ALL".to_string()),
            limit: None,
        }
    }
}

impl VohduOptions {
    /// Query parameters for the SIA endpoint. Absent options
    /// contribute no pair at all.
    pub(crate) fn query_pairs(&self, pos: (f64, f64), size: f64) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("format", "json".to_string()),
            ("POS", format!("{},{}", pos.0, pos.1)),
            ("SIZE", size.to_string()),
        ];
        if let Some(v) = &self.instrument {
            pairs.push(("instrument", v.clone()));
        }
        if let Some(v) = &self.obs_type {
            pairs.push(("obs_type", v.clone()));
        }
        if let Some(v) = &self.proc_type {
            pairs.push(("proc_type", v.clone()));
        }
        if let Some(v) = self.verb {
            pairs.push(("VERB", v.to_string()));
        }
        if let Some(v) = &self.format {
            pairs.push(("FORMAT", v.clone()));
        }
        if let Some(v) = self.limit {
            pairs.push(("limit", v.to_string()));
        }
        pairs
    }
}

/// A query result: the server's metadata section plus the ordered
/// record list, exactly as received. All record selection happens
/// server-side; nothing is filtered, sorted, or mutated here.
#[derive(Debug, Clone)]
pub struct Found {
    header: Map<String, Value>,
    records: Vec<Record>,
}

impl Found {
    /// Split a response object into its metadata section and records.
    /// A missing `records` key reads as an empty result set.
    pub fn from_json(body: Value) -> Result<Self> {
        let Value::Object(mut map) = body else {
            return Err(Error::BadResponse("response body is not a JSON object".to_string()));
        };
        let records = match map.remove("records") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(Error::BadResponse(format!("non-object record: {other}"))),
                })
                .collect::<Result<_>>()?,
            Some(other) => {
                return Err(Error::BadResponse(format!("records is not an array: {other}")));
            }
        };
        Ok(Found {
            header: map,
            records,
        })
    }

    /// Response metadata: every top-level key except `records`.
    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Display for Found {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Find Results: {} records", self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_constraints_compile_empty() {
        let spec = SearchSpec::compile(None, &Constraints::new());
        assert!(spec.search.is_empty());
        assert_eq!(spec.outfields, vec![CHECKSUM_FIELD.to_string()]);
    }

    #[test]
    fn test_explicit_outfields_pass_through() {
        let outfields = vec!["instrument".to_string(), "proc_type".to_string()];
        let spec = SearchSpec::compile(Some(&outfields), &Constraints::new());
        assert_eq!(spec.outfields, outfields);
    }

    #[test]
    fn test_constraint_term_preserves_element_order() {
        let constraints = Constraints::new().with("filesize", vec![json!(1e9), json!(1e10)]);
        assert_eq!(constraints.compile(), vec![vec![json!("filesize"), json!(1e9), json!(1e10)]]);

        let constraints = Constraints::new().with("f", vec![json!("op"), json!("v1"), json!("v2")]);
        assert_eq!(
            constraints.compile(),
            vec![vec![json!("f"), json!("op"), json!("v1"), json!("v2")]]
        );
    }

    #[test]
    fn test_constraint_entries_preserve_insertion_order() {
        let constraints = Constraints::new()
            .with("instrument", vec![json!("decam")])
            .with("obs_type", vec![json!("object")]);
        let terms = constraints.compile();
        assert_eq!(terms[0][0], json!("instrument"));
        assert_eq!(terms[1][0], json!("obs_type"));
    }

    #[test]
    fn test_rectype_hdu_from_outfields() {
        let outfields = vec!["hdu:exptime".to_string()];
        let spec = SearchSpec::compile(Some(&outfields), &Constraints::new());
        assert_eq!(spec.rectype(), RecType::Hdu);
    }

    #[test]
    fn test_rectype_hdu_from_constraints() {
        let constraints = Constraints::new().with("hdu:ra_min", vec![json!(10.0)]);
        let spec = SearchSpec::compile(None, &constraints);
        assert_eq!(spec.rectype(), RecType::Hdu);
    }

    #[test]
    fn test_rectype_file_without_hdu_fields() {
        let outfields = vec!["instrument".to_string()];
        let spec = SearchSpec::compile(Some(&outfields), &Constraints::new());
        assert_eq!(spec.rectype(), RecType::File);
    }

    #[test]
    fn test_search_spec_serializes_to_wire_shape() {
        let constraints = Constraints::new().with("instrument", vec![json!("decam")]);
        let spec = SearchSpec::compile(None, &constraints);
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"outfields": ["md5sum"], "search": [["instrument", "decam"]]})
        );
    }

    #[test]
    fn test_vohdu_absent_options_are_omitted() {
        let opts = VohduOptions {
            verb: None,
            format: None,
            ..VohduOptions::default()
        };
        let pairs = opts.query_pairs((10.0, 20.0), 0.25);
        let keys: Vec<&str> = pairs.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec!["format", "POS", "SIZE"]);
        assert_eq!(pairs[1].1, "10,20");
    }

    #[test]
    fn test_vohdu_defaults_carry_verb_and_format() {
        let pairs = VohduOptions::default().query_pairs((194.5, 21.25), 0.5);
        assert!(pairs.contains(&("POS", "194.5,21.25".to_string())));
        assert!(pairs.contains(&("VERB", "0".to_string())));
        assert!(pairs.contains(&("FORMAT", "ALL".to_string())));
        assert!(!pairs.iter().any(|(key, _)| *key == "instrument"));
    }

    #[test]
    fn test_found_splits_header_and_records() {
        let body = json!({
            "HEADER": {"cutoff": 500},
            "records": [{"md5sum": "abc"}, {"md5sum": "def"}]
        });
        let found = Found::from_json(body).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.records()[0]["md5sum"], json!("abc"));
        assert!(found.header().contains_key("HEADER"));
        assert!(!found.header().contains_key("records"));
        assert_eq!(found.to_string(), "Find Results: 2 records");
    }

    #[test]
    fn test_found_without_records_is_empty() {
        let found = Found::from_json(json!({"status": "ok"})).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_found_rejects_non_object_body() {
        assert!(Found::from_json(json!([1, 2])).is_err());
    }
}
