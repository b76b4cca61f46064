use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Range,
    sync::LazyLock,
};

use regex::{Captures, Regex};

use crate::{error::Error, utils::prefix_range, value::Value};

/// Named query parameters, keyed without the leading colon.
pub type Params = BTreeMap<String, Value>;

// `::` is a path separator (type paths live in keys), not a placeholder
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(::)|:([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder pattern is valid")
});

/// One untyped result of a native query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub key: String,
    pub value: Vec<u8>,
}

impl Row {
    pub fn decode<T: prost::Message + Default>(&self) -> Result<T, Error> {
        T::decode(self.value.as_slice()).map_err(Error::DeserializationError)
    }
}

/// Shape of native query text: a key prefix, or `start..end` for a half-open range.
enum KeyQuery<'a> {
    Prefix(&'a str),
    Range(&'a str, &'a str),
}

impl<'a> KeyQuery<'a> {
    fn parse(query: &'a str) -> Result<Self, Error> {
        if query.is_empty() {
            return Err(Error::QueryExecution("empty query".to_string()));
        }
        match query.split_once("..") {
            Some((start, end)) => Ok(KeyQuery::Range(start, end)),
            None => Ok(KeyQuery::Prefix(query)),
        }
    }

    fn parts(&self) -> Vec<&'a str> {
        match self {
            KeyQuery::Prefix(prefix) => vec![*prefix],
            KeyQuery::Range(start, end) => vec![*start, *end],
        }
    }
}

/// Parses native query text into the key range it scans.
pub(crate) fn key_range(query: &str) -> Result<Range<Vec<u8>>, Error> {
    let shape = KeyQuery::parse(query)?;
    to_range(query, &shape.parts())
}

/// Like [`key_range`], with `:name` placeholders filled from `params` after the
/// query shape is fixed. A value is only ever part of one bound.
pub(crate) fn bound_key_range(query: &str, params: &Params) -> Result<Range<Vec<u8>>, Error> {
    let shape = KeyQuery::parse(query)?;
    let bound = bind(&shape.parts(), params)?;
    to_range(query, &bound)
}

fn to_range<S: AsRef<str>>(query: &str, parts: &[S]) -> Result<Range<Vec<u8>>, Error> {
    match parts {
        [prefix] => Ok(prefix_range(prefix.as_ref().as_bytes())),
        [start, end] => {
            let (start, end) = (start.as_ref(), end.as_ref());
            if start.is_empty() || end.is_empty() {
                return Err(Error::QueryExecution(format!(
                    "range query needs both bounds: {}",
                    query
                )));
            }
            if start > end {
                return Err(Error::QueryExecution(format!(
                    "range start sorts after end: {}",
                    query
                )));
            }
            Ok(start.as_bytes().to_vec()..end.as_bytes().to_vec())
        }
        _ => Err(Error::QueryExecution(format!("malformed query: {}", query))),
    }
}

/// Substitutes every `:name` placeholder in each part from `params`.
///
/// Every placeholder needs a parameter and every parameter must be used.
fn bind(parts: &[&str], params: &Params) -> Result<Vec<String>, Error> {
    let mut used = BTreeSet::new();
    let mut missing = None;
    let bound = parts
        .iter()
        .map(|part| {
            PLACEHOLDER
                .replace_all(part, |caps: &Captures| {
                    let Some(name) = caps.get(2) else {
                        return "::".to_string();
                    };
                    match params.get(name.as_str()) {
                        Some(value) => {
                            used.insert(name.as_str().to_string());
                            raw(value)
                        }
                        None => {
                            missing.get_or_insert_with(|| name.as_str().to_string());
                            String::new()
                        }
                    }
                })
                .into_owned()
        })
        .collect::<Vec<_>>();
    if let Some(name) = missing {
        return Err(Error::QueryExecution(format!(
            "no parameter bound for placeholder :{}",
            name
        )));
    }
    if let Some(name) = params.keys().find(|name| !used.contains(*name)) {
        return Err(Error::QueryExecution(format!(
            "parameter {} does not appear in query",
            name
        )));
    }
    Ok(bound)
}

fn raw(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}
