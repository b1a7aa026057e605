//! Recorded function results
//!
//! `<dir>/<module/path>/<function>.json` holds a list of cases:
//!
//! ```json
//! [
//!   {"args": {"id": 2758752}, "result": {"AGASC_ID": 2758752, "MAG_ACA": 9.1}},
//!   {"result": {"$table": {"slot": [0, 1]}, "$mask": {"slot": [false, true]}}}
//! ]
//! ```
//!
//! The first case whose `args` equal the call's arguments answers the call;
//! a case without `args` answers any call. When every case lists `args`,
//! argument names are checked first: a name no case uses is unexpected and a
//! name every case uses is required. Results are plain JSON or one of
//! the tagged forms `$table` (+ `$mask`), `$masked` + `$mask`, `$bytes`,
//! `$tuple`, `$opaque` + `$repr`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::dispatch::value::ShapeError;
use crate::dispatch::{AllowList, ApiValue, CallError, Column, Kwargs, MaskedArray, Registry, Table};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixtures directory \"{}\" does not exist", .0.display())]
    MissingDir(PathBuf),

    #[error("invalid fixture pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("cannot read fixture {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed fixture {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("bad fixture value in {}: {message}", .path.display())]
    Value { path: PathBuf, message: String },
}

#[derive(Debug, Deserialize)]
struct RawCase {
    #[serde(default)]
    args: Option<Map<String, Value>>,
    result: Value,
}

#[derive(Debug)]
struct Case {
    args: Option<Map<String, Value>>,
    result: ApiValue,
}

impl Case {
    fn matches(&self, kwargs: &Kwargs) -> bool {
        let Some(args) = &self.args else {
            return true;
        };
        args.len() == kwargs.len()
            && args
                .iter()
                .all(|(name, expected)| kwargs.get(name).is_some_and(|v| v.to_json() == *expected))
    }
}

/// Argument names the recorded cases accept.
///
/// Only known when every case lists its `args`: a name in no case is
/// unexpected, a name in every case is required.
#[derive(Debug)]
struct Signature {
    known: Vec<String>,
    required: Vec<String>,
}

impl Signature {
    fn from_cases(cases: &[Case]) -> Option<Self> {
        let mut all_args = cases.iter().map(|case| case.args.as_ref());
        let first = all_args.next()??;
        let mut known: Vec<String> = first.keys().cloned().collect();
        let mut required = known.clone();
        for args in all_args {
            let args = args?;
            required.retain(|name| args.contains_key(name));
            for name in args.keys() {
                if !known.contains(name) {
                    known.push(name.clone());
                }
            }
        }
        Some(Self { known, required })
    }

    fn check(&self, function: &str, kwargs: &Kwargs) -> Result<(), CallError> {
        let unexpected = kwargs
            .keys()
            .find(|k| !self.known.iter().any(|n| n.as_str() == *k));
        if let Some(name) = unexpected {
            return Err(CallError::UnexpectedArgument {
                function: function.to_string(),
                name: name.to_string(),
            });
        }
        if let Some(name) = self.required.iter().find(|n| kwargs.get(n).is_none()) {
            return Err(CallError::MissingArgument {
                function: function.to_string(),
                name: name.clone(),
            });
        }
        Ok(())
    }
}

/// Register every allow-listed fixture under `dir`; returns how many were added
pub fn register_fixtures(
    registry: &mut Registry,
    dir: &Path,
    allow_list: &AllowList,
) -> Result<usize, FixtureError> {
    if !dir.is_dir() {
        return Err(FixtureError::MissingDir(dir.to_path_buf()));
    }

    let mut count = 0;
    for entry in allow_list.entries() {
        let module_dir = entry
            .module()
            .split('.')
            .fold(dir.to_path_buf(), |path, part| path.join(part));
        let pattern =
            Path::new(&glob::Pattern::escape(&module_dir.to_string_lossy())).join("*.json");

        let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
            .filter_map(Result::ok)
            .collect();
        files.sort();

        for path in files {
            let Some(function) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !entry.allows(function) {
                crate::logger::log_warning(&format!(
                    "Skipping fixture {} (not allowed for {})",
                    path.display(),
                    entry.module()
                ));
                continue;
            }

            let cases = Arc::new(load_cases(&path)?);
            let signature = Signature::from_cases(&cases);
            let name = function.to_string();
            let qualified = format!("{}.{function}", entry.module());
            registry.register(entry.module(), function, move |kwargs| {
                if let Some(signature) = &signature {
                    signature.check(&name, kwargs)?;
                }
                cases
                    .iter()
                    .find(|case| case.matches(kwargs))
                    .map(|case| case.result.clone())
                    .ok_or_else(|| {
                        CallError::Failed(format!("no recorded result for {qualified}({kwargs})"))
                    })
            });
            count += 1;
        }
    }
    Ok(count)
}

fn load_cases(path: &Path) -> Result<Vec<Case>, FixtureError> {
    let contents = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: Vec<RawCase> = serde_json::from_str(&contents).map_err(|source| FixtureError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    raw.into_iter()
        .map(|case| {
            Ok(Case {
                args: case.args,
                result: fixture_value(case.result).map_err(|message| FixtureError::Value {
                    path: path.to_path_buf(),
                    message,
                })?,
            })
        })
        .collect()
}

/// Convert a fixture result, expanding the `$` tagged forms
pub fn fixture_value(value: Value) -> Result<ApiValue, String> {
    match value {
        Value::Array(items) => Ok(ApiValue::List(
            items.into_iter().map(fixture_value).collect::<Result<_, _>>()?,
        )),
        Value::Object(mut map) => {
            if let Some(columns) = map.remove("$table") {
                return table(columns, map.remove("$mask"));
            }
            if let Some(data) = map.remove("$masked") {
                let data = list(data, "$masked")?;
                let mask = bools(map.remove("$mask").unwrap_or(Value::Null), "$mask")?;
                return MaskedArray::new(data, mask)
                    .map(ApiValue::Masked)
                    .map_err(|e| e.to_string());
            }
            if let Some(text) = map.remove("$bytes") {
                let text = text.as_str().ok_or("$bytes must be a string")?;
                return Ok(ApiValue::Bytes(text.as_bytes().to_vec()));
            }
            if let Some(items) = map.remove("$tuple") {
                return list(items, "$tuple").map(ApiValue::List);
            }
            if let Some(type_name) = map.remove("$opaque") {
                let type_name = type_name.as_str().ok_or("$opaque must be a string")?;
                let repr = map
                    .remove("$repr")
                    .and_then(|r| r.as_str().map(ToString::to_string))
                    .unwrap_or_else(|| format!("<{type_name} object>"));
                return Ok(ApiValue::Opaque {
                    type_name: type_name.to_string(),
                    repr,
                });
            }
            Ok(ApiValue::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, fixture_value(v)?)))
                    .collect::<Result<_, String>>()?,
            ))
        }
        scalar => Ok(scalar.into()),
    }
}

fn list(value: Value, tag: &str) -> Result<Vec<ApiValue>, String> {
    match value {
        Value::Array(items) => items.into_iter().map(fixture_value).collect(),
        _ => Err(format!("{tag} must be a list")),
    }
}

fn bools(value: Value, tag: &str) -> Result<Vec<bool>, String> {
    value
        .as_array()
        .ok_or_else(|| format!("{tag} must be a list of booleans"))?
        .iter()
        .map(|v| v.as_bool().ok_or_else(|| format!("{tag} must be a list of booleans")))
        .collect()
}

fn table(columns: Value, masks: Option<Value>) -> Result<ApiValue, String> {
    let Value::Object(columns) = columns else {
        return Err("$table must map column names to lists".to_string());
    };
    let mut masks = match masks {
        Some(Value::Object(m)) => m,
        Some(_) => return Err("$mask of a table must map column names to lists".to_string()),
        None => Map::new(),
    };

    let columns = columns
        .into_iter()
        .map(|(name, values)| {
            let values = list(values, &name)?;
            let column = Column::new(name.clone(), values);
            Ok(match masks.remove(&name) {
                Some(mask) => column.with_mask(bools(mask, "$mask")?),
                None => column,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    Table::new(columns)
        .map(ApiValue::Table)
        .map_err(|e: ShapeError| e.to_string())
}
