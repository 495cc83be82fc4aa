//! JSON:API query-parameter translation: `filter[...]` parsing and the
//! filter-to-SQL clause builder, plus the page[offset]/page[limit] rules.

use crate::error::{Error, Result};
use crate::model::{FieldDef, FieldKind};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static SIMPLE_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^filter\[([^\]\[]+)\]!?$").expect("simple filter regex"));
static EXTENDED_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^filter\[([^\]\[]+)\]\[([^\]\[]+)\]!?$").expect("extended filter regex")
});

/// Query parameters in arrival order. Values are comma-split the way the
/// JSON:API convention expects (`filter[serial]=a,b` is two values).
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pairs: Vec<(String, Vec<String>)>,
}

impl QueryParams {
    pub fn from_pairs<I, K, V>(raw: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = QueryParams::default();
        for (key, value) in raw {
            let values = value.as_ref().split(',').map(str::to_string);
            match params
                .pairs
                .iter_mut()
                .find(|(k, _)| k.as_str() == key.as_ref())
            {
                Some((_, existing)) => existing.extend(values),
                None => params
                    .pairs
                    .push((key.as_ref().to_string(), values.collect())),
            }
        }
        params
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.pairs
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
    pub exclusion: bool,
}

/// The set of filters received on one API call.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    filters: Vec<Filter>,
}

impl Filters {
    /// Extracts every `filter[...]` parameter. A trailing `!` on the key
    /// marks exclusion. The extended `filter[f][op]` form is accepted for
    /// equality ops; anything else is ignored.
    pub fn from_params(params: &QueryParams) -> (Self, bool) {
        let mut filters = Filters::default();
        for (key, values) in params.iter() {
            if let Some(captures) = EXTENDED_FILTER.captures(key) {
                let op = captures.get(2).map_or("", |m| m.as_str());
                if op == "eq" || op == "in" {
                    filters.add(&captures[1], values.to_vec(), key.ends_with('!'));
                } else {
                    debug!(filter = key, op, "ignoring unsupported filter operator");
                }
            } else if let Some(captures) = SIMPLE_FILTER.captures(key) {
                filters.add(&captures[1], values.to_vec(), key.ends_with('!'));
                debug!(filter = &captures[1], ?values, "request with filters");
            }
        }

        let has_filters = !filters.filters.is_empty();
        (filters, has_filters)
    }

    pub fn add(&mut self, name: &str, values: Vec<String>, exclusion: bool) {
        self.filters.push(Filter {
            name: name.to_string(),
            values,
            exclusion,
        });
    }

    pub fn get(&self) -> &[Filter] {
        &self.filters
    }

    /// Builds the WHERE clause against an entity's filterable-field table.
    /// Unknown or hidden fields are skipped silently; string literals are
    /// quoted and escaped, numeric and boolean literals validated.
    pub fn build_clause(&self, fields: &[FieldDef]) -> String {
        let mut clause = String::new();
        for filter in &self.filters {
            if filter.values.len() == 1 && filter.values[0].is_empty() {
                continue;
            }
            let Some(def) = fields.iter().find(|def| def.name == filter.name) else {
                continue;
            };

            let literals: Vec<String> = match def.kind {
                FieldKind::Text => filter
                    .values
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect(),
                FieldKind::Bool => filter
                    .values
                    .iter()
                    .filter(|v| v.parse::<bool>().is_ok())
                    .cloned()
                    .collect(),
                FieldKind::Int => filter
                    .values
                    .iter()
                    .filter(|v| v.parse::<i64>().is_ok())
                    .cloned()
                    .collect(),
                FieldKind::Float => filter
                    .values
                    .iter()
                    .filter(|v| v.parse::<f64>().is_ok())
                    .cloned()
                    .collect(),
            };
            if literals.is_empty() {
                continue;
            }

            let op = if filter.exclusion { "NOT IN" } else { "IN" };
            if !clause.is_empty() {
                clause.push_str(" AND ");
            }
            clause.push_str(&format!("{} {} ({})", def.name, op, literals.join(",")));
        }
        clause
    }
}

/// Offset/limit as received, after the defaulting rules: offset falls back
/// to 0 when only a limit was given, the limit to 100 when only an offset
/// was given. Both absent means "all rows".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl Page {
    pub fn is_paginated(&self) -> bool {
        self.offset.is_some() && self.limit.is_some()
    }
}

/// Rejects the page[number]/page[size] style some clients try to use.
pub fn ensure_supported_pagination(params: &QueryParams) -> Result<()> {
    for invalid in ["page[number]", "page[size]"] {
        if params.contains(invalid) {
            return Err(Error::PageSizeAndNumber);
        }
    }
    Ok(())
}

pub fn parse_page(params: &QueryParams) -> Result<Page> {
    let offset = first_non_empty(params, "page[offset]");
    let limit = first_non_empty(params, "page[limit]");
    let has_offset = params.contains("page[offset]");
    let has_limit = params.contains("page[limit]");

    let offset = match offset {
        Some(raw) => Some(parse_number(raw)?),
        None if has_offset || has_limit => Some(0),
        None => None,
    };
    let limit = match limit {
        Some(raw) => Some(parse_number(raw)?),
        None if has_offset || has_limit => Some(100),
        None => None,
    };

    Ok(Page { offset, limit })
}

fn first_non_empty<'a>(params: &'a QueryParams, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|values| values.first())
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn parse_number(raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or(Error::PageSizeAndNumber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Blade;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        QueryParams::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn inclusion_and_exclusion_build_the_documented_clause() {
        let params = params(&[("filter[serial]", "a,b"), ("filter[status]!", "OK")]);
        let (filters, has_filters) = Filters::from_params(&params);
        assert!(has_filters);

        let clause = filters.build_clause(Blade::FILTERABLE);
        assert_eq!(clause, "serial IN ('a','b') AND status NOT IN ('OK')");
    }

    #[test]
    fn unknown_fields_are_skipped_silently() {
        let params = params(&[("filter[nonexistent]", "x"), ("filter[serial]", "a")]);
        let (filters, _) = Filters::from_params(&params);
        assert_eq!(filters.build_clause(Blade::FILTERABLE), "serial IN ('a')");
    }

    #[test]
    fn string_values_are_escaped() {
        let params = params(&[("filter[name]", "o'brien")]);
        let (filters, _) = Filters::from_params(&params);
        assert_eq!(
            filters.build_clause(Blade::FILTERABLE),
            "name IN ('o''brien')"
        );
    }

    #[test]
    fn numeric_fields_are_unquoted_and_validated() {
        let params = params(&[("filter[memory_gb]", "128,256,bogus")]);
        let (filters, _) = Filters::from_params(&params);
        assert_eq!(
            filters.build_clause(Blade::FILTERABLE),
            "memory_gb IN (128,256)"
        );
    }

    #[test]
    fn empty_filter_values_are_dropped() {
        let params = params(&[("filter[serial]", "")]);
        let (filters, has_filters) = Filters::from_params(&params);
        assert!(has_filters);
        assert_eq!(filters.build_clause(Blade::FILTERABLE), "");
    }

    #[test]
    fn extended_equality_form_is_accepted() {
        let params = params(&[("filter[vendor][eq]", "HP")]);
        let (filters, has_filters) = Filters::from_params(&params);
        assert!(has_filters);
        assert_eq!(filters.build_clause(Blade::FILTERABLE), "vendor IN ('HP')");
    }

    #[test]
    fn page_defaults_follow_the_offset_limit_rules() {
        let page = parse_page(&params(&[("page[limit]", "10")])).unwrap();
        assert_eq!(page, Page { offset: Some(0), limit: Some(10) });

        let page = parse_page(&params(&[("page[offset]", "40")])).unwrap();
        assert_eq!(page, Page { offset: Some(40), limit: Some(100) });

        let page = parse_page(&params(&[])).unwrap();
        assert!(!page.is_paginated());
    }

    #[test]
    fn empty_page_values_take_their_defaults() {
        let page =
            parse_page(&params(&[("page[offset]", ""), ("page[limit]", "5")])).unwrap();
        assert_eq!(page, Page { offset: Some(0), limit: Some(5) });
    }

    #[test]
    fn number_size_pagination_is_rejected() {
        let err = ensure_supported_pagination(&params(&[("page[number]", "1")])).unwrap_err();
        assert!(matches!(err, Error::PageSizeAndNumber));
    }
}
