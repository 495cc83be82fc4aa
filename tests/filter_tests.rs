//! Tests for the JSON:API query-parameter translation.

use dora::filter::{ensure_supported_pagination, parse_page, Filters, Page, QueryParams};
use dora::model::{Blade, Chassis, Nic};

fn params(pairs: &[(&str, &str)]) -> QueryParams {
    QueryParams::from_pairs(pairs.iter().copied())
}

#[test]
fn filter_clause_for_inclusion_and_exclusion() {
    let params = params(&[("filter[serial]", "a,b"), ("filter[status]!", "OK")]);
    let (filters, has_filters) = Filters::from_params(&params);
    assert!(has_filters);
    assert_eq!(
        filters.build_clause(Blade::FILTERABLE),
        "serial IN ('a','b') AND status NOT IN ('OK')"
    );
}

#[test]
fn clauses_are_entity_specific() {
    // blade_position exists on blades, not on chassis, so the same filter
    // set translates differently per entity.
    let params = params(&[
        ("filter[vendor]", "HP"),
        ("filter[blade_position]", "3"),
    ]);
    let (filters, _) = Filters::from_params(&params);
    assert_eq!(
        filters.build_clause(Blade::FILTERABLE),
        "vendor IN ('HP') AND blade_position IN (3)"
    );
    assert_eq!(filters.build_clause(Chassis::FILTERABLE), "vendor IN ('HP')");
}

#[test]
fn boolean_filters_are_validated_and_unquoted() {
    let params = params(&[("filter[up]", "true,false,maybe")]);
    let (filters, _) = Filters::from_params(&params);
    assert_eq!(filters.build_clause(Nic::FILTERABLE), "up IN (true,false)");
}

#[test]
fn repeated_filter_keys_merge_into_one_in_set() {
    let params = params(&[("filter[serial]", "a"), ("filter[serial]", "b,c")]);
    let (filters, _) = Filters::from_params(&params);
    assert_eq!(
        filters.build_clause(Blade::FILTERABLE),
        "serial IN ('a','b','c')"
    );
}

#[test]
fn pagination_defaults_and_round_trip_windows() {
    // limit without offset starts at the beginning
    let page = parse_page(&params(&[("page[limit]", "10")])).unwrap();
    assert_eq!(
        page,
        Page {
            offset: Some(0),
            limit: Some(10)
        }
    );

    // offset without limit gets the default window
    let page = parse_page(&params(&[("page[offset]", "20")])).unwrap();
    assert_eq!(
        page,
        Page {
            offset: Some(20),
            limit: Some(100)
        }
    );

    // neither present means no pagination at all
    assert!(!parse_page(&params(&[])).unwrap().is_paginated());

    // consecutive windows never overlap
    for window in 0..5 {
        let page = parse_page(&params(&[
            ("page[offset]", &(window * 10).to_string()),
            ("page[limit]", "10"),
        ]))
        .unwrap();
        assert_eq!(page.offset, Some(window * 10));
        assert_eq!(page.limit, Some(10));
    }
}

#[test]
fn number_size_pagination_is_rejected_with_the_dedicated_error() {
    for key in ["page[number]", "page[size]"] {
        let err = ensure_supported_pagination(&params(&[(key, "1")])).unwrap_err();
        assert!(matches!(err, dora::error::Error::PageSizeAndNumber));
    }
}

#[test]
fn negative_and_garbage_page_values_are_rejected() {
    assert!(parse_page(&params(&[("page[offset]", "-1")])).is_err());
    assert!(parse_page(&params(&[("page[limit]", "ten")])).is_err());
}
