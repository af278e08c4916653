use recordings_core::{
    FilterExpression, MatchMode, build_date_filter_fragment, build_text_filter_fragment,
    normalize_date_time,
};

#[test]
fn date_only_search_becomes_prefix_match() {
    let fragment = build_date_filter_fragment("local_start_time", "local_start_time", "01/07/2019")
        .expect("fragment");
    assert_eq!(fragment.mode(), MatchMode::Prefix);
    assert_eq!(fragment.value(), "2019-01-07");
    assert_eq!(
        fragment.clause(),
        "begins_with(#local_start_time, :local_start_time)"
    );
}

#[test]
fn date_time_search_becomes_substring_match() {
    let fragment =
        build_date_filter_fragment("local_end_time", "local_end_time", "01/07/2019 11:00 AM")
            .expect("fragment");
    assert_eq!(fragment.mode(), MatchMode::Substring);
    assert_eq!(fragment.value(), "2019-01-07 11:00:00.000");
}

#[test]
fn month_and_year_search_is_prefix_on_the_first() {
    let fragment = build_date_filter_fragment("local_start_time", "local_start_time", "January 2019")
        .expect("fragment");
    assert_eq!(fragment.mode(), MatchMode::Prefix);
    assert_eq!(fragment.value(), "2019-01-01");

    let fragment = build_date_filter_fragment("local_start_time", "local_start_time", "Jan 19")
        .expect("fragment");
    assert_eq!(fragment.mode(), MatchMode::Substring);
    assert_eq!(fragment.value(), "Jan 19");
}

#[test]
fn unrecognised_date_text_is_searched_verbatim() {
    let fragment = build_date_filter_fragment("local_start_time", "local_start_time", " 11:05 ")
        .expect("fragment");
    assert_eq!(fragment.mode(), MatchMode::Substring);
    assert_eq!(fragment.value(), "11:05");
    assert!(build_date_filter_fragment("local_start_time", "local_start_time", "  ").is_none());
}

#[test]
fn full_search_filter_joins_with_and() {
    let mut filter = FilterExpression::new();
    filter
        .push(build_text_filter_fragment("ani", "ani", "0412"))
        .push(build_text_filter_fragment("dnis_code", "dnis_code", ""))
        .push(build_date_filter_fragment(
            "local_start_time",
            "local_start_time",
            "January 7, 2019",
        ));

    assert_eq!(
        filter.expression().as_deref(),
        Some("contains(#ani, :ani) AND begins_with(#local_start_time, :local_start_time)")
    );
    let names = filter.names();
    assert_eq!(names.get("#ani").map(String::as_str), Some("ani"));
    assert_eq!(
        names.get("#local_start_time").map(String::as_str),
        Some("local_start_time")
    );
    let values = filter.values();
    assert_eq!(values.get(":ani").map(String::as_str), Some("0412"));
    assert_eq!(
        values.get(":local_start_time").map(String::as_str),
        Some("2019-01-07")
    );
}

#[test]
fn empty_filter_has_no_expression() {
    let filter = FilterExpression::new()
        .with(build_text_filter_fragment("ani", "ani", ""))
        .with(build_date_filter_fragment("local_end_time", "local_end_time", ""));
    assert!(filter.is_empty());
    assert_eq!(filter.expression(), None);
    assert!(filter.names().is_empty());
}

#[test]
fn normalizer_public_entry_point() {
    assert_eq!(normalize_date_time("2019-01-07").as_deref(), Some("2019-01-07"));
    assert_eq!(
        normalize_date_time("25/12/2019 10:30 PM").as_deref(),
        Some("2019-12-25 22:30:00.000")
    );
    assert_eq!(normalize_date_time("\n"), None);
}
