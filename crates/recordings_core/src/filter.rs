//! Filter fragments and the AND-combined filter expression handed to the scan
//! service.
//!
//! Every fragment owns one alias. The alias yields the name placeholder
//! `#alias` (bound to the real attribute name) and the value placeholder
//! `:alias` (bound to the comparison value), and the clause reuses both:
//!
//! ```text
//! begins_with(#local_start_time, :local_start_time)
//! contains(#ani, :ani)
//! ```

use std::collections::BTreeMap;

use serde_json::Value;

use crate::Record;
use crate::datetime::{is_date_only, is_date_shaped, normalize_date_time};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// Stored text starts with the value.
    Prefix,
    /// Stored text contains the value anywhere.
    Substring,
}

impl MatchMode {
    /// Pick the mode for a normalizer result.
    ///
    /// A bare `YYYY-MM-DD` is a prefix of every stored timestamp on that day.
    /// Anything longer, or text the normalizer could not place, is matched as
    /// a substring.
    pub fn for_normalized(value: &str) -> Self {
        if is_date_only(value) {
            MatchMode::Prefix
        } else {
            MatchMode::Substring
        }
    }

    pub fn function_name(self) -> &'static str {
        match self {
            MatchMode::Prefix => "begins_with",
            MatchMode::Substring => "contains",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Prefix => "prefix",
            MatchMode::Substring => "substring",
        }
    }

    pub fn matches(self, stored: &str, value: &str) -> bool {
        match self {
            MatchMode::Prefix => stored.starts_with(value),
            MatchMode::Substring => stored.contains(value),
        }
    }
}

/// One field's contribution to a filter expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterFragment {
    mode: MatchMode,
    alias: String,
    field: String,
    value: String,
}

impl FilterFragment {
    pub fn new(
        mode: MatchMode,
        alias: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            alias: alias.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn prefix(
        alias: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(MatchMode::Prefix, alias, field, value)
    }

    pub fn substring(
        alias: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(MatchMode::Substring, alias, field, value)
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn name_placeholder(&self) -> String {
        format!("#{}", self.alias)
    }

    pub fn value_placeholder(&self) -> String {
        format!(":{}", self.alias)
    }

    pub fn clause(&self) -> String {
        format!(
            "{}({}, {})",
            self.mode.function_name(),
            self.name_placeholder(),
            self.value_placeholder()
        )
    }

    /// `#alias -> field`
    pub fn name_binding(&self) -> (String, String) {
        (self.name_placeholder(), self.field.clone())
    }

    /// `:alias -> value`
    pub fn value_binding(&self) -> (String, String) {
        (self.value_placeholder(), self.value.clone())
    }

    /// Evaluate against a record. Missing and non-string attributes never match.
    pub fn matches(&self, record: &Record) -> bool {
        match record.get(&self.field) {
            Some(Value::String(stored)) => self.mode.matches(stored, &self.value),
            _ => false,
        }
    }
}

/// Build the fragment for a searchable date field.
///
/// Blank input contributes nothing. Otherwise the input is normalized: a
/// date-only result becomes a prefix match, a date-and-time result or
/// unrecognized text becomes a substring match on the normalizer's output.
pub fn build_date_filter_fragment(alias: &str, field: &str, raw: &str) -> Option<FilterFragment> {
    let normalized = normalize_date_time(raw)?;
    let mode = MatchMode::for_normalized(&normalized);
    if !is_date_shaped(&normalized) {
        tracing::debug!(field, value = %normalized, "date filter falls back to literal text");
    }
    Some(FilterFragment::new(mode, alias, field, normalized))
}

/// Build the substring fragment for a free-text field such as a caller id.
/// The value is used exactly as typed; only an empty string is skipped.
pub fn build_text_filter_fragment(alias: &str, field: &str, raw: &str) -> Option<FilterFragment> {
    if raw.is_empty() {
        return None;
    }
    Some(FilterFragment::substring(alias, field, raw))
}

/// Fragments joined with `AND`, plus their merged placeholder maps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterExpression {
    fragments: Vec<FilterFragment>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment. A fragment reusing an alias replaces the earlier one
    /// so the placeholder maps never disagree with the clauses.
    pub fn push(&mut self, fragment: Option<FilterFragment>) -> &mut Self {
        let Some(fragment) = fragment else {
            return self;
        };
        match self
            .fragments
            .iter_mut()
            .find(|f| f.alias == fragment.alias)
        {
            Some(existing) => *existing = fragment,
            None => self.fragments.push(fragment),
        }
        self
    }

    pub fn with(mut self, fragment: Option<FilterFragment>) -> Self {
        self.push(fragment);
        self
    }

    pub fn fragments(&self) -> &[FilterFragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// The clause text, or `None` when nothing was added.
    pub fn expression(&self) -> Option<String> {
        if self.fragments.is_empty() {
            return None;
        }
        Some(
            self.fragments
                .iter()
                .map(FilterFragment::clause)
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }

    pub fn names(&self) -> BTreeMap<String, String> {
        self.fragments.iter().map(FilterFragment::name_binding).collect()
    }

    pub fn values(&self) -> BTreeMap<String, String> {
        self.fragments.iter().map(FilterFragment::value_binding).collect()
    }

    /// True when every fragment matches; an empty expression matches everything.
    pub fn matches(&self, record: &Record) -> bool {
        self.fragments.iter().all(|f| f.matches(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn date_only_input_becomes_prefix_match() {
        let f = build_date_filter_fragment("local_start_time", "local_start_time", "2019-01-07")
            .expect("fragment");
        assert_eq!(f.mode(), MatchMode::Prefix);
        assert_eq!(
            f.clause(),
            "begins_with(#local_start_time, :local_start_time)"
        );
        assert_eq!(
            f.name_binding(),
            ("#local_start_time".to_string(), "local_start_time".to_string())
        );
        assert_eq!(
            f.value_binding(),
            (":local_start_time".to_string(), "2019-01-07".to_string())
        );
    }

    #[test]
    fn written_date_without_time_still_uses_prefix() {
        let f = build_date_filter_fragment("start", "local_start_time", "January 7, 2019")
            .expect("fragment");
        assert_eq!(f.mode(), MatchMode::Prefix);
        assert_eq!(f.value(), "2019-01-07");
    }

    #[test]
    fn date_with_time_becomes_substring_match() {
        let f = build_date_filter_fragment(
            "local_start_time",
            "local_start_time",
            "2019-01-07 11:00 AM",
        )
        .expect("fragment");
        assert_eq!(f.mode(), MatchMode::Substring);
        assert_eq!(f.value(), "2019-01-07 11:00:00.000");
        assert_eq!(f.clause(), "contains(#local_start_time, :local_start_time)");
    }

    #[test]
    fn canonical_partial_time_is_kept_verbatim_as_substring() {
        let f = build_date_filter_fragment("end", "local_end_time", "2019-01-07 11:00")
            .expect("fragment");
        assert_eq!(f.mode(), MatchMode::Substring);
        assert_eq!(f.value(), "2019-01-07 11:00");
    }

    #[test]
    fn garbage_becomes_substring_on_input_text() {
        let f = build_date_filter_fragment("local_end_time", "local_end_time", "garbage")
            .expect("fragment");
        assert_eq!(f.mode(), MatchMode::Substring);
        assert_eq!(f.value(), "garbage");
    }

    #[test]
    fn blank_input_contributes_nothing() {
        assert!(build_date_filter_fragment("a", "b", "").is_none());
        assert!(build_date_filter_fragment("a", "b", "   ").is_none());
        assert!(build_text_filter_fragment("ani", "ani", "").is_none());

        let mut expr = FilterExpression::new();
        expr.push(build_date_filter_fragment("a", "b", ""));
        assert!(expr.is_empty());
        assert_eq!(expr.expression(), None);
        assert!(expr.names().is_empty());
        assert!(expr.values().is_empty());
    }

    #[test]
    fn text_fragments_keep_raw_value() {
        let f = build_text_filter_fragment("dnis_code", "dnis_code", " 1300 ").expect("fragment");
        assert_eq!(f.mode(), MatchMode::Substring);
        assert_eq!(f.value(), " 1300 ");
    }

    #[test]
    fn expression_joins_clauses_and_merges_bindings() {
        let expr = FilterExpression::new()
            .with(build_text_filter_fragment("ani", "ani", "0412"))
            .with(build_text_filter_fragment("dnis_code", "dnis_code", ""))
            .with(build_date_filter_fragment(
                "local_start_time",
                "local_start_time",
                "25/12/2019",
            ));
        assert_eq!(
            expr.expression().as_deref(),
            Some("contains(#ani, :ani) AND begins_with(#local_start_time, :local_start_time)")
        );
        let names = expr.names();
        assert_eq!(names.len(), 2);
        assert_eq!(names["#ani"], "ani");
        let values = expr.values();
        assert_eq!(values[":local_start_time"], "2019-12-25");
        assert_eq!(values[":ani"], "0412");
    }

    #[test]
    fn evaluation_order_only_changes_clause_order() {
        let a = build_text_filter_fragment("ani", "ani", "04");
        let b = build_date_filter_fragment("start", "local_start_time", "2019-01-07");
        let ab = FilterExpression::new().with(a.clone()).with(b.clone());
        let ba = FilterExpression::new().with(b).with(a);
        assert_eq!(ab.names(), ba.names());
        assert_eq!(ab.values(), ba.values());
        assert_ne!(ab.expression(), ba.expression());
    }

    #[test]
    fn reused_alias_replaces_fragment() {
        let expr = FilterExpression::new()
            .with(build_text_filter_fragment("ani", "ani", "first"))
            .with(build_text_filter_fragment("ani", "ani", "second"));
        assert_eq!(expr.len(), 1);
        assert_eq!(expr.values()[":ani"], "second");
    }

    #[test]
    fn matches_records_by_mode() {
        let rec = record(json!({
            "ani": "0412555000",
            "local_start_time": "2019-01-07 11:00:00.000",
            "duration": 42
        }));
        let expr = FilterExpression::new()
            .with(build_text_filter_fragment("ani", "ani", "555"))
            .with(build_date_filter_fragment("s", "local_start_time", "7 Jan 2019"));
        assert!(expr.matches(&rec));

        let miss = FilterExpression::new()
            .with(build_date_filter_fragment("s", "local_start_time", "2019-01-08"));
        assert!(!miss.matches(&rec));

        let wrong_type = FilterExpression::new().with(build_text_filter_fragment(
            "duration", "duration", "42",
        ));
        assert!(!wrong_type.matches(&rec));
        assert!(FilterExpression::new().matches(&rec));
    }
}
