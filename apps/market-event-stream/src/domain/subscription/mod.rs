//! Subscription Filter Types
//!
//! Server-side filters restrict which events are pushed. A filter either
//! selects subjects by attributes (area, category, free-text query, ...) or by
//! explicit subject names; both share an event-type list and an optional
//! time window.
//!
//! # Design
//!
//! Callers build a [`Filter`] from plain strings. [`Filter::validate`] checks
//! every field and reports all violations at once, then resolves the filter to
//! a [`FilterSpec`]. Explicit names always win: a filter with names becomes a
//! [`NameFilter`] and its attribute fields are discarded.

use std::fmt;

use chrono::{DateTime, FixedOffset};

use super::streaming::{EventKind, parse_datetime};

// =============================================================================
// Validated Filters
// =============================================================================

/// Fields shared by both filter variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterWindow {
    /// Event kinds to receive.
    pub event_types: Vec<EventKind>,
    /// Only events touching data at or after this time.
    pub begin: Option<DateTime<FixedOffset>>,
    /// Only events touching data before this time.
    pub end: Option<DateTime<FixedOffset>>,
}

/// Select subjects by their attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeFilter {
    /// Free-text query.
    pub q: Option<String>,
    /// Price or bidding areas.
    pub areas: Vec<String>,
    /// Categories (prefix match).
    pub categories: Vec<String>,
    /// Categories (exact match).
    pub exact_categories: Vec<String>,
    /// Commodities.
    pub commodities: Vec<String>,
    /// Data sources.
    pub sources: Vec<String>,
    /// Data types (actual, forecast, ...).
    pub data_types: Vec<String>,
}

/// Select subjects by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameFilter {
    /// Explicit subject names.
    pub names: Vec<String>,
}

/// The two mutually exclusive filter variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSelector {
    /// Attribute based selection.
    Attribute(AttributeFilter),
    /// Name based selection.
    Name(NameFilter),
}

/// A validated server-side filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    /// Shared event-type list and time window.
    pub window: FilterWindow,
    /// Variant specific selection.
    pub selector: FilterSelector,
}

impl FilterSpec {
    /// Check if this is a name filter.
    #[must_use]
    pub const fn is_name_filter(&self) -> bool {
        matches!(self.selector, FilterSelector::Name(_))
    }
}

// =============================================================================
// Filter Builder
// =============================================================================

/// Unvalidated filter as supplied by the caller.
///
/// # Example
///
/// ```rust
/// use market_event_stream::domain::subscription::Filter;
///
/// let spec = Filter::new()
///     .area("DE")
///     .event_type("UPDATE")
///     .begin("2024-01-01")
///     .validate()
///     .unwrap();
/// assert!(!spec.is_name_filter());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    names: Vec<String>,
    event_types: Vec<String>,
    begin: Option<String>,
    end: Option<String>,
    q: Option<String>,
    areas: Vec<String>,
    categories: Vec<String>,
    exact_categories: Vec<String>,
    commodities: Vec<String>,
    sources: Vec<String>,
    data_types: Vec<String>,
}

impl Filter {
    /// Create an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an explicit subject name (selects a name filter).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    /// Add several explicit subject names.
    #[must_use]
    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add an event-type tag.
    #[must_use]
    pub fn event_type(mut self, tag: impl Into<String>) -> Self {
        self.event_types.push(tag.into());
        self
    }

    /// Add several event-type tags.
    #[must_use]
    pub fn event_types<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Set the window start.
    #[must_use]
    pub fn begin(mut self, begin: impl Into<String>) -> Self {
        self.begin = Some(begin.into());
        self
    }

    /// Set the window end.
    #[must_use]
    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    /// Set the free-text query.
    #[must_use]
    pub fn query(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    /// Add an area.
    #[must_use]
    pub fn area(mut self, area: impl Into<String>) -> Self {
        self.areas.push(area.into());
        self
    }

    /// Add a category (prefix match).
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Add a category (exact match).
    #[must_use]
    pub fn exact_category(mut self, category: impl Into<String>) -> Self {
        self.exact_categories.push(category.into());
        self
    }

    /// Add a commodity.
    #[must_use]
    pub fn commodity(mut self, commodity: impl Into<String>) -> Self {
        self.commodities.push(commodity.into());
        self
    }

    /// Add a data source.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Add a data type.
    #[must_use]
    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_types.push(data_type.into());
        self
    }

    fn has_attributes(&self) -> bool {
        self.q.is_some()
            || !self.areas.is_empty()
            || !self.categories.is_empty()
            || !self.exact_categories.is_empty()
            || !self.commodities.is_empty()
            || !self.sources.is_empty()
            || !self.data_types.is_empty()
    }

    /// Validate every field and resolve the variant.
    ///
    /// # Errors
    ///
    /// Returns all violated constraints, not just the first.
    pub fn validate(&self) -> Result<FilterSpec, Vec<String>> {
        let mut violations = Vec::new();

        let mut event_types = Vec::with_capacity(self.event_types.len());
        for tag in &self.event_types {
            match EventKind::from_tag(tag) {
                Some(kind) if !event_types.contains(&kind) => event_types.push(kind),
                Some(_) => {}
                None => violations.push(format!("unknown event type {tag:?}")),
            }
        }
        if self.event_types.is_empty() {
            violations.push("at least one event type is required".to_string());
        }

        let begin = parse_bound("begin", self.begin.as_deref(), &mut violations);
        let end = parse_bound("end", self.end.as_deref(), &mut violations);
        if let (Some(b), Some(e)) = (begin, end)
            && b >= e
        {
            violations.push(format!("begin ({b}) must be before end ({e})"));
        }

        let selector = if self.names.is_empty() {
            FilterSelector::Attribute(AttributeFilter {
                q: self.q.clone().filter(|q| !q.trim().is_empty()),
                areas: self.areas.clone(),
                categories: self.categories.clone(),
                exact_categories: self.exact_categories.clone(),
                commodities: self.commodities.clone(),
                sources: self.sources.clone(),
                data_types: self.data_types.clone(),
            })
        } else {
            if self.names.iter().any(|n| n.trim().is_empty()) {
                violations.push("subject names must not be blank".to_string());
            }
            if self.has_attributes() {
                tracing::warn!(
                    names = self.names.len(),
                    "Filter has explicit names; attribute fields are ignored"
                );
            }
            FilterSelector::Name(NameFilter {
                names: self.names.clone(),
            })
        };

        if !violations.is_empty() {
            return Err(violations);
        }

        Ok(FilterSpec {
            window: FilterWindow {
                event_types,
                begin,
                end,
            },
            selector,
        })
    }
}

fn parse_bound(
    field: &str,
    raw: Option<&str>,
    violations: &mut Vec<String>,
) -> Option<DateTime<FixedOffset>> {
    let raw = raw?;
    let parsed = parse_datetime(raw);
    if parsed.is_none() {
        violations.push(format!("{field} {raw:?} is not a date or date-time"));
    }
    parsed
}

// =============================================================================
// Validation Error
// =============================================================================

/// A single violated constraint, tagged with the filter's position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterViolation {
    /// Index of the offending filter in the submitted list.
    pub index: usize,
    /// Description of the constraint.
    pub message: String,
}

impl fmt::Display for FilterViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter #{}: {}", self.index, self.message)
    }
}

/// Every violation found across a filter list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid filters: {}", .violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct FilterValidationError {
    /// All violations, in filter order.
    pub violations: Vec<FilterViolation>,
}

/// Validate a filter list, collecting violations from every filter.
///
/// # Errors
///
/// Returns a [`FilterValidationError`] listing every violated constraint.
pub fn validate_filters(filters: &[Filter]) -> Result<Vec<FilterSpec>, FilterValidationError> {
    let mut specs = Vec::with_capacity(filters.len());
    let mut violations = Vec::new();

    for (index, filter) in filters.iter().enumerate() {
        match filter.validate() {
            Ok(spec) => specs.push(spec),
            Err(messages) => violations.extend(
                messages
                    .into_iter()
                    .map(|message| FilterViolation { index, message }),
            ),
        }
    }

    if violations.is_empty() {
        Ok(specs)
    } else {
        Err(FilterValidationError { violations })
    }
}

// =============================================================================
// Tests
// =============================================================================
