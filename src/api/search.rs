//! Paginated JQL search aggregation.
//!
//! A search is fetched page by page. The next offset is always the number of
//! issues gathered so far, and the loop runs until that count reaches the
//! total the server last declared. A page with no issues ends the loop early.
//! Whatever happens, the final count must match the last declared total.

use std::future::Future;

use serde_json::Value;
use tracing::{debug, warn};

use super::error::{ApiError, Result};

/// Page size requested from `/search`.
pub const MAX_RESULTS_PER_REQUEST: usize = 100;

/// Ordering clause appended when the default order is requested.
pub const DEFAULT_ORDER_CLAUSE: &str = "ORDER BY updated DESC";

/// One validated page of a search response.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    /// The issues of this page, in server order. Each one is a JSON object.
    pub issues: Vec<Value>,
    /// Total number of matching issues declared by the server.
    pub total: u64,
}

impl SearchPage {
    /// Validate a raw `/search` response.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Protocol` if the body is not an object, `issues` is
    /// not an array of objects, or `total` is not a non-negative integer.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut page = match value {
            Value::Object(page) => page,
            other => {
                return Err(ApiError::Protocol(format!(
                    "search response should be an object, received {}",
                    kind(Some(&other))
                )))
            }
        };

        let issues = match page.remove("issues") {
            Some(Value::Array(issues)) => issues,
            other => {
                return Err(ApiError::Protocol(format!(
                    "'issues' should be an array, received {}",
                    kind(other.as_ref())
                )))
            }
        };

        if let Some(index) = issues.iter().position(|issue| !issue.is_object()) {
            return Err(ApiError::Protocol(format!(
                "issue at index {} should be an object, received {}",
                index,
                kind(issues.get(index))
            )));
        }

        let total = match page.get("total") {
            Some(Value::Number(n)) => n.as_u64(),
            _ => None,
        }
        .ok_or_else(|| {
            ApiError::Protocol(format!(
                "'total' should be a non-negative integer, received {}",
                page.get("total")
                    .map_or_else(|| "nothing".to_string(), Value::to_string)
            ))
        })?;

        Ok(Self { issues, total })
    }
}

/// What the aggregation should do after absorbing a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More issues are expected; fetch the next page.
    Continue,
    /// Nothing left to fetch.
    Done,
}

/// Accumulated state of a paginated search.
#[derive(Debug, Default)]
pub struct Aggregation {
    issues: Vec<Value>,
    /// `None` until the first page arrives.
    total: Option<u64>,
}

impl Aggregation {
    /// Start an empty aggregation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset for the next page request.
    pub fn next_offset(&self) -> usize {
        self.issues.len()
    }

    /// The last total declared by the server.
    pub fn declared_total(&self) -> Option<u64> {
        self.total
    }

    /// Whether the accumulated count has reached the declared total.
    pub fn is_complete(&self) -> bool {
        self.total
            .map_or(false, |total| self.issues.len() as u64 >= total)
    }

    /// Append a page and decide whether to continue.
    pub fn absorb(&mut self, page: SearchPage) -> Progress {
        self.total = Some(page.total);

        if page.issues.is_empty() {
            if page.total > 0 {
                warn!(
                    start_at = self.issues.len(),
                    total = page.total,
                    "The last execution didn't return any result"
                );
            }
            return Progress::Done;
        }

        self.issues.extend(page.issues);
        debug!(
            retrieved = self.issues.len(),
            total = page.total,
            "Accumulated search page"
        );

        if self.is_complete() {
            Progress::Done
        } else {
            Progress::Continue
        }
    }

    /// Check the final count and return the issues.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::CountMismatch` unless the number of issues equals the
    /// last declared total.
    pub fn finish(self) -> Result<Vec<Value>> {
        let total = self.total.unwrap_or(0);
        if self.issues.len() as u64 != total {
            return Err(ApiError::CountMismatch {
                retrieved: self.issues.len(),
                total,
            });
        }
        Ok(self.issues)
    }
}

/// Run a paginated search to completion.
///
/// `fetch_page` is called with the offset of each page and must return the
/// raw `/search` response for it. Pages are requested one at a time.
///
/// # Errors
///
/// Propagates any fetch error, `ApiError::Protocol` for a malformed page and
/// `ApiError::CountMismatch` if the final count differs from the declared total.
pub async fn collect_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<Value>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let mut aggregation = Aggregation::new();

    loop {
        let raw = fetch_page(aggregation.next_offset()).await?;
        let page = SearchPage::from_value(raw)?;
        if aggregation.absorb(page) == Progress::Done {
            break;
        }
    }

    aggregation.finish()
}

/// Append the default ordering clause to a query when requested.
pub fn apply_default_order(query: &str, default_order: bool) -> String {
    if default_order {
        format!("{} {}", query, DEFAULT_ORDER_CLAUSE)
    } else {
        query.to_string()
    }
}

/// Short description of a JSON value's type for error messages.
fn kind(value: Option<&Value>) -> &'static str {
    match value {
        None => "nothing",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "a boolean",
        Some(Value::Number(_)) => "a number",
        Some(Value::String(_)) => "a string",
        Some(Value::Array(_)) => "an array",
        Some(Value::Object(_)) => "an object",
    }
}
