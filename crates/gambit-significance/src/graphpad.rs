use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;

use crate::{ContingencyTable, Result, SignificanceError, SignificanceService};

/// The public contingency-table calculator.
pub const DEFAULT_ENDPOINT: &str = "http://graphpad.com/quickcalcs/contingency2/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[allow(clippy::expect_used)]
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

#[allow(clippy::expect_used)]
static P_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"The two-tailed P value equals (\d+\.\d+)").expect("valid regex")
});

/// Client for the remote 2x2 contingency calculator.
///
/// Posts the table as a form (chi-square with Yates correction, two tails)
/// and scrapes the p-value out of the returned HTML.
#[derive(Debug, Clone)]
pub struct GraphPadClient {
    endpoint: String,
    http: Client,
}

impl GraphPadClient {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn form(table: &ContingencyTable) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("Outcome1", "outcome1".to_string()),
            ("Outcome2", "outcome2".to_string()),
            ("Group1", "group1".to_string()),
            ("Group2", "group2".to_string()),
            ("Test", "ChiWith".to_string()),
            ("Tails", "2".to_string()),
        ];
        for (key, cell) in ["A", "B", "C", "D"].into_iter().zip(table.cells()) {
            form.push((key, cell.to_string()));
        }
        form
    }
}

impl SignificanceService for GraphPadClient {
    fn two_tailed_p(&self, table: &ContingencyTable) -> Result<f64> {
        if table.has_empty_cell() {
            return Err(SignificanceError::EmptyCell);
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!(endpoint = %self.endpoint, ?table, "requesting chi-square p-value");

        let body = self
            .http
            .post(&self.endpoint)
            .form(&Self::form(table))
            .send()?
            .error_for_status()?
            .text()?;

        parse_p_value(&body)
    }
}

/// Extracts `The two-tailed P value equals <decimal>` from a result page.
///
/// Whitespace runs (including line breaks inside the HTML) are collapsed
/// before matching.
pub fn parse_p_value(body: &str) -> Result<f64> {
    let collapsed = WHITESPACE.replace_all(body, " ");
    let raw = P_VALUE
        .captures(&collapsed)
        .and_then(|c| c.get(1))
        .ok_or(SignificanceError::MissingPValue)?
        .as_str();

    let p: f64 = raw
        .parse()
        .map_err(|_| SignificanceError::InvalidPValue(raw.to_string()))?;
    if !(0.0..=1.0).contains(&p) {
        return Err(SignificanceError::InvalidPValue(raw.to_string()));
    }
    Ok(p)
}
