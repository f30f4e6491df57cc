use chrono::NaiveDate;
use log::*;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://team-multiplier.xx.network/multiplier-logs/";

const SECTION_MARKER: &str = "Adjusting multiplier values";

static PROCESSING_NODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"---- Processing node\s+(.*)\s+----").unwrap());
static NODE_RECEIVES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Node receives\s+(.*?)(?:,|$)").unwrap());

#[derive(Debug, Error, PartialEq)]
pub enum MultiplierLogError {
    #[error("line containing `Node receives` not found for {node}")]
    MissingReceives { node: String },
    #[error("team multiplier `{value}` of {node} is not a number")]
    InvalidValue { node: String, value: String },
}

/// Reads the daily team multiplier logs published under `base_url`.
pub struct TeamMultiplierApi {
    base_url: String,
    client: Client,
}

impl TeamMultiplierApi {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.to_string(),
            client: Client::builder().build()?,
        })
    }

    #[cfg(test)]
    fn without_proxy(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            client: Client::builder().no_proxy().build().unwrap(),
        }
    }

    /// Log urls to try in order: today's, then yesterday's.
    pub fn candidate_urls(&self, today: NaiveDate) -> Vec<String> {
        std::iter::once(today)
            .chain(today.pred_opt())
            .map(|date| format!("{}{}.log", self.base_url, date.format("%Y-%m-%d")))
            .collect()
    }

    pub fn latest_url(&self, today: NaiveDate) -> Option<String> {
        for (index, url) in self.candidate_urls(today).into_iter().enumerate() {
            match self.client.head(&url).send() {
                Ok(response) if response.status().is_success() => {
                    if index > 0 {
                        info!("Could not access today's team multiplier log, using {}", url);
                    }
                    return Some(url);
                }
                Ok(response) => debug!("{} answered {}", url, response.status()),
                Err(err) => debug!("{} unreachable: {}", url, err),
            }
        }
        None
    }

    pub fn read_latest_log(&self, today: NaiveDate) -> anyhow::Result<Option<String>> {
        let url = match self.latest_url(today) {
            Some(url) => url,
            None => return Ok(None),
        };
        info!("Reading team multipliers from {}", url);
        let text = self.client.get(&url).send()?.error_for_status()?.text()?;
        Ok(Some(text))
    }

    /// Team multiplier per validator identity; empty when no log can be read.
    pub fn current_values(&self, today: NaiveDate) -> HashMap<String, f64> {
        match self.read_latest_log(today) {
            Ok(Some(text)) => parse_multiplier_log(&text),
            Ok(None) => {
                warn!("Could not read a log containing team multipliers");
                HashMap::new()
            }
            Err(err) => {
                warn!("Could not read a log containing team multipliers: {}", err);
                HashMap::new()
            }
        }
    }
}

/// Extracts `node -> value` pairs from the multiplier adjustment section of a log.
/// Entries whose value line is missing or malformed are skipped with a warning.
pub fn parse_multiplier_log(text: &str) -> HashMap<String, f64> {
    let lines: Vec<&str> = text.lines().collect();
    let mut values = HashMap::new();

    let start = match lines.iter().position(|line| line.contains(SECTION_MARKER)) {
        Some(index) => index + 1,
        None => {
            warn!("Could not locate start of the multiplier section in team multiplier log");
            return values;
        }
    };

    // a node line needs the line after it, so the last line never starts an entry
    let mut index = start;
    while index + 1 < lines.len() {
        let node = match PROCESSING_NODE.captures(lines[index]) {
            Some(captures) => captures[1].trim().to_string(),
            None => {
                index += 1;
                continue;
            }
        };
        match parse_received_value(&node, lines[index + 1]) {
            Ok(value) => {
                trace!("Team multiplier {}: {}", node, value);
                values.insert(node, value);
                index += 2;
            }
            Err(err) => {
                warn!("Skipping team multiplier entry: {}", err);
                index += 1;
            }
        }
    }

    info!("{} team multipliers read", values.len());
    values
}

fn parse_received_value(node: &str, line: &str) -> Result<f64, MultiplierLogError> {
    let captures = NODE_RECEIVES
        .captures(line)
        .ok_or_else(|| MultiplierLogError::MissingReceives {
            node: node.to_string(),
        })?;
    let value = captures[1].trim();
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed),
        _ => Err(MultiplierLogError::InvalidValue {
            node: node.to_string(),
            value: value.to_string(),
        }),
    }
}
