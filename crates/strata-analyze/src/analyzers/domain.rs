//! Domain analyzer: extract and tag domains from URL-bearing events.

use regex::Regex;
use std::collections::BTreeMap;
use strata_core::error::{Result, StrataError};
use strata_search::{SearchQuery, SortOrder};

use crate::context::AnalyzerContext;
use crate::registry::{Analyzer, Findings};

/// Tags every event carrying a URL with `domain/<host>` and saves a search
/// for URL-bearing events, plus a top-domains summary on the run.
pub struct DomainAnalyzer {
    url: Regex,
}

impl DomainAnalyzer {
    /// # Errors
    ///
    /// Never fails in practice; kept fallible so construction matches the
    /// other builtins.
    pub fn new() -> Result<Self> {
        let url = Regex::new(r"https?://([A-Za-z0-9][A-Za-z0-9.-]*)")
            .map_err(|err| StrataError::Validation(format!("url regex: {err}")))?;
        Ok(Self { url })
    }

    fn domains_in(&self, text: &str) -> Vec<String> {
        self.url
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
            .collect()
    }
}

impl Analyzer for DomainAnalyzer {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn description(&self) -> &'static str {
        "Extract domains from URLs in events, tag them, and save a URL search"
    }

    fn run(&self, ctx: &AnalyzerContext) -> Result<Findings> {
        let query = SearchQuery::text("http*");
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut tagged = 0_u64;

        ctx.for_each_event(&query, SortOrder::Time, |event| {
            let mut domains = self.domains_in(&event.message);
            if let Some(url) = event.field("url").as_ref().and_then(|v| v.as_str()) {
                domains.extend(self.domains_in(url));
            }
            domains.sort_unstable();
            domains.dedup();

            if domains.is_empty() {
                return Ok(());
            }

            let event_ref = event.event_ref();
            for domain in domains {
                ctx.add_tag(&event_ref, &format!("domain/{domain}"))?;
                *counts.entry(domain).or_default() += 1;
            }
            tagged += 1;
            Ok(())
        })?;

        if tagged > 0 {
            ctx.save_search("events with URLs", &query)?;
        }

        let mut top: Vec<(&String, &u64)> = counts.iter().collect();
        top.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let summary = if top.is_empty() {
            "no domains found".to_string()
        } else {
            top.iter()
                .take(10)
                .map(|(domain, count)| format!("{domain}: {count}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(Findings {
            count: tagged,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_lowercased_hosts() {
        let analyzer = DomainAnalyzer::new().expect("build");
        let domains =
            analyzer.domains_in("GET https://Evil.Example.COM/payload and http://10.0.0.5/x");
        assert_eq!(domains, vec!["evil.example.com".to_string(), "10.0.0.5".to_string()]);
    }

    #[test]
    fn no_urls_means_no_domains() {
        let analyzer = DomainAnalyzer::new().expect("build");
        assert!(analyzer.domains_in("plain text event").is_empty());
    }
}
