use crate::result::PageCalls;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Drop the lexicographically first matching URL from the result.
    ///
    /// Discovery has always behaved this way and stored collections depend on
    /// it, so it stays on until someone decides otherwise.
    pub drop_first_sorted: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            drop_first_sorted: true,
        }
    }
}

/// Merge every page's observed responses into the endpoint list for `domain`.
pub fn resolve(calls: &BTreeMap<String, PageCalls>, domain: &str) -> Vec<String> {
    resolve_with(calls, domain, &ResolveOptions::default())
}

pub fn resolve_with(
    calls: &BTreeMap<String, PageCalls>,
    domain: &str,
    options: &ResolveOptions,
) -> Vec<String> {
    let endpoints: BTreeSet<&String> = calls
        .values()
        .flat_map(|page| page.responses.iter())
        .filter(|url| url.starts_with(domain))
        .collect();

    let skip = usize::from(options.drop_first_sorted);
    endpoints.into_iter().skip(skip).cloned().collect()
}
