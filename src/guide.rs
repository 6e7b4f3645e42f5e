//! Channel guide: category scoping, fuzzy search and grouping

use crate::models::Channel;

/// Category entry that disables category scoping
pub const ALL_CATEGORIES: &str = "All";

/// Minimum Jaro-Winkler similarity for a typo-tolerant match
const FUZZY_THRESHOLD: f64 = 0.85;

/// Events the guide emits to the shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuideEvent {
    Select(String),
    ToggleFavorite(String),
}

/// "All" followed by distinct categories in first-seen order
pub fn categories(channels: &[Channel]) -> Vec<String> {
    let mut out = vec![ALL_CATEGORIES.to_string()];
    for channel in channels {
        if !channel.category.is_empty() && !out.iter().any(|c| c == &channel.category) {
            out.push(channel.category.clone());
        }
    }
    out
}

/// Case-insensitive substring check without allocation
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() { return true; }
    if needle.len() > haystack.len() { return false; }

    haystack.as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Relevance of a channel for `query`, or None if it doesn't match
fn score(channel: &Channel, query: &str) -> Option<f64> {
    if contains_ignore_case(&channel.name, query) {
        let prefix = channel.name.len() >= query.len()
            && channel.name.as_bytes()[..query.len()].eq_ignore_ascii_case(query.as_bytes());
        return Some(if prefix { 3.5 } else { 3.0 });
    }
    if contains_ignore_case(&channel.category, query)
        || contains_ignore_case(&channel.current_program, query)
    {
        return Some(2.0);
    }
    if contains_ignore_case(&channel.description, query) {
        return Some(1.5);
    }

    let query = query.to_lowercase();
    let name = channel.name.to_lowercase();
    let best = name
        .split_whitespace()
        .chain(std::iter::once(name.as_str()))
        .map(|word| strsim::jaro_winkler(&query, word))
        .fold(0.0_f64, f64::max);

    (best >= FUZZY_THRESHOLD).then_some(best)
}

/// Scope to `category`, then rank by `query`; a blank query keeps collection order
pub fn filter<'a>(channels: &'a [Channel], category: &str, query: &str) -> Vec<&'a Channel> {
    let scoped = channels
        .iter()
        .filter(|c| category == ALL_CATEGORIES || c.category == category);

    let query = query.trim();
    if query.is_empty() {
        return scoped.collect();
    }

    let mut ranked: Vec<(f64, &Channel)> = scoped
        .filter_map(|c| score(c, query).map(|s| (s, c)))
        .collect();
    // stable sort keeps collection order for ties
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().map(|(_, c)| c).collect()
}

/// Guide sections: favorites first, then the rest grouped by category
#[derive(Debug, Default)]
pub struct Grouped<'a> {
    pub favorites: Vec<&'a Channel>,
    pub by_category: Vec<(String, Vec<&'a Channel>)>,
}

pub fn group<'a>(channels: &[&'a Channel]) -> Grouped<'a> {
    let mut grouped = Grouped::default();
    for &channel in channels {
        if channel.favorite() {
            grouped.favorites.push(channel);
            continue;
        }
        match grouped.by_category.iter_mut().find(|(cat, _)| cat == &channel.category) {
            Some((_, list)) => list.push(channel),
            None => grouped.by_category.push((channel.category.clone(), vec![channel])),
        }
    }
    grouped
}
