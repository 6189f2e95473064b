//! Bounded narrator context.
//!
//! The narrator sees the last K events in full. Older events drop out of
//! the window but stay in the store's ledger. They are folded into a
//! [`StorySummary`] in batches, and [`HistorySearch`] can recall the ones
//! relevant to what is happening now.

use crate::world::{Event, StorySummary};
use std::collections::vec_deque;
use std::collections::VecDeque;

/// Words too common to say anything about relevance.
const STOP_WORDS: &[&str] = &[
    "an", "as", "at", "be", "by", "in", "is", "it", "me", "my", "of", "on", "or", "to", "up",
    "we", "the", "and", "for", "with", "you", "your", "that", "this", "from", "into", "are", "was",
    "has", "have", "her", "his", "its", "not", "but", "all", "she", "him", "them", "they", "our",
    "out", "about", "then", "than", "there", "what", "when", "who",
];

/// Weight of a term matching one of an event's entity references.
const REF_WEIGHT: usize = 3;

/// Fixed-capacity buffer of the most recent events.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    capacity: usize,
    recent: VecDeque<Event>,
    evicted: usize,
}

impl ContextWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            recent: VecDeque::with_capacity(capacity),
            evicted: 0,
        }
    }

    /// Rebuild the window from the tail of an existing ledger.
    pub fn from_ledger(capacity: usize, ledger: &[Event]) -> Self {
        let mut window = Self::new(capacity);
        let start = ledger.len().saturating_sub(window.capacity);
        window.evicted = start;
        window.recent.extend(ledger[start..].iter().cloned());
        window
    }

    /// Add an event, returning the one evicted to make room, if any.
    pub fn push(&mut self, event: Event) -> Option<Event> {
        let evicted = if self.recent.len() == self.capacity {
            self.evicted += 1;
            self.recent.pop_front()
        } else {
            None
        };
        self.recent.push_back(event);
        evicted
    }

    /// The buffered events, oldest first.
    pub fn recent_context(&self) -> vec_deque::Iter<'_, Event> {
        self.recent.iter()
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many events have dropped out of the window.
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    pub fn contains(&self, sequence: u64) -> bool {
        self.recent.iter().any(|e| e.sequence == sequence)
    }

    /// Events that have left the window but are not yet in `summary`,
    /// oldest first.
    pub fn unsummarized<'a>(&self, ledger: &'a [Event], summary: &StorySummary) -> Vec<&'a Event> {
        let oldest = self.recent.front().map_or(u64::MAX, |e| e.sequence);
        ledger
            .iter()
            .filter(|e| e.sequence > summary.through && e.sequence < oldest)
            .collect()
    }

    /// Search only the part of the ledger that is no longer in the window.
    pub fn search_evicted<'a>(
        &self,
        ledger: &'a [Event],
        query: &str,
        limit: usize,
    ) -> HistorySearch<'a> {
        let search = HistorySearch::new(ledger, query, limit);
        match self.recent.front() {
            Some(oldest) => search.before(oldest.sequence),
            None => search,
        }
    }
}

/// Append event lines to a summary without asking anyone to condense them.
pub fn fold_summary(previous: &StorySummary, events: &[&Event]) -> StorySummary {
    let mut text = previous.text.trim_end().to_string();
    for event in events {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&format!("- #{} {}", event.sequence, event.summary));
    }
    StorySummary {
        text,
        through: events.last().map_or(previous.through, |e| e.sequence),
    }
}

/// Lowercase alphanumeric terms, without stop words or single letters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// A ranked keyword query over the ledger.
///
/// Building one does no work; ranking happens when [`iter`](Self::iter) is
/// called, and every call starts again from the best match. At most
/// `limit` events are yielded.
#[derive(Debug, Clone)]
pub struct HistorySearch<'a> {
    ledger: &'a [Event],
    terms: Vec<String>,
    limit: usize,
    before: Option<u64>,
}

impl<'a> HistorySearch<'a> {
    pub fn new(ledger: &'a [Event], query: &str, limit: usize) -> Self {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        Self {
            ledger,
            terms,
            limit,
            before: None,
        }
    }

    /// Only consider events with a sequence number below `sequence`.
    pub fn before(mut self, sequence: u64) -> Self {
        self.before = Some(sequence);
        self
    }

    /// Relevance of one event to this query.
    pub fn score(&self, event: &Event) -> usize {
        if self.terms.is_empty() {
            return 0;
        }
        let mut words = tokenize(&event.summary);
        words.extend(tokenize(&event.actor));

        let ref_parts: Vec<Vec<&str>> = event
            .refs
            .iter()
            .map(|r| r.key().split('_').collect())
            .collect();

        self.terms
            .iter()
            .map(|term| {
                let text_hits = words.iter().filter(|w| *w == term).count();
                let ref_hits = ref_parts
                    .iter()
                    .filter(|parts| parts.iter().any(|p| p == term))
                    .count();
                text_hits + REF_WEIGHT * ref_hits
            })
            .sum()
    }

    /// Rank the ledger and iterate over the best matches.
    pub fn iter(&self) -> impl Iterator<Item = &'a Event> + 'a {
        let mut ranked: Vec<(usize, usize)> = self
            .ledger
            .iter()
            .enumerate()
            .filter(|(_, e)| self.before.map_or(true, |limit| e.sequence < limit))
            .filter_map(|(index, e)| {
                let score = self.score(e);
                (score > 0).then_some((score, index))
            })
            .collect();

        // Highest score first; ties go to the most recent event.
        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| self.ledger[b.1].sequence.cmp(&self.ledger[a.1].sequence))
        });
        ranked.truncate(self.limit);

        let ledger = self.ledger;
        let order: Vec<usize> = ranked.into_iter().map(|(_, index)| index).collect();
        order.into_iter().map(move |index| &ledger[index])
    }
}

impl<'s, 'a> IntoIterator for &'s HistorySearch<'a> {
    type Item = &'a Event;
    type IntoIter = std::vec::IntoIter<&'a Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{CharacterId, EntityRef, ItemId};
    use chrono::Utc;

    fn event(sequence: u64, summary: &str, refs: Vec<EntityRef>) -> Event {
        Event {
            sequence,
            timestamp: Utc::now(),
            actor: "player".to_string(),
            summary: summary.to_string(),
            refs,
        }
    }

    fn ledger(n: u64) -> Vec<Event> {
        (1..=n).map(|i| event(i, &format!("Step {i}"), vec![])).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Gave the Silver-Key to Mira, then left."),
            vec!["gave", "silver", "key", "mira", "left"]
        );
        assert!(tokenize("a I").is_empty());
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = ContextWindow::new(3);
        for e in ledger(5) {
            window.push(e);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.evicted(), 2);
        let seqs: Vec<u64> = window.recent_context().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
        assert!(!window.contains(2));
    }

    #[test]
    fn test_push_returns_evicted() {
        let mut window = ContextWindow::new(1);
        assert!(window.push(event(1, "one", vec![])).is_none());
        let evicted = window.push(event(2, "two", vec![])).unwrap();
        assert_eq!(evicted.sequence, 1);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let window = ContextWindow::new(0);
        assert_eq!(window.capacity(), 1);
    }

    #[test]
    fn test_from_ledger_keeps_tail() {
        let events = ledger(10);
        let window = ContextWindow::from_ledger(4, &events);
        let seqs: Vec<u64> = window.recent_context().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![7, 8, 9, 10]);
        assert_eq!(window.evicted(), 6);

        let small = ContextWindow::from_ledger(4, &events[..2]);
        assert_eq!(small.len(), 2);
        assert_eq!(small.evicted(), 0);
    }

    #[test]
    fn test_search_ranks_by_score_then_recency() {
        let events = vec![
            event(1, "Met Mira at the inn", vec![EntityRef::Character(CharacterId::new("mira"))]),
            event(2, "Bought bread", vec![]),
            event(3, "Asked about Mira's brother", vec![]),
            event(4, "Mira mentioned mira again", vec![]),
        ];
        let search = HistorySearch::new(&events, "Where is Mira?", 10);
        let seqs: Vec<u64> = search.iter().map(|e| e.sequence).collect();
        // 1 scores 1 + 3, 4 scores 2, 3 scores 1; 2 does not match
        assert_eq!(seqs, vec![1, 4, 3]);
    }

    #[test]
    fn test_search_matches_ref_parts() {
        let events = vec![
            event(1, "Drank something", vec![EntityRef::Item(ItemId::new("healing_potion"))]),
            event(2, "Walked", vec![]),
        ];
        let found: Vec<u64> = HistorySearch::new(&events, "potion", 5)
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn test_search_is_bounded_and_restartable() {
        let events: Vec<Event> = (1..=20).map(|i| event(i, "The wolf howls", vec![])).collect();
        let search = HistorySearch::new(&events, "wolf", 5);

        let first: Vec<u64> = search.iter().map(|e| e.sequence).collect();
        assert_eq!(first, vec![20, 19, 18, 17, 16]);

        let partial: Vec<u64> = search.iter().take(2).map(|e| e.sequence).collect();
        assert_eq!(partial, vec![20, 19]);

        let again: Vec<u64> = (&search).into_iter().map(|e| e.sequence).collect();
        assert_eq!(again, first);
    }

    #[test]
    fn test_search_without_terms_is_empty() {
        let events = ledger(3);
        assert_eq!(HistorySearch::new(&events, "the a", 5).iter().count(), 0);
        assert_eq!(HistorySearch::new(&events, "step", 0).iter().count(), 0);
    }

    #[test]
    fn test_evicted_event_still_found() {
        let mut events = vec![event(1, "Hid the silver key under the mill", vec![])];
        events.extend((2..=10).map(|i| event(i, "Walked on", vec![])));

        let mut window = ContextWindow::new(3);
        for e in &events {
            window.push(e.clone());
        }
        assert!(!window.contains(1));

        let found: Vec<u64> = window
            .search_evicted(&events, "silver key", 3)
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn test_unsummarized_is_between_summary_and_window() {
        let events = ledger(8);
        let window = ContextWindow::from_ledger(3, &events);
        let summary = StorySummary {
            text: "Early steps.".into(),
            through: 2,
        };
        let pending: Vec<u64> = window
            .unsummarized(&events, &summary)
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(pending, vec![3, 4, 5]);

        let fresh = ContextWindow::from_ledger(3, &events[..3]);
        assert!(fresh.unsummarized(&events[..3], &StorySummary::default()).is_empty());
    }

    #[test]
    fn test_fold_summary_appends_lines() {
        let events = ledger(3);
        let refs: Vec<&Event> = events.iter().collect();
        let first = fold_summary(&StorySummary::default(), &refs[..2]);
        assert_eq!(first.text, "- #1 Step 1\n- #2 Step 2");
        assert_eq!(first.through, 2);

        let second = fold_summary(&first, &refs[2..]);
        assert_eq!(second.text, "- #1 Step 1\n- #2 Step 2\n- #3 Step 3");
        assert_eq!(second.through, 3);

        assert_eq!(fold_summary(&second, &[]), second);
    }

    #[test]
    fn test_search_evicted_skips_window() {
        let events: Vec<Event> = (1..=6).map(|i| event(i, "Wolf tracks", vec![])).collect();
        let window = ContextWindow::from_ledger(2, &events);
        let found: Vec<u64> = window
            .search_evicted(&events, "wolf", 10)
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(found, vec![4, 3, 2, 1]);
    }
}
