//! Candidate list merging and selection policy.

use std::collections::HashSet;

use crate::engines::Candidate;

/// Merge candidates in order, keeping the first of each dedup key.
pub fn merge(candidates: impl IntoIterator<Item = Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.dedup_key()))
        .collect()
}

/// Index of the candidate with dedup key `known_key`.
pub fn exact_match(candidates: &[Candidate], known_key: Option<&str>) -> Option<usize> {
    let key = known_key?;
    candidates.iter().position(|c| c.dedup_key() == key)
}

/// Auto-pick: the exact match when there is one, else the first candidate.
pub fn best_index(candidates: &[Candidate], known_key: Option<&str>) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    Some(exact_match(candidates, known_key).unwrap_or(0))
}

/// Whether the caller should let the user choose.
pub fn need_to_show_list(candidates: &[Candidate], known_key: Option<&str>) -> bool {
    candidates.len() > 1 && exact_match(candidates, known_key).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(engine: &str, reference: &str, hash: Option<&str>) -> Candidate {
        Candidate {
            engine: engine.to_string(),
            name: format!("{}-{}", engine, reference),
            language: "pl".to_string(),
            size: None,
            reference: reference.to_string(),
            checksum: None,
            content_hash: hash.map(str::to_string),
        }
    }

    #[test]
    fn merge_drops_duplicate_content() {
        let merged = merge(vec![
            candidate("NapiProjekt", "a", Some("FEED")),
            candidate("OpenSubtitles", "1", None),
            candidate("Napisy24", "b", Some("feed")),
            candidate("OpenSubtitles", "1", None),
            candidate("OpenSubtitles", "2", None),
        ]);
        let names: Vec<&str> = merged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["NapiProjekt-a", "OpenSubtitles-1", "OpenSubtitles-2"]);
    }

    #[test]
    fn exact_match_wins_over_merge_order() {
        let list = vec![candidate("A", "1", None), candidate("B", "2", Some("cafe"))];
        assert_eq!(best_index(&list, None), Some(0));
        assert!(need_to_show_list(&list, None));

        assert_eq!(best_index(&list, Some("hash:cafe")), Some(1));
        assert!(!need_to_show_list(&list, Some("hash:cafe")));

        // A remembered key that is no longer offered does not count
        assert!(need_to_show_list(&list, Some("hash:gone")));
    }

    #[test]
    fn single_or_empty_list() {
        let one = vec![candidate("A", "1", None)];
        assert!(!need_to_show_list(&one, None));
        assert_eq!(best_index(&[], None), None);
    }
}
