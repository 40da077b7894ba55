//! Cached-script lookup.
//!
//! A pure read over [`CacheMetadata`]: no model calls, no mutation.
//! Patterns stored under the instruction are probed in insertion order
//! against a small window of the incoming data; the first pattern that
//! matches every probe line wins.

use crate::cache::{CacheMetadata, CacheStore};
use regex::Regex;
use std::path::PathBuf;

/// How many leading lines a stored pattern must match to count as a hit.
pub const PROBE_WINDOW: usize = 10;

/// Find a previously synthesized script for this instruction and data
/// shape. Returns the script path, or `None` when the instruction has
/// never been seen, no stored pattern matches, or the script file has
/// gone missing. A stored pattern that no longer compiles is skipped,
/// never fatal.
pub fn find_cached_script(
    store: &CacheStore,
    metadata: &CacheMetadata,
    instructions: &str,
    lines: &[String],
) -> Option<PathBuf> {
    let patterns = metadata.patterns_by_instruction.get(instructions)?;

    let probe: Vec<&String> = lines.iter().take(PROBE_WINDOW).collect();

    for (pattern, id) in patterns {
        let regex = match Regex::new(pattern) {
            Ok(re) => re,
            Err(_) => continue,
        };

        if probe.iter().all(|line| regex.is_match(line)) {
            let path = store.script_path(id);
            if path.exists() {
                return Some(path);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn store_with_script(body: &str) -> (tempfile::TempDir, CacheStore, String) {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("plotgen"));
        let id = crate::cache::script_id(body);
        let path = store.script_path(&id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        (dir, store, id)
    }

    #[test]
    fn unknown_instruction_is_a_miss() {
        let (_dir, store, id) = store_with_script("print(1)\n");
        let mut metadata = CacheMetadata::default();
        metadata
            .patterns_by_instruction
            .entry("plot x over time".to_string())
            .or_default()
            .insert(r"^\d+,\d+$".to_string(), id);

        let hit = find_cached_script(&store, &metadata, "something else", &lines(&["1,2"]));
        assert!(hit.is_none());
    }

    #[test]
    fn matching_probe_window_returns_stored_script() {
        let (_dir, store, id) = store_with_script("print(1)\n");
        let mut metadata = CacheMetadata::default();
        metadata
            .patterns_by_instruction
            .entry("plot x over time".to_string())
            .or_default()
            .insert(r"^\d+,\d+$".to_string(), id.clone());

        // 12 matching lines; only the first 10 are probed.
        let data: Vec<String> = (0..12).map(|i| format!("{},{}", i, i * 2)).collect();
        let hit = find_cached_script(&store, &metadata, "plot x over time", &data);
        assert_eq!(hit, Some(store.script_path(&id)));
    }

    #[test]
    fn mismatch_inside_probe_window_is_a_miss() {
        let (_dir, store, id) = store_with_script("print(1)\n");
        let mut metadata = CacheMetadata::default();
        metadata
            .patterns_by_instruction
            .entry("plot x".to_string())
            .or_default()
            .insert(r"^\d+,\d+$".to_string(), id);

        let hit = find_cached_script(
            &store,
            &metadata,
            "plot x",
            &lines(&["1,2", "not numbers", "3,4"]),
        );
        assert!(hit.is_none());
    }

    #[test]
    fn mismatch_beyond_probe_window_still_hits() {
        let (_dir, store, id) = store_with_script("print(1)\n");
        let mut metadata = CacheMetadata::default();
        metadata
            .patterns_by_instruction
            .entry("plot x".to_string())
            .or_default()
            .insert(r"^\d+,\d+$".to_string(), id.clone());

        let mut data: Vec<String> = (0..10).map(|i| format!("{},{}", i, i)).collect();
        data.push("garbage beyond the window".to_string());
        let hit = find_cached_script(&store, &metadata, "plot x", &data);
        assert_eq!(hit, Some(store.script_path(&id)));
    }

    #[test]
    fn malformed_stored_pattern_is_skipped_not_fatal() {
        let (_dir, store, id) = store_with_script("print(1)\n");
        let mut metadata = CacheMetadata::default();
        let patterns = metadata
            .patterns_by_instruction
            .entry("plot x".to_string())
            .or_default();
        patterns.insert(r"^(unclosed$".to_string(), "bogus".to_string());
        patterns.insert(r"^\d+,\d+$".to_string(), id.clone());

        let hit = find_cached_script(&store, &metadata, "plot x", &lines(&["1,2", "3,4"]));
        assert_eq!(hit, Some(store.script_path(&id)));
    }

    #[test]
    fn first_matching_pattern_wins_in_insertion_order() {
        let (_dir, store, id_a) = store_with_script("print('a')\n");
        let body_b = "print('b')\n";
        let id_b = crate::cache::script_id(body_b);
        fs::write(store.script_path(&id_b), body_b).unwrap();

        let mut metadata = CacheMetadata::default();
        let patterns = metadata
            .patterns_by_instruction
            .entry("plot x".to_string())
            .or_default();
        patterns.insert(r"^\d+,\d+$".to_string(), id_a.clone());
        patterns.insert(r"^.*$".to_string(), id_b);

        let hit = find_cached_script(&store, &metadata, "plot x", &lines(&["1,2"]));
        assert_eq!(hit, Some(store.script_path(&id_a)));
    }

    #[test]
    fn missing_script_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("plotgen"));
        let mut metadata = CacheMetadata::default();
        metadata
            .patterns_by_instruction
            .entry("plot x".to_string())
            .or_default()
            .insert(r"^\d+$".to_string(), "deadbeef".to_string());

        let hit = find_cached_script(&store, &metadata, "plot x", &lines(&["1"]));
        assert!(hit.is_none());
    }
}
