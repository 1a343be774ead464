//! FILENAME: persistence/src/ids.rs
//! PURPOSE: Stable internal id assignment for document elements.
//! CONTEXT: Every identifier in the document derives from a slug of its
//! display name, with a numeric suffix appended on collision. Assignment
//! happens in first-seen order, so the same model always produces the
//! same ids and the packager can recompute data-file names independently
//! of the serializer.

use std::collections::HashSet;

/// Lowercases a display name and collapses everything that is not
/// alphanumeric into single underscores.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true; // trims leading separators
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("item");
    }
    slug
}

/// Hands out unique slugs in first-seen order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    used: HashSet<String>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slug of `name`, suffixed with `_2`, `_3`, ... when an
    /// earlier name already claimed it.
    pub fn allocate(&mut self, name: &str) -> String {
        let base = slugify(name);
        let mut candidate = base.clone();
        let mut counter = 2;
        while self.used.contains(&candidate) {
            candidate = format!("{}_{}", base, counter);
            counter += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Assigns ids to an ordered name list in one pass. Serializer and
/// packager both call this over the datasource list so their ids agree.
pub fn assign_ids<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut allocator = IdAllocator::new();
    names.map(|n| allocator.allocate(n)).collect()
}
