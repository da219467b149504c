#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

/// Mints variable names that are unique for the lifetime of one builder.
#[derive(Debug, Default)]
pub struct NameTable {
    taken: HashSet<String>,
    counters: HashMap<String, usize>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `hint` itself on first use, then `hint1`, `hint2`, ... skipping any
    /// name already handed out. Dots are not allowed in names.
    pub fn unique_name(&mut self, hint: &str) -> String {
        let base = hint.replace('.', "_");
        if self.taken.insert(base.clone()) {
            return base;
        }
        let counter = self.counters.entry(base.clone()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{base}{counter}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }
}
