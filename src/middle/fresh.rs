use hashbrown::HashMap;

/// Monotonic counters, one per prefix. Each compilation owns its own supply
/// so independent compilations never share state.
#[derive(Debug, Default, Clone)]
pub struct NameSupply {
    counters: HashMap<String, usize>,
}

impl NameSupply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next index for `prefix`, starting at 0
    pub fn next_index(&mut self, prefix: &str) -> usize {
        let counter = self.counters.entry_ref(prefix).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    /// A compiler-generated name such as `$e0`. User identifiers cannot start
    /// with `$`, so these never collide with source names.
    pub fn generated(&mut self, prefix: &str) -> String {
        let index = self.next_index(prefix);
        format!("${prefix}{index}")
    }

    /// A code label such as `lam0`
    pub fn label(&mut self, prefix: &str) -> String {
        let index = self.next_index(prefix);
        format!("{prefix}{index}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_per_prefix() {
        let mut names = NameSupply::new();

        assert_eq!(names.generated("e"), "$e0");
        assert_eq!(names.generated("v"), "$v0");
        assert_eq!(names.generated("e"), "$e1");
        assert_eq!(names.label("lam"), "lam0");
        assert_eq!(names.next_index("x"), 0);
        assert_eq!(names.next_index("x"), 1);
    }
}
