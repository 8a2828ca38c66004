//! SQL alias generation.

/// Generates unique table aliases from table names: `employee0_`,
/// `departmen1_`. One generator serves a whole statement, subqueries
/// included, so aliases never collide across nesting levels.
#[derive(Debug, Default)]
pub struct AliasGenerator {
    next: usize,
}

impl AliasGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, base: &str) -> String {
        let stem: String = base
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .take(9)
            .collect::<String>()
            .to_ascii_lowercase();
        let stem = if stem.is_empty() { "t".to_string() } else { stem };
        let alias = format!("{stem}{}_", self.next);
        self.next += 1;
        alias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_unique_and_stem_limited() {
        let mut generator = AliasGenerator::new();
        assert_eq!(generator.create("employee"), "employee0_");
        assert_eq!(generator.create("department"), "departmen1_");
        assert_eq!(generator.create("department"), "departmen2_");
    }
}
