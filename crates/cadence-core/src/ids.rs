use uuid::Uuid;

/// Prefixed identifiers for store rows, e.g. `sess-1f2e…`
pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix_and_are_unique() {
        let a = new_id("sess");
        let b = new_id("sess");
        assert!(a.starts_with("sess-"));
        assert_ne!(a, b);
    }
}
