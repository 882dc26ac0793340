//! Local id generation for newly constructed FHIR resources.

use uuid::Uuid;

/// Builds a `<prefix>-<uuid>` id. Every builder in `fhir::builders` calls
/// this exactly once per resource it constructs.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = new_id("pat");
        let b = new_id("pat");
        assert!(a.starts_with("pat-"));
        assert!(b.starts_with("pat-"));
        assert_ne!(a, b);
    }
}
