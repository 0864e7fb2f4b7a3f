use uuid::Uuid;

/// Generates a new entity identifier.
pub fn generate_id() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(generate_id(), generate_id());
    }
}
