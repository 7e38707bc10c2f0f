use chrono::{DateTime, Datelike, Utc};

/// Human-readable batch label: up to three alphanumeric chars of the material name,
/// then the planting day and month, e.g. `tom-19oct` for tomatoes planted on Oct 19.
///
/// Labels are not unique; the crop id is the identity.
pub fn generate_batch_id(material_name: &str, planted_at: DateTime<Utc>) -> String {
    let prefix: String = material_name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .take(3)
        .collect();
    let month = planted_at.format("%b").to_string().to_lowercase();
    let prefix = if prefix.is_empty() { "crop".to_string() } else { prefix };
    format!("{prefix}-{}{month}", planted_at.day())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn batch_id_uses_material_prefix_and_date() {
        assert_eq!(
            generate_batch_id("Tomato Cherry", at("2026-10-19T07:00:00Z")),
            "tom-19oct"
        );
        assert_eq!(generate_batch_id("Bok choy", at("2026-03-05T07:00:00Z")), "bok-5mar");
    }

    #[test]
    fn short_or_symbolic_names_still_produce_a_label() {
        assert_eq!(generate_batch_id("K2", at("2026-01-01T00:00:00Z")), "k2-1jan");
        assert_eq!(generate_batch_id("--", at("2026-01-01T00:00:00Z")), "crop-1jan");
    }
}
