pub mod ensemble;
pub mod heuristic;

/// Differential diagnoses to weigh against a primary condition, keyed by
/// condition family. Unrecognized conditions get the generic entries.
pub(crate) fn differentials_for(primary_condition: &str) -> Vec<String> {
    let condition = primary_condition.to_lowercase();
    let differentials: &[&str] = if condition.contains("tuberculosis") {
        &["Pneumonia", "Lung Cancer", "Sarcoidosis", "Fungal Infection"]
    } else if condition.contains("pneumonia") || condition.contains("consolidation") {
        &["Tuberculosis", "Pulmonary Edema", "Lung Cancer", "Pneumonitis"]
    } else if condition.contains("fracture") {
        &["Bone Bruise", "Arthritis", "Bone Tumor", "Osteomyelitis"]
    } else if condition.contains("normal") {
        &["Early Disease", "Subtle Findings", "Technical Limitations"]
    } else {
        &[
            "Consider clinical correlation",
            "Additional imaging may be helpful",
        ]
    };
    differentials.iter().map(|d| d.to_string()).collect()
}

/// Removes duplicate strings while preserving first-seen order.
pub(crate) fn dedupe_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
