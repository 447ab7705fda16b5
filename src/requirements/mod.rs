//! Requirement drafting from a project scope.
//!
//! Deterministic: one functional requirement per scope sentence plus the
//! fixed non-functional baseline.

/// Generated requirement lists for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedRequirements {
    pub functional: Vec<String>,
    pub non_functional: Vec<String>,
}

const NON_FUNCTIONAL_BASELINE: [&str; 3] = [
    "Performance: Processes requests quickly and accurately.",
    "Usability: The interface is intuitive and accessible to all users.",
    "Security: Protects user data and transaction information.",
];

/// Draft requirements for `scope`.
pub fn generate(scope: &str) -> GeneratedRequirements {
    let functional = scope
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .map(|sentence| format!("The system shall support: {}", sentence))
        .collect();

    GeneratedRequirements {
        functional,
        non_functional: NON_FUNCTIONAL_BASELINE
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_requirement_per_sentence() {
        let generated = generate("Customers place orders. Staff ship them!  ");
        assert_eq!(
            generated.functional,
            vec![
                "The system shall support: Customers place orders",
                "The system shall support: Staff ship them",
            ]
        );
        assert_eq!(generated.non_functional.len(), 3);
        assert!(generated.non_functional[2].starts_with("Security:"));
    }

    #[test]
    fn test_empty_scope_has_only_baseline() {
        let generated = generate("   ");
        assert!(generated.functional.is_empty());
        assert_eq!(generated, generate(""));
    }
}
