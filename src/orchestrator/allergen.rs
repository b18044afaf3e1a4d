//! Intersection of detected allergens with a user's declared allergies.

use std::collections::HashSet;

/// Outcome of checking a label against a user's allergies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllergenCheck {
    /// Detected labels that match a declared allergy, in detection order.
    pub matched: Vec<String>,
}

impl AllergenCheck {
    /// Returns `true` if nothing matched.
    pub fn is_safe(&self) -> bool {
        self.matched.is_empty()
    }

    /// Returns the alert naming the offending allergens, if any.
    pub fn alert(&self) -> Option<String> {
        if self.is_safe() {
            return None;
        }
        Some(format!("CRITICAL WARNING: Contains {}!", self.matched.join(", ")))
    }
}

/// Canonical form of an allergen label.
///
/// Trimmed and lower-cased, with a single plural `s` removed from words
/// longer than three letters, so "Peanuts" matches "peanut".
pub fn canonical_allergen(label: &str) -> String {
    let lowered = label.trim().to_lowercase();
    match lowered.strip_suffix('s') {
        Some(stem) if stem.chars().count() >= 3 && !stem.ends_with('s') => stem.to_string(),
        _ => lowered,
    }
}

/// Checks `detected` labels against `allergies`.
pub fn check_allergens(detected: &[String], allergies: &[String]) -> AllergenCheck {
    let declared: HashSet<String> = allergies
        .iter()
        .filter(|a| !a.trim().is_empty())
        .map(|a| canonical_allergen(a))
        .collect();

    let mut seen = HashSet::new();
    let matched = detected
        .iter()
        .map(|label| label.trim())
        .filter(|label| !label.is_empty())
        .filter(|label| {
            let canonical = canonical_allergen(label);
            declared.contains(&canonical) && seen.insert(canonical)
        })
        .map(str::to_string)
        .collect();

    AllergenCheck { matched }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_match_names_offender() {
        let check = check_allergens(&labels(&["Peanut", "Soy"]), &labels(&["Peanut"]));
        assert!(!check.is_safe());
        assert_eq!(
            check.alert().as_deref(),
            Some("CRITICAL WARNING: Contains Peanut!")
        );
    }

    #[test]
    fn test_no_overlap_is_safe() {
        let check = check_allergens(&labels(&["Peanut"]), &labels(&["Soy"]));
        assert!(check.is_safe());
        assert_eq!(check.alert(), None);
    }

    #[test]
    fn test_case_whitespace_and_plural_insensitive() {
        let check = check_allergens(
            &labels(&["  PEANUTS ", "Eggs", "Fish", "Soy"]),
            &labels(&["peanut", "egg", "fish"]),
        );
        assert_eq!(check.matched, labels(&["PEANUTS", "Eggs", "Fish"]));
        assert_eq!(
            check.alert().as_deref(),
            Some("CRITICAL WARNING: Contains PEANUTS, Eggs, Fish!")
        );
    }

    #[test]
    fn test_duplicates_reported_once() {
        let check = check_allergens(&labels(&["Dairy", "dairy", "Dairy "]), &labels(&["DAIRY"]));
        assert_eq!(check.matched, labels(&["Dairy"]));
    }

    #[test]
    fn test_canonical_forms() {
        assert_eq!(canonical_allergen(" Nuts "), "nut");
        assert_eq!(canonical_allergen("Soy"), "soy");
        assert_eq!(canonical_allergen("Shellfish"), "shellfish");
        assert_eq!(canonical_allergen("Molluscs"), "mollusc");
        assert_eq!(canonical_allergen("Gas"), "gas");
        assert_eq!(canonical_allergen("Glass"), "glass");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(check_allergens(&[], &labels(&["Soy"])).is_safe());
        assert!(check_allergens(&labels(&["Soy"]), &[]).is_safe());
        assert!(check_allergens(&labels(&[""]), &labels(&[""])).is_safe());
    }
}
