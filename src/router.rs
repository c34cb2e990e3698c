//! Category router
//!
//! Pure and total: every label maps to a handler or to `Reject`.

use crate::models::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Dispatch to the handler for this category (`Clarify` → clarifier)
    Handler(Category),
    /// Label outside the category set; the turn ends without a response
    Reject,
}

/// Exact lookup against the five known labels
pub fn route(label: &str) -> Route {
    match label.parse::<Category>() {
        Ok(category) => Route::Handler(category),
        Err(_) => Route::Reject,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_labels_route_to_their_handler() {
        assert_eq!(route("policy"), Route::Handler(Category::Policy));
        assert_eq!(route("commission"), Route::Handler(Category::Commission));
        assert_eq!(route("contest"), Route::Handler(Category::Contest));
        assert_eq!(route("ticket"), Route::Handler(Category::Ticket));
        assert_eq!(route("clarify"), Route::Handler(Category::Clarify));
    }

    #[test]
    fn test_unknown_labels_reject() {
        let cases = vec![
            "",
            " ",
            "billing",
            "POLICY",
            "policy ",
            "The monthly commission calculation is 5%",
            "\u{0}",
            "ticket\nclarify",
        ];

        for c in cases {
            assert_eq!(route(c), Route::Reject, "label {:?}", c);
        }
    }

    #[test]
    fn test_route_is_deterministic() {
        for label in ["policy", "nonsense", "clarify"] {
            assert_eq!(route(label), route(label));
        }
    }
}
