//! Category handlers and registry
//!
//! Each handler turns one request into the final user-facing response for
//! its category.

use crate::config::CommissionTerms;
use crate::models::{Category, ConversationHistory, HandlerResult, Request};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

pub mod commission;
pub mod contest;
pub mod policy;
pub mod ticket;

pub use commission::CommissionHandler;
pub use contest::ContestHandler;
pub use policy::PolicyHandler;
pub use ticket::{TicketHandler, TICKET_PLACEHOLDER};

#[async_trait::async_trait]
pub trait CategoryHandler: Send + Sync {
    fn category(&self) -> Category;

    fn name(&self) -> &'static str {
        self.category().handler_name()
    }

    /// Oracle failures come back as `HandlerUnavailable`
    async fn handle(&self, request: &Request, history: &ConversationHistory)
        -> Result<HandlerResult>;
}

/// Registry for looking up handlers by category
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Category, Arc<dyn CategoryHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn CategoryHandler>) {
        self.handlers.insert(handler.category(), handler);
    }

    pub fn get(&self, category: Category) -> Option<Arc<dyn CategoryHandler>> {
        self.handlers.get(&category).cloned()
    }

    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self.handlers.keys().copied().collect();
        categories.sort_by_key(|c| c.as_str());
        categories
    }
}

/// Shared instruction for commission math, used by the commission and
/// ticket handlers
pub(crate) fn commission_instruction(terms: &CommissionTerms) -> String {
    format!(
        "You are a Sales Commissions expert. Users will ask you about what their commission \
will be for a particular deal. You can assume their on-target incentive to be ${} \
and their annual quota to be ${}. Also note that Commission is equal to on-target \
incentive divided by annual quota, a rate of {:.2}% of the deal value.",
        terms.on_target_incentive,
        terms.annual_quota,
        terms.rate() * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::ScriptedModel;

    #[test]
    fn test_commission_instruction_embeds_terms() {
        let text = commission_instruction(&CommissionTerms::default());
        assert!(text.contains("$100000"));
        assert!(text.contains("$2000000"));
        assert!(text.contains("divided by annual quota"));
        assert!(text.contains("5.00%"));

        let custom = commission_instruction(&CommissionTerms {
            on_target_incentive: 50_000,
            annual_quota: 400_000,
        });
        assert!(custom.contains("12.50%"));
    }

    #[test]
    fn test_registry_lookup() {
        let model = Arc::new(ScriptedModel::new());
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(TicketHandler::new(model.clone(), CommissionTerms::default())));
        registry.register(Arc::new(CommissionHandler::new(model, CommissionTerms::default())));

        assert_eq!(registry.categories(), vec![Category::Commission, Category::Ticket]);
        assert_eq!(registry.get(Category::Ticket).unwrap().name(), "ticket_agent");
        assert!(registry.get(Category::Policy).is_none());
    }
}
