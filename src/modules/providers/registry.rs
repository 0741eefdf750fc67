use super::provider_trait::PaymentProvider;
use crate::core::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Name-keyed set of configured providers. Routing decisions live in
/// configuration; the registry only resolves names the webhook ingress and
/// orchestrator hand it.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        let name = provider.name().to_string();
        self.providers.insert(name, provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PaymentProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Provider '{}' is not configured", name)))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
