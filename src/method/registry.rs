use super::{PaymentMethod, PixMethod};
use crate::types::WithdrawError;
use std::collections::HashMap;
use std::sync::Arc;

/// Payment methods keyed by uppercase name
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Arc<dyn PaymentMethod>>,
}

impl MethodRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in method (currently PIX)
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PixMethod::NAME, Arc::new(PixMethod::new()));
        registry
    }

    /// Register `method` under `name`, replacing any previous entry
    pub fn register(&mut self, name: &str, method: Arc<dyn PaymentMethod>) {
        self.methods.insert(name.trim().to_uppercase(), method);
    }

    /// Look up a method by name, case-insensitively
    ///
    /// # Errors
    ///
    /// `UnsupportedMethod` carrying the uppercased name when nothing is registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PaymentMethod>, WithdrawError> {
        let key = name.trim().to_uppercase();
        self.methods
            .get(&key)
            .cloned()
            .ok_or_else(|| WithdrawError::unsupported_method(&key))
    }

    pub fn supports(&self, name: &str) -> bool {
        self.methods.contains_key(&name.trim().to_uppercase())
    }

    /// Registered names, sorted
    pub fn supported_methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.supported_methods())
            .finish()
    }
}
