//! Read-only table of providers, keyed by name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::normalize::ChunkAdapter;
use crate::{Error, Provider};

/// Which model(s) a descriptor sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSpec {
    /// Let the upstream pick.
    Default,
    Single(String),
    /// Tried in order; retry attempt `n` uses entry `n % len`.
    Fallback(Vec<String>),
}

impl ModelSpec {
    pub fn for_attempt(&self, attempt: u32) -> Option<&str> {
        match self {
            ModelSpec::Default => None,
            ModelSpec::Single(model) => Some(model.as_str()),
            ModelSpec::Fallback(models) if models.is_empty() => None,
            ModelSpec::Fallback(models) => Some(models[attempt as usize % models.len()].as_str()),
        }
    }
}

/// How much of a chat is sent as context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// System prompt, finished history oldest-first, then the query.
    FullHistory,
    /// The query alone.
    SingleTurn,
}

/// How a provider delivers its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// One awaited text.
    Batch,
    /// Raw chunks, normalized with the given adapter.
    Stream(ChunkAdapter),
}

/// One registry entry.
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub key: String,
    pub provider: Arc<dyn Provider>,
    pub model: ModelSpec,
    pub delivery: Delivery,
    pub context: ContextMode,
    /// Context budget in tokens, when the upstream enforces one.
    pub context_tokens: Option<usize>,
    pub supports_files: bool,
    pub supports_functions: bool,
}

impl ProviderDescriptor {
    /// A batch descriptor with single-turn context; refine with the builder methods.
    pub fn new(key: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        Self {
            key: key.into(),
            provider,
            model: ModelSpec::Default,
            delivery: Delivery::Batch,
            context: ContextMode::SingleTurn,
            context_tokens: None,
            supports_files: false,
            supports_functions: false,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = ModelSpec::Single(model.into());
        self
    }

    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.model = ModelSpec::Fallback(models.into_iter().map(Into::into).collect());
        self
    }

    /// Mark as streaming. Streaming descriptors send full history unless
    /// [`ProviderDescriptor::context`] overrides it afterwards.
    pub fn streaming(mut self, adapter: ChunkAdapter) -> Self {
        self.delivery = Delivery::Stream(adapter);
        self.context = ContextMode::FullHistory;
        self
    }

    pub fn context(mut self, context: ContextMode) -> Self {
        self.context = context;
        self
    }

    pub fn context_tokens(mut self, tokens: usize) -> Self {
        self.context_tokens = Some(tokens);
        self
    }

    pub fn with_files(mut self) -> Self {
        self.supports_files = true;
        self
    }

    pub fn with_functions(mut self) -> Self {
        self.supports_functions = true;
        self
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.delivery, Delivery::Stream(_))
    }

    pub fn adapter(&self) -> Option<&ChunkAdapter> {
        match &self.delivery {
            Delivery::Stream(adapter) => Some(adapter),
            Delivery::Batch => None,
        }
    }

    /// Whether chunks bypass the generic normalizer.
    pub fn is_custom_handled(&self) -> bool {
        self.adapter().is_some_and(ChunkAdapter::is_custom)
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("key", &self.key)
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("delivery", &self.delivery)
            .field("context", &self.context)
            .field("context_tokens", &self.context_tokens)
            .finish()
    }
}

/// Immutable key -> descriptor mapping with a guaranteed default.
#[derive(Debug, Clone)]
pub struct Registry {
    providers: BTreeMap<String, ProviderDescriptor>,
    default_key: String,
}

impl Registry {
    pub fn builder(default_key: impl Into<String>) -> RegistryBuilder {
        RegistryBuilder {
            providers: BTreeMap::new(),
            default_key: default_key.into(),
        }
    }

    /// Look up a descriptor. Absent or unknown keys resolve to the default.
    pub fn lookup(&self, key: Option<&str>) -> &ProviderDescriptor {
        key.and_then(|k| self.providers.get(k))
            .unwrap_or_else(|| &self.providers[&self.default_key])
    }

    /// Normalize a key: itself if registered, the default otherwise.
    pub fn resolve_key<'a>(&'a self, key: Option<&'a str>) -> &'a str {
        &self.lookup(key).key
    }

    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    /// Every registered key, sorted.
    pub fn keys(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    fn keys_where(&self, pred: impl Fn(&ProviderDescriptor) -> bool) -> Vec<&str> {
        self.providers
            .values()
            .filter(|d| pred(d))
            .map(|d| d.key.as_str())
            .collect()
    }

    pub fn file_capable(&self) -> Vec<&str> {
        self.keys_where(|d| d.supports_files)
    }

    pub fn function_capable(&self) -> Vec<&str> {
        self.keys_where(|d| d.supports_functions)
    }

    pub fn custom_handled(&self) -> Vec<&str> {
        self.keys_where(ProviderDescriptor::is_custom_handled)
    }
}

/// Collects descriptors and validates the table once.
pub struct RegistryBuilder {
    providers: BTreeMap<String, ProviderDescriptor>,
    default_key: String,
}

impl RegistryBuilder {
    /// Add a descriptor. Empty and duplicate keys are rejected.
    pub fn register(mut self, descriptor: ProviderDescriptor) -> Result<Self, Error> {
        if descriptor.key.trim().is_empty() {
            return Err(Error::config("provider key must not be empty"));
        }
        if self.providers.contains_key(&descriptor.key) {
            return Err(Error::config(format!(
                "provider '{}' registered twice",
                descriptor.key
            )));
        }
        self.providers.insert(descriptor.key.clone(), descriptor);
        Ok(self)
    }

    /// Finish the table. The default key must be registered so lookups never fail.
    pub fn build(self) -> Result<Registry, Error> {
        if !self.providers.contains_key(&self.default_key) {
            return Err(Error::config(format!(
                "default provider '{}' is not registered",
                self.default_key
            )));
        }
        Ok(Registry {
            providers: self.providers,
            default_key: self.default_key,
        })
    }
}
