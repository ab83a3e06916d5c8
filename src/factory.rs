use crate::dispatcher::{GenerateOptions, DEFAULT_MAX_RETRIES};
use crate::normalize::{ChunkAdapter, Framing};
use crate::provider::Provider;
use crate::providers::ollama::DEFAULT_OLLAMA_HOST;
use crate::providers::{
    AiChatsProvider, GeminiProvider, OllamaProvider, OpenAICompatProvider, PizzaGptProvider,
};
use crate::registry::{ProviderDescriptor, Registry};
use crate::Error;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

/// Registry key used when nothing else is configured.
pub const DEFAULT_PROVIDER_KEY: &str = "DeepInfraLlama31_70B";
/// Where [`crate::storage::FileStore`] keeps records by default.
pub const DEFAULT_DATA_DIR: &str = "./promptline-data";

/// Runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub default_provider: String,
    pub data_dir: PathBuf,
    pub max_retries: u32,
    pub deepinfra_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub ollama_host: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER_KEY.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_retries: DEFAULT_MAX_RETRIES,
            deepinfra_api_key: None,
            gemini_api_key: None,
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
        }
    }
}

impl Settings {
    /// Create settings from environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_retries = match var("PROMPTLINE_MAX_RETRIES") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::config(format!(
                    "PROMPTLINE_MAX_RETRIES must be a non-negative integer, got '{raw}'"
                ))
            })?,
            None => defaults.max_retries,
        };

        Ok(Self {
            default_provider: var("PROMPTLINE_DEFAULT_PROVIDER")
                .unwrap_or(defaults.default_provider),
            data_dir: var("PROMPTLINE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_retries,
            deepinfra_api_key: var("DEEPINFRA_API_KEY"),
            gemini_api_key: var("GEMINI_API_KEY"),
            ollama_host: var("OLLAMA_HOST").unwrap_or(defaults.ollama_host),
        })
    }

    /// Generation options carrying the configured retry bound.
    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions::default().max_retries(self.max_retries)
    }
}

// key, model, context token budget
const DEEPINFRA_MODELS: &[(&str, &str, Option<usize>)] = &[
    ("DeepInfraLlama31_70B", "meta-llama/Meta-Llama-3.1-70B-Instruct", None),
    ("DeepInfraLlama31_8B", "meta-llama/Meta-Llama-3.1-8B-Instruct", None),
    ("DeepInfraLlama31_405B", "meta-llama/Meta-Llama-3.1-405B-Instruct", None),
    ("DeepInfraMixtral_8x22B", "mistralai/Mixtral-8x22B-Instruct-v0.1", None),
    ("DeepInfraQwen2_72B", "Qwen/Qwen2-72B-Instruct", None),
    ("DeepInfraLlama3_70B", "meta-llama/Meta-Llama-3-70B-Instruct", Some(8000)),
    ("DeepInfraGemma2_27B", "google/gemma-2-27b-it", Some(4096)),
];

const GEMINI_MODELS: &[&str] = &[
    "gemini-1.5-pro-exp-0827",
    "gemini-1.5-flash-exp-0827",
    "gemini-1.5-flash-latest",
];

/// Build the registry of every built-in provider.
///
/// Several keys share one client and differ only in model. An unknown
/// configured default is a configuration error.
pub fn builtin_registry(settings: &Settings) -> Result<Registry, Error> {
    let deepinfra: Arc<dyn Provider> =
        Arc::new(OpenAICompatProvider::deepinfra(settings.deepinfra_api_key.clone())?);
    let openai_delta = ChunkAdapter::Delta(Framing::Json("/choices/0/delta/content".into()));

    let mut builder = Registry::builder(settings.default_provider.clone());
    for (key, model, context_tokens) in DEEPINFRA_MODELS {
        let mut descriptor = ProviderDescriptor::new(*key, deepinfra.clone())
            .model(*model)
            .streaming(openai_delta.clone())
            .with_files()
            .with_functions();
        if let Some(tokens) = context_tokens {
            descriptor = descriptor.context_tokens(*tokens);
        }
        builder = builder.register(descriptor)?;
    }

    builder
        .register(
            ProviderDescriptor::new("BestIM_GPT4oMini", Arc::new(AiChatsProvider::new()?))
                .streaming(ChunkAdapter::Delta(Framing::DataLines)),
        )?
        .register(ProviderDescriptor::new(
            "PizzaGPT",
            Arc::new(PizzaGptProvider::new()?),
        ))?
        .register(
            ProviderDescriptor::new(
                "GoogleGemini",
                Arc::new(GeminiProvider::new(settings.gemini_api_key.clone())?),
            )
            .models(GEMINI_MODELS.iter().copied())
            .streaming(ChunkAdapter::Custom)
            .with_files(),
        )?
        .register(
            ProviderDescriptor::new(
                "OllamaLocal",
                Arc::new(OllamaProvider::new(settings.ollama_host.clone())?),
            )
            .streaming(ChunkAdapter::Delta(Framing::Json("/message/content".into()))),
        )?
        .build()
}
