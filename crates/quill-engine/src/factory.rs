// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use quill_config::UserConfig;
use quill_model::{ChatRequest, ChatResponse, EventStream, MockClient, ModelClient, ModelError};

/// Builds a [`ModelClient`] from user configuration.
///
/// Concrete vendor bindings live outside this workspace and register
/// themselves by providing their own factory; the engine only consumes
/// the trait.
pub trait ClientFactory: Send + Sync {
    fn build(&self, config: &UserConfig) -> anyhow::Result<Arc<dyn ModelClient>>;
}

/// Factory for the providers this workspace ships: only `mock`.
///
/// Anything else is an error the orchestrator reports as `setup_required`
/// before falling back to the mock client so the session stays usable.
pub struct DefaultClientFactory;

impl ClientFactory for DefaultClientFactory {
    fn build(&self, config: &UserConfig) -> anyhow::Result<Arc<dyn ModelClient>> {
        match config.provider.as_str() {
            "mock" => Ok(Arc::new(MockClient)),
            other => anyhow::bail!(
                "provider '{other}' has no binding linked into this build; \
                 install a provider plugin or set provider = \"mock\""
            ),
        }
    }
}

/// A [`ModelClient`] whose inner client can be replaced mid-request.
///
/// `reload_config` swaps the inner client; the agent loop keeps its handle
/// and simply uses the new client on its next step, exactly as the reload
/// contract requires.  History is untouched by a swap.
pub struct SwappableClient {
    inner: RwLock<Arc<dyn ModelClient>>,
}

impl SwappableClient {
    pub fn new(inner: Arc<dyn ModelClient>) -> Self {
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub fn swap(&self, client: Arc<dyn ModelClient>) {
        *self.inner.write().expect("client lock poisoned") = client;
    }

    fn current(&self) -> Arc<dyn ModelClient> {
        Arc::clone(&self.inner.read().expect("client lock poisoned"))
    }
}

#[async_trait]
impl ModelClient for SwappableClient {
    fn model_name(&self) -> &str {
        // The name is advisory display data; returning the wrapper's alias
        // avoids holding the lock across an await elsewhere.
        "session-model"
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
        self.current().chat(req).await
    }

    async fn stream(&self, req: ChatRequest) -> Result<EventStream, ModelError> {
        self.current().stream(req).await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
