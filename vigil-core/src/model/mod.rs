//! Remote model access
//!
//! [`ModelClient`] builds prompts, calls a [`ChatBackend`] and parses its
//! answers. The HTTP backend speaks the OpenAI chat-completions format.

pub mod backend;
pub mod client;
pub mod parse;
pub mod prompts;

pub use backend::{ChatBackend, ChatMessage, ChatRequest, HttpBackend, OPENAI_CHAT_URL};
pub use client::{AnalysisContext, ModelClient, RelatedFile};

#[cfg(test)]
pub(crate) mod testing {
    //! In-process backend double

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{ChatBackend, ChatRequest};
    use crate::{Error, Result};

    /// Replays queued responses and records every request
    #[derive(Default)]
    pub struct ScriptedBackend {
        unconfigured: bool,
        /// Never answer once the script runs out
        stall_when_empty: bool,
        responses: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn unconfigured() -> Self {
            Self {
                unconfigured: true,
                ..Self::default()
            }
        }

        /// Backend whose requests hang after the scripted responses
        pub fn stalling() -> Self {
            Self {
                stall_when_empty: true,
                ..Self::default()
            }
        }

        pub fn push_ok(&self, content: impl Into<String>) {
            self.responses.lock().unwrap().push_back(Ok(content.into()));
        }

        pub fn push_err(&self, err: Error) {
            self.responses.lock().unwrap().push_back(Err(err));
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn is_configured(&self) -> bool {
            !self.unconfigured
        }

        async fn complete(&self, request: &ChatRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(response) => response,
                None if self.stall_when_empty => std::future::pending().await,
                None => Err(Error::permanent("no scripted response left")),
            }
        }
    }
}
