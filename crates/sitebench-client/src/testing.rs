use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::render::RenderHook;
use crate::transport::{HttpMethod, Transport, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub path: String,
    pub method: HttpMethod,
    pub body: Option<Value>,
}

/// Replies per endpoint suffix (`api/env`, `api/mutate`, ...). Unscripted
/// endpoints answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Result<Value, TransportError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, endpoint: &str, reply: Result<Value, TransportError>) {
        self.replies
            .lock()
            .expect("replies lock")
            .insert(endpoint.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.path).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            path: path.to_string(),
            method,
            body: body.cloned(),
        });

        let route = path.split('?').next().unwrap_or(path);
        let replies = self.replies.lock().expect("replies lock");
        replies
            .iter()
            .find(|(endpoint, _)| route.ends_with(endpoint.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| {
                Err(TransportError::Http {
                    status: reqwest::StatusCode::NOT_FOUND,
                    body: json!({"error": "unscripted"}).to_string(),
                })
            })
    }
}

#[derive(Default)]
pub struct CountingRenderHook {
    renders: AtomicUsize,
}

impl CountingRenderHook {
    pub fn count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderHook for CountingRenderHook {
    async fn render(&self) {
        self.renders.fetch_add(1, Ordering::SeqCst);
    }
}
