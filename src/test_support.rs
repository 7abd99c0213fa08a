use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use crate::{
    bridge::RpcBridge,
    error::{Result, TaillightError},
    pages::{Notifier, Toast},
    protocol::Procedure,
};

#[derive(Clone)]
enum Scripted {
    Respond(Value),
    Transport(String),
}

/// Bridge answering from a per-procedure script and recording every call
///
/// Queued answers are consumed in order; the last one stays in place.
#[derive(Default)]
pub struct ScriptedBridge {
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, name: &str, value: Value) {
        self.push(name, Scripted::Respond(value));
    }

    pub fn fail_transport(&self, name: &str, message: &str) {
        self.push(name, Scripted::Transport(message.to_string()));
    }

    fn push(&self, name: &str, answer: Scripted) {
        self.script
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(answer);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, procedure: Procedure) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == procedure.as_str())
            .count()
    }
}

#[async_trait]
impl RpcBridge for ScriptedBridge {
    async fn call_function(&self, name: &str, payload: Value) -> Result<Value> {
        self.calls.lock().unwrap().push((name.to_string(), payload));

        let answer = {
            let mut script = self.script.lock().unwrap();
            let queue = script
                .get_mut(name)
                .ok_or_else(|| TaillightError::Transport(format!("{name}: no scripted answer")))?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        match answer {
            Some(Scripted::Respond(value)) => Ok(value),
            Some(Scripted::Transport(message)) => Err(TaillightError::Transport(message)),
            None => Err(TaillightError::Transport(format!("{name}: no scripted answer"))),
        }
    }
}

/// Notifier keeping every toast for later inspection
#[derive(Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.toasts().into_iter().map(|t| t.title).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn toast(&self, toast: Toast) {
        self.toasts.lock().unwrap().push(toast);
    }
}
