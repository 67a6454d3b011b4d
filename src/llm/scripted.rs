//! Scripted in-memory backend for tests.

use std::sync::mpsc::{Receiver, Sender};

use parking_lot::Mutex;

use crate::llm::backend::{
    Fragment, FragmentStream, Generation, GenerationBackend, GenerationInput,
};
use crate::llm::error::{BackendError, BackendResult};

/// One scripted stream item.
#[derive(Clone, Debug)]
pub(crate) enum Step {
    Fragment(String),
    Fail(String),
    Panic,
}

struct Gate {
    fragments: Receiver<String>,
    dropped: Sender<()>,
}

/// Fragments fed by the test through a channel. Signals when dropped.
struct GatedFragments {
    fragments: Receiver<String>,
    dropped: Sender<()>,
}

impl Iterator for GatedFragments {
    type Item = BackendResult<Fragment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fragments.recv().ok().map(|text| Ok(Fragment::new(text)))
    }
}

impl Drop for GatedFragments {
    fn drop(&mut self) {
        let _ = self.dropped.send(());
    }
}

pub(crate) struct ScriptedBackend {
    model: String,
    configured: bool,
    script: Vec<Step>,
    reply: Option<Result<String, String>>,
    open_error: Option<String>,
    gate: Mutex<Option<Gate>>,
    inputs: Mutex<Vec<GenerationInput>>,
}

impl ScriptedBackend {
    pub(crate) fn new(script: Vec<Step>) -> Self {
        Self {
            model: "scripted-model".to_string(),
            configured: true,
            script,
            reply: None,
            open_error: None,
            gate: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fragments(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|text| Step::Fragment((*text).to_string()))
                .collect(),
        )
    }

    pub(crate) fn unconfigured() -> Self {
        let mut backend = Self::new(Vec::new());
        backend.configured = false;
        backend
    }

    /// Backend whose stream yields whatever the test sends, until the sender
    /// is dropped. The second receiver fires once the stream is dropped.
    pub(crate) fn gated() -> (Self, Sender<String>, Receiver<()>) {
        let (fragment_tx, fragment_rx) = std::sync::mpsc::channel();
        let (dropped_tx, dropped_rx) = std::sync::mpsc::channel();
        let backend = Self::new(Vec::new());
        *backend.gate.lock() = Some(Gate {
            fragments: fragment_rx,
            dropped: dropped_tx,
        });
        (backend, fragment_tx, dropped_rx)
    }

    pub(crate) fn with_reply(mut self, reply: Result<&str, &str>) -> Self {
        self.reply = Some(reply.map(ToString::to_string).map_err(ToString::to_string));
        self
    }

    pub(crate) fn with_open_error(mut self, message: &str) -> Self {
        self.open_error = Some(message.to_string());
        self
    }

    pub(crate) fn inputs(&self) -> Vec<GenerationInput> {
        self.inputs.lock().clone()
    }

    fn ensure_configured(&self) -> BackendResult<()> {
        if self.configured {
            Ok(())
        } else {
            Err(BackendError::NotConfigured("scripted backend disabled".to_string()))
        }
    }
}

impl GenerationBackend for ScriptedBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn generate_once(&self, prompt: &str) -> BackendResult<Generation> {
        self.inputs
            .lock()
            .push(GenerationInput::Prompt(prompt.to_string()));
        self.ensure_configured()?;

        let text = match &self.reply {
            Some(Ok(text)) => text.clone(),
            Some(Err(message)) => return Err(BackendError::Api(message.clone())),
            None => self
                .script
                .iter()
                .filter_map(|step| match step {
                    Step::Fragment(text) => Some(text.as_str()),
                    Step::Fail(_) | Step::Panic => None,
                })
                .collect(),
        };

        Ok(Generation {
            text,
            model: self.model.clone(),
        })
    }

    fn generate_streaming(&self, input: GenerationInput) -> BackendResult<FragmentStream> {
        self.inputs.lock().push(input);
        self.ensure_configured()?;

        if let Some(message) = &self.open_error {
            return Err(BackendError::Api(message.clone()));
        }

        if let Some(gate) = self.gate.lock().take() {
            return Ok(Box::new(GatedFragments {
                fragments: gate.fragments,
                dropped: gate.dropped,
            }));
        }

        let steps = self.script.clone();
        Ok(Box::new(steps.into_iter().map(|step| match step {
            Step::Fragment(text) => Ok(Fragment::new(text)),
            Step::Fail(message) => Err(BackendError::Api(message)),
            Step::Panic => panic!("scripted backend panic"),
        })))
    }
}
