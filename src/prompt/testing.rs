//! Scripted prompter for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use zeroize::Zeroizing;

use super::{PromptError, PromptKind, PromptRequest, PromptResult, Prompter};

/// Answers prompts from a fixed script and records what was asked.
pub(crate) struct ScriptedPrompter {
    approve: Mutex<bool>,
    passwords: Mutex<VecDeque<Option<String>>>,
    asked: Mutex<Vec<PromptRequest>>,
}

impl ScriptedPrompter {
    /// Approves every confirmation; password prompts are cancelled until
    /// [`push_password`](Self::push_password) queues one.
    pub(crate) fn approving() -> Self {
        Self {
            approve: Mutex::new(true),
            passwords: Mutex::new(VecDeque::new()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn denying() -> Self {
        let p = Self::approving();
        p.set_approve(false);
        p
    }

    pub(crate) fn set_approve(&self, approve: bool) {
        *self.approve.lock().unwrap() = approve;
    }

    /// Queue the next password answer; `None` cancels.
    pub(crate) fn push_password(&self, password: Option<&str>) {
        self.passwords
            .lock()
            .unwrap()
            .push_back(password.map(str::to_string));
    }

    pub(crate) fn asked(&self) -> Vec<PromptRequest> {
        self.asked.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, kind: PromptKind) -> usize {
        self.asked
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, request: &PromptRequest) -> PromptResult<bool> {
        self.asked.lock().unwrap().push(request.clone());
        Ok(*self.approve.lock().unwrap())
    }

    async fn password(&self, request: &PromptRequest) -> PromptResult<Zeroizing<String>> {
        self.asked.lock().unwrap().push(request.clone());
        match self.passwords.lock().unwrap().pop_front().flatten() {
            Some(pw) => Ok(Zeroizing::new(pw)),
            None => Err(PromptError::Cancelled),
        }
    }
}
