use grantor::random::{OsSecureRandom, SecureRandom};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Hands out scripted values first, then falls back to real randomness.
#[derive(Debug, Default)]
pub struct ScriptedRandom {
    script: Mutex<VecDeque<String>>,
}

impl ScriptedRandom {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().expect("script lock poisoned").len()
    }
}

impl SecureRandom for ScriptedRandom {
    fn secure_random(&self) -> String {
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| OsSecureRandom.secure_random())
    }
}
