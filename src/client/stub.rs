use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{AliasService, ServiceError};
use crate::models::alias::HmeEmail;

/// Scripted vendor double. Once a script runs dry every call succeeds and
/// generate hands out `alias-<n>@icloud.test` with `n` counting from 1.
#[derive(Default)]
pub struct ScriptedService {
    generate_script: Mutex<VecDeque<Result<String, ServiceError>>>,
    reserve_script: Mutex<VecDeque<Result<(), ServiceError>>>,
    listing: Vec<HmeEmail>,
    generate_calls: AtomicUsize,
    reserve_calls: AtomicUsize,
}

impl ScriptedService {
    pub fn always_succeeding() -> Self {
        Self::default()
    }

    pub fn with_generate<I>(self, script: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ServiceError>>,
    {
        self.generate_script.lock().unwrap().extend(script);
        self
    }

    pub fn with_reserve<I>(self, script: I) -> Self
    where
        I: IntoIterator<Item = Result<(), ServiceError>>,
    {
        self.reserve_script.lock().unwrap().extend(script);
        self
    }

    pub fn with_listing(mut self, listing: Vec<HmeEmail>) -> Self {
        self.listing = listing;
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn reserve_calls(&self) -> usize {
        self.reserve_calls.load(Ordering::SeqCst)
    }
}

pub fn rejected(message: &str) -> ServiceError {
    ServiceError::Rejected(message.to_string())
}

#[async_trait]
impl AliasService for ScriptedService {
    async fn generate(&self) -> Result<String, ServiceError> {
        let call = self.generate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.generate_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("alias-{call}@icloud.test")))
    }

    async fn reserve(&self, _address: &str) -> Result<(), ServiceError> {
        self.reserve_calls.fetch_add(1, Ordering::SeqCst);
        self.reserve_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn list(&self) -> Result<Vec<HmeEmail>, ServiceError> {
        Ok(self.listing.clone())
    }
}
