#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use tokio::sync::Notify;

use vibe_emu_shell::engine::{Engine, EngineError, GbKey};
use vibe_emu_shell::library::{CartridgeLibrary, LibraryError};
use vibe_emu_shell::store::{DurableStore, MemoryStore, StoreError};

/// [`MemoryStore`] wrapper that counts successful writes and can inject a
/// burst of failures.
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    set_calls: Rc<Cell<usize>>,
    delete_calls: Rc<Cell<usize>>,
    failures_remaining: Rc<Cell<usize>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.get()
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.get()
    }

    /// Make the next `count` writes (sets or deletes) fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failures_remaining.set(count);
    }

    fn take_failure(&self) -> bool {
        let remaining = self.failures_remaining.get();
        if remaining > 0 {
            self.failures_remaining.set(remaining - 1);
            true
        } else {
            false
        }
    }
}

impl DurableStore for RecordingStore {
    async fn properties_for_domain(
        &self,
        domain: &str,
    ) -> Result<HashMap<String, String>, StoreError> {
        self.inner.properties_for_domain(domain).await
    }

    async fn set_value(&self, domain: &str, key: &str, value: &str) -> Result<(), StoreError> {
        if self.take_failure() {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        self.set_calls.set(self.set_calls.get() + 1);
        self.inner.set_value(domain, key, value).await
    }

    async fn delete_value(&self, domain: &str, key: &str) -> Result<(), StoreError> {
        if self.take_failure() {
            return Err(StoreError::Backend("injected delete failure".into()));
        }
        self.delete_calls.set(self.delete_calls.get() + 1);
        self.inner.delete_value(domain, key).await
    }
}

/// [`MemoryStore`] wrapper whose fetches can be gated per domain, to model a
/// slow store and race concurrent `open` calls.
#[derive(Clone, Default)]
pub struct GatedStore {
    pub inner: MemoryStore,
    gates: Rc<RefCell<HashMap<String, Rc<Notify>>>>,
}

impl GatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold fetches for `domain` until the returned gate is notified.
    pub fn gate(&self, domain: &str) -> Rc<Notify> {
        let gate = Rc::new(Notify::new());
        self.gates
            .borrow_mut()
            .insert(domain.to_owned(), Rc::clone(&gate));
        gate
    }
}

impl DurableStore for GatedStore {
    async fn properties_for_domain(
        &self,
        domain: &str,
    ) -> Result<HashMap<String, String>, StoreError> {
        let gate = self.gates.borrow().get(domain).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.inner.properties_for_domain(domain).await
    }

    async fn set_value(&self, domain: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_value(domain, key, value).await
    }

    async fn delete_value(&self, domain: &str, key: &str) -> Result<(), StoreError> {
        self.inner.delete_value(domain, key).await
    }
}

/// Engine double that records every interaction; `attach` can be scripted to
/// fail.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    pub attach_calls: Rc<Cell<usize>>,
    pub fail_attach: Rc<Cell<bool>>,
    pub keys: Rc<RefCell<Vec<(GbKey, bool)>>>,
    pub playing: Rc<Cell<bool>>,
    pub speed: Rc<Cell<f64>>,
    pub audio_enabled: Rc<Cell<bool>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        let engine = Self::default();
        engine.audio_enabled.set(true);
        engine
    }
}

impl Engine for ScriptedEngine {
    fn attach(&mut self, rom: &[u8]) -> Result<(), EngineError> {
        self.attach_calls.set(self.attach_calls.get() + 1);
        if self.fail_attach.get() {
            return Err(EngineError::BadCartridge("scripted attach failure".into()));
        }
        if rom.is_empty() {
            return Err(EngineError::BadCartridge("empty image".into()));
        }
        Ok(())
    }

    fn key_down(&mut self, key: GbKey) {
        self.keys.borrow_mut().push((key, true));
    }

    fn key_up(&mut self, key: GbKey) {
        self.keys.borrow_mut().push((key, false));
    }

    fn play(&mut self) {
        self.playing.set(true);
    }

    fn pause(&mut self) {
        self.playing.set(false);
    }

    fn set_speed(&mut self, speed: f64) {
        self.speed.set(speed);
    }

    fn enable_audio(&mut self) {
        self.audio_enabled.set(true);
    }

    fn disable_audio(&mut self) {
        self.audio_enabled.set(false);
    }
}

/// In-memory cartridge library; individual identifiers can be gated to model
/// slow fetches.
#[derive(Clone, Default)]
pub struct MapLibrary {
    games: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    gates: Rc<RefCell<HashMap<String, Rc<Notify>>>>,
    fetch_calls: Rc<Cell<usize>>,
}

impl MapLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identifier: &str, data: Vec<u8>) {
        self.games.borrow_mut().insert(identifier.to_owned(), data);
    }

    /// Hold fetches of `identifier` until the returned gate is notified.
    pub fn gate(&self, identifier: &str) -> Rc<Notify> {
        let gate = Rc::new(Notify::new());
        self.gates
            .borrow_mut()
            .insert(identifier.to_owned(), Rc::clone(&gate));
        gate
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.get()
    }
}

impl CartridgeLibrary for MapLibrary {
    async fn fetch(&self, identifier: &str) -> Result<Vec<u8>, LibraryError> {
        self.fetch_calls.set(self.fetch_calls.get() + 1);

        let gate = self.gates.borrow().get(identifier).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.games
            .borrow()
            .get(identifier)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(identifier.to_owned()))
    }
}
