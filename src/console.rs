use std::{
    cell::RefCell,
    panic::{AssertUnwindSafe, catch_unwind},
    rc::Rc,
    time::Duration,
};

use log::{debug, warn};
use thiserror::Error;

use crate::{
    config::ShellConfig,
    engine::{Engine, EngineError, GbKey},
    library::{CartridgeLibrary, LibraryError},
    save_state::SaveStateCache,
    store::{DurableStore, StoreError},
};

/// Pause between a successful cartridge attach and the Running transition,
/// giving the engine a beat to finish its own warm-up.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

const SAVE_DOMAIN_PREFIX: &str = "game-";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleState {
    Idle,
    Loading,
    Running,
    /// Reserved: failures revert storage to [`ConsoleState::Idle`] and reach
    /// callers through [`LoadError`] instead.
    Error,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no cartridge loaded")]
    NoCartridge,

    #[error("load superseded by a newer request")]
    Superseded,

    #[error("cartridge fetch failed: {0}")]
    Fetch(#[from] LibraryError),

    #[error("save state fetch failed: {0}")]
    SaveState(#[from] StoreError),

    #[error("cartridge attach failed: {0}")]
    Attach(#[from] EngineError),
}

type StateObserver = Box<dyn FnMut(ConsoleState)>;

struct ConsoleInner<E> {
    engine: E,
    state: ConsoleState,
    observers: Vec<StateObserver>,
    identifier: Option<String>,
    data: Option<Vec<u8>>,
    speed: f64,
    sound_enabled: bool,
    settle_delay: Duration,
    request_token: u64,
}

/// Cartridge lifecycle controller.
///
/// Sequences save-domain selection, cache load, cartridge fetch, and engine
/// attach, and owns the engine plus the save-state mirror. `Console` is a
/// cheap-clone handle, so on-screen controls and UI callbacks can capture
/// their own copy.
///
/// Lifecycle requests race last-writer-wins: every `load_cartridge`,
/// `insert_cartridge`, and `reset` takes a fresh request token, and a
/// completion whose token has gone stale resolves [`LoadError::Superseded`]
/// without touching state.
pub struct Console<E, S, L> {
    inner: Rc<RefCell<ConsoleInner<E>>>,
    save_state: SaveStateCache<S>,
    library: Rc<L>,
}

impl<E, S, L> Clone for Console<E, S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            save_state: self.save_state.clone(),
            library: Rc::clone(&self.library),
        }
    }
}

impl<E, S, L> Console<E, S, L>
where
    E: Engine,
    S: DurableStore,
    L: CartridgeLibrary,
{
    pub fn new(engine: E, save_state: SaveStateCache<S>, library: L) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ConsoleInner {
                engine,
                state: ConsoleState::Idle,
                observers: Vec::new(),
                identifier: None,
                data: None,
                speed: 1.0,
                sound_enabled: true,
                settle_delay: SETTLE_DELAY,
                request_token: 0,
            })),
            save_state,
            library: Rc::new(library),
        }
    }

    pub fn state(&self) -> ConsoleState {
        self.inner.borrow().state
    }

    /// Identifier of the currently recorded cartridge, if any.
    pub fn identifier(&self) -> Option<String> {
        self.inner.borrow().identifier.clone()
    }

    /// Handle to the save-state mirror, e.g. for engine persistence glue.
    pub fn save_state(&self) -> SaveStateCache<S> {
        self.save_state.clone()
    }

    pub fn set_settle_delay(&self, delay: Duration) {
        self.inner.borrow_mut().settle_delay = delay;
    }

    /// Register a state-change observer.
    ///
    /// Observers fire synchronously on every distinct transition, in
    /// registration order. A panicking observer is isolated so the rest
    /// still fire.
    pub fn on_state_change(&self, observer: impl FnMut(ConsoleState) + 'static) {
        self.inner.borrow_mut().observers.push(Box::new(observer));
    }

    /// Load the cartridge named `identifier`: open its save domain, fetch
    /// the image from the library, and insert it.
    ///
    /// Any failure reverts the console to Idle and returns the cause, except
    /// supersession by a newer request, which leaves the newer request's
    /// state untouched.
    pub async fn load_cartridge(&self, identifier: &str) -> Result<(), LoadError> {
        let token = self.next_token();
        self.set_state(ConsoleState::Loading);

        match self.run_load(token, identifier).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // A failure that lost the race must not stomp the winning
                // request's state.
                if self.check_current(token).is_err() {
                    return Err(LoadError::Superseded);
                }
                warn!("unable to load cartridge {identifier}: {err}");
                self.set_state(ConsoleState::Idle);
                Err(err)
            }
        }
    }

    async fn run_load(&self, token: u64, identifier: &str) -> Result<(), LoadError> {
        let domain = format!("{SAVE_DOMAIN_PREFIX}{identifier}");
        self.save_state.open(&domain).await?;
        self.check_current(token)?;

        let data = self.library.fetch(identifier).await?;
        self.check_current(token)?;

        self.insert_with_token(token, identifier, data).await
    }

    /// Insert an already-fetched cartridge image.
    ///
    /// Records the identifier/data (so [`Console::reset`] works without a
    /// re-fetch), attaches the image to the engine, and transitions to
    /// Running once the settle delay elapses. An attach failure rejects with
    /// the state unchanged; the caller decides how to recover.
    pub async fn insert_cartridge(&self, identifier: &str, data: Vec<u8>) -> Result<(), LoadError> {
        let token = self.next_token();
        self.insert_with_token(token, identifier, data).await
    }

    async fn insert_with_token(
        &self,
        token: u64,
        identifier: &str,
        data: Vec<u8>,
    ) -> Result<(), LoadError> {
        let settle_delay = {
            let mut inner = self.inner.borrow_mut();
            inner.identifier = Some(identifier.to_owned());
            inner.data = Some(data);
            let inner = &mut *inner;
            if let Some(bytes) = inner.data.as_deref() {
                inner.engine.attach(bytes)?;
            }
            inner.settle_delay
        };

        tokio::time::sleep(settle_delay).await;
        self.check_current(token)?;

        self.set_state(ConsoleState::Running);
        Ok(())
    }

    /// Re-insert the previously loaded cartridge.
    pub async fn reset(&self) -> Result<(), LoadError> {
        let (identifier, data) = {
            let inner = self.inner.borrow();
            match (&inner.identifier, &inner.data) {
                (Some(identifier), Some(data)) => (identifier.clone(), data.clone()),
                _ => return Err(LoadError::NoCartridge),
            }
        };

        let token = self.next_token();
        self.insert_with_token(token, &identifier, data).await
    }

    /// Drop the cartridge and force Idle, invalidating in-flight requests.
    pub fn clear(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.identifier = None;
            inner.data = None;
            inner.request_token += 1;
        }
        self.set_state(ConsoleState::Idle);
    }

    /// Resume emulation. Only meaningful once Running.
    pub fn run(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state == ConsoleState::Running {
            inner.engine.play();
        }
    }

    pub fn pause(&self) {
        self.inner.borrow_mut().engine.pause();
    }

    pub fn key_down(&self, key: GbKey) {
        self.inner.borrow_mut().engine.key_down(key);
    }

    pub fn key_up(&self, key: GbKey) {
        self.inner.borrow_mut().engine.key_up(key);
    }

    pub fn set_speed(&self, speed: f64) {
        let mut inner = self.inner.borrow_mut();
        inner.speed = speed;
        inner.engine.set_speed(speed);
    }

    pub fn speed(&self) -> f64 {
        self.inner.borrow().speed
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        let mut inner = self.inner.borrow_mut();
        inner.sound_enabled = enabled;
        if enabled {
            inner.engine.enable_audio();
        } else {
            inner.engine.disable_audio();
        }
    }

    pub fn sound_enabled(&self) -> bool {
        self.inner.borrow().sound_enabled
    }

    pub fn apply_config(&self, config: &ShellConfig) {
        self.set_speed(config.speed);
        self.set_sound_enabled(config.sound_enabled);
    }

    fn next_token(&self) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.request_token += 1;
        inner.request_token
    }

    fn check_current(&self, token: u64) -> Result<(), LoadError> {
        if self.inner.borrow().request_token == token {
            Ok(())
        } else {
            debug!("discarding stale lifecycle completion (token {token})");
            Err(LoadError::Superseded)
        }
    }

    fn set_state(&self, state: ConsoleState) {
        let mut observers = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == state {
                return;
            }
            inner.state = state;
            std::mem::take(&mut inner.observers)
        };

        for observer in &mut observers {
            if catch_unwind(AssertUnwindSafe(|| observer(state))).is_err() {
                warn!("state observer panicked during transition to {state:?}");
            }
        }

        // Observers may have registered more observers while theirs were
        // checked out; keep registration order.
        let mut inner = self.inner.borrow_mut();
        let added = std::mem::replace(&mut inner.observers, observers);
        inner.observers.extend(added);
    }
}
