//! Frontend shell for a handheld emulator.
//!
//! This crate contains the platform-agnostic frontend plumbing: the per-game
//! save-state mirror kept in sync with a durable store, the cartridge
//! load/reset lifecycle, and the touch/mouse input pipeline. The emulation
//! engine itself is a collaborator supplied by the host via [`engine::Engine`];
//! persistence and cartridge sources come in through [`store::DurableStore`]
//! and [`library::CartridgeLibrary`].
//!
//! Everything here assumes a single-threaded, cooperatively-scheduled host
//! (e.g. a current-thread Tokio runtime driving a UI event loop).

/// Shell configuration persisted next to the host's other settings.
pub mod config;

/// Cartridge lifecycle state machine and the main [`console::Console`] facade.
pub mod console;

/// On-screen control recognizers (buttons, directional pad).
pub mod controls;

/// Emulation engine contract and the no-op stand-in.
pub mod engine;

/// Touch/mouse normalization and recognizer dispatch.
pub mod input;

/// Cartridge sources.
pub mod library;

/// In-memory save-state mirror with RTC transcoding.
pub mod save_state;

/// Durable key-value store contract and bundled adapters.
pub mod store;
