use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cartridge image rejected: {0}")]
    BadCartridge(String),

    #[error("engine failure: {0}")]
    Internal(String),
}

/// Joypad keys with their wire codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GbKey {
    A,
    B,
    Select,
    Start,
    Right,
    Left,
    Up,
    Down,
    R,
    L,
}

impl GbKey {
    /// Key code as understood by the engine's `key_down`/`key_up`.
    pub fn code(self) -> u8 {
        match self {
            GbKey::A => 0,
            GbKey::B => 1,
            GbKey::Select => 2,
            GbKey::Start => 3,
            GbKey::Right => 4,
            GbKey::Left => 5,
            GbKey::Up => 6,
            GbKey::Down => 7,
            GbKey::R => 8,
            GbKey::L => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => GbKey::A,
            1 => GbKey::B,
            2 => GbKey::Select,
            3 => GbKey::Start,
            4 => GbKey::Right,
            5 => GbKey::Left,
            6 => GbKey::Up,
            7 => GbKey::Down,
            8 => GbKey::R,
            9 => GbKey::L,
            _ => return None,
        })
    }
}

/// Contract the emulation engine exposes to the shell.
///
/// Only `attach` is required; everything else defaults to a no-op so partial
/// engines (and [`NullEngine`]) stay valid.
pub trait Engine {
    /// Attach a cartridge image. Fails on malformed input.
    fn attach(&mut self, rom: &[u8]) -> Result<(), EngineError>;

    fn key_down(&mut self, _key: GbKey) {}
    fn key_up(&mut self, _key: GbKey) {}
    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn set_speed(&mut self, _speed: f64) {}
    fn enable_audio(&mut self) {}
    fn disable_audio(&mut self) {}
}

/// Stand-in used while no engine has been initialized.
///
/// Every call is a no-op and `attach` succeeds: "not ready" is a valid state,
/// not an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEngine;

impl Engine for NullEngine {
    fn attach(&mut self, _rom: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }
}
