//! Perfiles de juego: cada modo asocia cada `GestureKind` a una acción o a
//! ninguna. Las tablas se validan al cargarlas: un perfil al que le falte un
//! gesto se rechaza en vez de convertirse en no-op silencioso en ejecución.

use crate::types::GestureKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Mode {mode} has no binding for {kind} (use null to leave it unbound)")]
    MissingBinding { mode: Mode, kind: GestureKind },

    #[error("Invalid mode name: {0:?}")]
    InvalidMode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid key symbol: {0:?}")]
pub struct KeyParseError(pub String);

/// Tecla no modificadora
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeySym {
    /// Letra minúscula a-z o dígito 0-9
    Char(char),
    Space,
    Enter,
    Tab,
    Delete,
    Backspace,
    Escape,
    Left,
    Right,
    Up,
    Down,
    /// Teclas de función F1-F12
    F(u8),
}

impl FromStr for KeySym {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let mut chars = lower.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                return Ok(Self::Char(c));
            }
        }
        match lower.as_str() {
            "space" => Ok(Self::Space),
            "enter" => Ok(Self::Enter),
            "tab" => Ok(Self::Tab),
            "delete" => Ok(Self::Delete),
            "backspace" => Ok(Self::Backspace),
            "esc" | "escape" => Ok(Self::Escape),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => other
                .strip_prefix('f')
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| (1..=12).contains(n))
                .map(Self::F)
                .ok_or_else(|| KeyParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for KeySym {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeySym> for String {
    fn from(key: KeySym) -> Self {
        key.to_string()
    }
}

impl fmt::Display for KeySym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(c) => write!(f, "{}", c),
            Self::Space => f.write_str("space"),
            Self::Enter => f.write_str("enter"),
            Self::Tab => f.write_str("tab"),
            Self::Delete => f.write_str("delete"),
            Self::Backspace => f.write_str("backspace"),
            Self::Escape => f.write_str("escape"),
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
            Self::F(n) => write!(f, "f{}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Shift,
    Ctrl,
    Alt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Acción de salida. En JSON: `{"key":"a"}`, `{"modifier":"shift"}`,
/// `{"click":"left"}`, `{"move_cursor":{"dx":-40,"dy":0}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Key(KeySym),
    Modifier(Modifier),
    Click(MouseButton),
    MoveCursor { dx: i32, dy: i32 },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "key:{}", key),
            Self::Modifier(m) => write!(f, "modifier:{:?}", m),
            Self::Click(b) => write!(f, "click:{:?}", b),
            Self::MoveCursor { dx, dy } => write!(f, "move:{},{}", dx, dy),
        }
    }
}

/// Perfil de juego. Los cinco modos integrados más cualquier modo definido en
/// un fichero de perfiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mode {
    Fps,
    Racing,
    Strategy,
    Platformer,
    Adventure,
    Custom(String),
}

impl Mode {
    pub const BUILTIN: [Mode; 5] = [
        Mode::Fps,
        Mode::Racing,
        Mode::Strategy,
        Mode::Platformer,
        Mode::Adventure,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Fps => "fps",
            Self::Racing => "racing",
            Self::Strategy => "strategy",
            Self::Platformer => "platformer",
            Self::Adventure => "adventure",
            Self::Custom(name) => name,
        }
    }
}

impl FromStr for Mode {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ProfileError::InvalidMode(s.to_string()));
        }
        Ok(match name.as_str() {
            "fps" => Self::Fps,
            "racing" => Self::Racing,
            "strategy" => Self::Strategy,
            "platformer" => Self::Platformer,
            "adventure" => Self::Adventure,
            _ => Self::Custom(name),
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tabla gesto → acción de un modo, exhaustiva sobre `GestureKind`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingTable {
    bindings: [Option<Action>; GestureKind::COUNT],
}

impl MappingTable {
    pub fn empty() -> Self {
        Self {
            bindings: [None; GestureKind::COUNT],
        }
    }

    /// Construye una tabla; los gestos no listados quedan sin acción
    pub fn from_pairs(pairs: &[(GestureKind, Action)]) -> Self {
        let mut table = Self::empty();
        for &(kind, action) in pairs {
            table.bindings[kind.index()] = Some(action);
        }
        table
    }

    /// Construye una tabla exigiendo una entrada (acción o null) por gesto
    pub fn from_bindings(
        mode: &Mode,
        bindings: &BTreeMap<GestureKind, Option<Action>>,
    ) -> Result<Self, ProfileError> {
        let mut table = Self::empty();
        for kind in GestureKind::ALL {
            match bindings.get(&kind) {
                Some(action) => table.bindings[kind.index()] = *action,
                None => {
                    return Err(ProfileError::MissingBinding {
                        mode: mode.clone(),
                        kind,
                    })
                }
            }
        }
        Ok(table)
    }

    /// Acción asociada, o `None` (no-op) si el gesto no está mapeado
    pub fn get(&self, kind: GestureKind) -> Option<Action> {
        self.bindings[kind.index()]
    }

    pub fn bound_count(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_some()).count()
    }
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    modes: BTreeMap<String, BTreeMap<GestureKind, Option<Action>>>,
}

/// Registro inmutable de tablas por modo
#[derive(Debug, Clone)]
pub struct ModeRegistry {
    tables: BTreeMap<Mode, Arc<MappingTable>>,
}

impl ModeRegistry {
    /// Registro con los cinco perfiles integrados
    pub fn builtin() -> Self {
        let tables = Mode::BUILTIN
            .iter()
            .map(|mode| (mode.clone(), Arc::new(builtin_table(mode))))
            .collect();
        Self { tables }
    }

    /// Perfiles integrados, sobrescritos o ampliados por un fichero JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ProfileError> {
        let file: ProfileFile = serde_json::from_str(content)?;
        let mut registry = Self::builtin();
        for (name, bindings) in &file.modes {
            let mode: Mode = name.parse()?;
            let table = MappingTable::from_bindings(&mode, bindings)?;
            registry.tables.insert(mode, Arc::new(table));
        }
        Ok(registry)
    }

    pub fn get(&self, mode: &Mode) -> Option<Arc<MappingTable>> {
        self.tables.get(mode).cloned()
    }

    pub fn contains(&self, mode: &Mode) -> bool {
        self.tables.contains_key(mode)
    }

    /// Modos disponibles, en orden estable
    pub fn modes(&self) -> Vec<Mode> {
        self.tables.keys().cloned().collect()
    }
}

fn builtin_table(mode: &Mode) -> MappingTable {
    use Action::{Click, Key, Modifier as Mod, MoveCursor};
    use GestureKind::*;
    use KeySym::Char;

    match mode {
        Mode::Fps => MappingTable::from_pairs(&[
            (GazeLeft, Key(Char('a'))),
            (GazeRight, Key(Char('d'))),
            (GazeUp, Key(Char('w'))),
            (GazeDown, Key(Char('s'))),
            (SingleBlink, Key(KeySym::Space)),
            (DoubleBlink, Key(Char('r'))),
            (LeftWink, Mod(Modifier::Ctrl)),
            (RightWink, Key(Char('f'))),
            (Dwell, Mod(Modifier::Alt)),
            (HeadTiltLeft, Key(Char('q'))),
            (HeadTiltRight, Key(Char('e'))),
            (HeadNodDown, Key(Char('c'))),
            (MouthOpen, Key(Char('t'))),
            (Smile, Key(Char('g'))),
            (EyebrowRaise, Key(KeySym::Tab)),
        ]),
        Mode::Racing => MappingTable::from_pairs(&[
            (HeadTiltLeft, Key(Char('a'))),
            (HeadTiltRight, Key(Char('d'))),
            (GazeUp, Key(Char('w'))),
            (GazeDown, Key(Char('s'))),
            (SingleBlink, Key(KeySym::Space)),
            (DoubleBlink, Key(Char('r'))),
            (LeftWink, Key(Char('q'))),
            (RightWink, Key(Char('e'))),
            (Dwell, Key(Char('c'))),
            (HeadNodDown, Key(Char('x'))),
            (MouthOpen, Key(KeySym::Enter)),
            (Smile, Key(Char('h'))),
            (GazeLeft, Key(KeySym::Left)),
            (GazeRight, Key(KeySym::Right)),
        ]),
        Mode::Strategy => MappingTable::from_pairs(&[
            (Dwell, Click(MouseButton::Left)),
            (SingleBlink, Click(MouseButton::Right)),
            (DoubleBlink, Key(KeySym::Delete)),
            (GazeLeft, MoveCursor { dx: -40, dy: 0 }),
            (GazeRight, MoveCursor { dx: 40, dy: 0 }),
            (GazeUp, Key(KeySym::Up)),
            (GazeDown, Key(KeySym::Down)),
            (HeadNodDown, Key(KeySym::Enter)),
            (HeadTiltLeft, Key(KeySym::Left)),
            (HeadTiltRight, Key(KeySym::Right)),
            (MouthOpen, Key(KeySym::Space)),
            (Smile, Key(KeySym::F(1))),
            (LeftWink, Key(Char('1'))),
            (RightWink, Key(Char('2'))),
        ]),
        Mode::Platformer => MappingTable::from_pairs(&[
            (GazeLeft, Key(Char('a'))),
            (GazeRight, Key(Char('d'))),
            (GazeUp, Key(Char('w'))),
            (GazeDown, Key(Char('s'))),
            (SingleBlink, Key(KeySym::Space)),
            (DoubleBlink, Key(Char('x'))),
            (LeftWink, Key(Char('s'))),
            (RightWink, Key(Char('w'))),
            (Dwell, Mod(Modifier::Shift)),
            (HeadTiltLeft, Key(KeySym::Left)),
            (HeadTiltRight, Key(KeySym::Right)),
            (HeadNodDown, Key(Char('s'))),
            (MouthOpen, Key(KeySym::Enter)),
            (Smile, Key(Char('c'))),
        ]),
        Mode::Adventure => MappingTable::from_pairs(&[
            (GazeLeft, Key(Char('a'))),
            (GazeRight, Key(Char('d'))),
            (GazeUp, Key(Char('w'))),
            (GazeDown, Key(Char('s'))),
            (SingleBlink, Key(KeySym::Space)),
            (DoubleBlink, Key(Char('e'))),
            (LeftWink, Key(Char('i'))),
            (RightWink, Key(Char('m'))),
            (Dwell, Key(Char('f'))),
            (HeadTiltLeft, Key(Char('q'))),
            (HeadTiltRight, Key(Char('r'))),
            (HeadNodDown, Mod(Modifier::Ctrl)),
            (MouthOpen, Key(KeySym::Enter)),
            (Smile, Key(Char('h'))),
            (EyebrowRaise, Key(KeySym::Tab)),
        ]),
        Mode::Custom(_) => MappingTable::empty(),
    }
}
