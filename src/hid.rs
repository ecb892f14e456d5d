use crate::dispatcher::{InjectError, InputSink, KeyInput};
use crate::mapping::{KeySym, Modifier, MouseButton};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use uinput::device::Device;
use uinput::event::controller;
use uinput::event::keyboard;
use uinput::event::relative;

const TAP_DELAY: Duration = Duration::from_millis(10);

/// Teclado y ratón virtuales sobre /dev/uinput
pub struct HidOutput {
    dev: Mutex<Device>,
}

impl HidOutput {
    pub fn new() -> Result<Self, uinput::Error> {
        let dev = uinput::default()?
            .name("mirada-hid")?
            .event(uinput::event::Keyboard::All)?
            .event(uinput::event::Controller::Mouse(controller::Mouse::Left))?
            .event(uinput::event::Controller::Mouse(controller::Mouse::Right))?
            .event(uinput::event::Controller::Mouse(controller::Mouse::Middle))?
            .event(uinput::event::Relative::Position(relative::Position::X))?
            .event(uinput::event::Relative::Position(relative::Position::Y))?
            .create()?;

        Ok(HidOutput {
            dev: Mutex::new(dev),
        })
    }

    fn key_tap(&self, key: keyboard::Key) -> Result<(), uinput::Error> {
        // Un único lock por pulsación para no intercalar eventos de dos hilos
        let mut dev = self.dev.lock().unwrap_or_else(PoisonError::into_inner);
        dev.press(&keyboard::Keyboard::Key(key))?;
        dev.synchronize()?;
        std::thread::sleep(TAP_DELAY);
        dev.release(&keyboard::Keyboard::Key(key))?;
        dev.synchronize()
    }

    fn button_tap(&self, button: controller::Mouse) -> Result<(), uinput::Error> {
        let mut dev = self.dev.lock().unwrap_or_else(PoisonError::into_inner);
        dev.press(&controller::Controller::Mouse(button))?;
        dev.synchronize()?;
        std::thread::sleep(TAP_DELAY);
        dev.release(&controller::Controller::Mouse(button))?;
        dev.synchronize()
    }
}

impl InputSink for HidOutput {
    fn press_and_release(&self, key: KeyInput) -> Result<(), InjectError> {
        let code = match key {
            KeyInput::Key(sym) => key_code(sym)
                .ok_or_else(|| InjectError::Rejected(format!("tecla sin código: {}", sym)))?,
            KeyInput::Modifier(m) => modifier_code(m),
        };
        Ok(self.key_tap(code)?)
    }

    fn click(&self, button: MouseButton) -> Result<(), InjectError> {
        let button = match button {
            MouseButton::Left => controller::Mouse::Left,
            MouseButton::Right => controller::Mouse::Right,
            MouseButton::Middle => controller::Mouse::Middle,
        };
        Ok(self.button_tap(button)?)
    }

    /// Mueve el cursor en relación a su posición actual (dx, dy en píxeles)
    fn move_cursor(&self, dx: i32, dy: i32) -> Result<(), InjectError> {
        let mut dev = self.dev.lock().unwrap_or_else(PoisonError::into_inner);
        dev.send(relative::Position::X, dx)?;
        dev.send(relative::Position::Y, dy)?;
        dev.synchronize()?;
        Ok(())
    }
}

fn modifier_code(modifier: Modifier) -> keyboard::Key {
    match modifier {
        Modifier::Shift => keyboard::Key::LeftShift,
        Modifier::Ctrl => keyboard::Key::LeftControl,
        Modifier::Alt => keyboard::Key::LeftAlt,
    }
}

fn key_code(sym: KeySym) -> Option<keyboard::Key> {
    use keyboard::Key;

    let key = match sym {
        KeySym::Char(c) => return char_code(c),
        KeySym::Space => Key::Space,
        KeySym::Enter => Key::Enter,
        KeySym::Tab => Key::Tab,
        KeySym::Delete => Key::Delete,
        KeySym::Backspace => Key::BackSpace,
        KeySym::Escape => Key::Esc,
        KeySym::Left => Key::Left,
        KeySym::Right => Key::Right,
        KeySym::Up => Key::Up,
        KeySym::Down => Key::Down,
        KeySym::F(n) => match n {
            1 => Key::F1,
            2 => Key::F2,
            3 => Key::F3,
            4 => Key::F4,
            5 => Key::F5,
            6 => Key::F6,
            7 => Key::F7,
            8 => Key::F8,
            9 => Key::F9,
            10 => Key::F10,
            11 => Key::F11,
            12 => Key::F12,
            _ => return None,
        },
    };
    Some(key)
}

fn char_code(c: char) -> Option<keyboard::Key> {
    use keyboard::Key;

    let key = match c.to_ascii_lowercase() {
        'a' => Key::A,
        'b' => Key::B,
        'c' => Key::C,
        'd' => Key::D,
        'e' => Key::E,
        'f' => Key::F,
        'g' => Key::G,
        'h' => Key::H,
        'i' => Key::I,
        'j' => Key::J,
        'k' => Key::K,
        'l' => Key::L,
        'm' => Key::M,
        'n' => Key::N,
        'o' => Key::O,
        'p' => Key::P,
        'q' => Key::Q,
        'r' => Key::R,
        's' => Key::S,
        't' => Key::T,
        'u' => Key::U,
        'v' => Key::V,
        'w' => Key::W,
        'x' => Key::X,
        'y' => Key::Y,
        'z' => Key::Z,
        '0' => Key::_0,
        '1' => Key::_1,
        '2' => Key::_2,
        '3' => Key::_3,
        '4' => Key::_4,
        '5' => Key::_5,
        '6' => Key::_6,
        '7' => Key::_7,
        '8' => Key::_8,
        '9' => Key::_9,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ModeRegistry;
    use crate::mapping::Action;

    #[test]
    fn every_builtin_key_has_a_code() {
        let registry = ModeRegistry::builtin();
        for mode in registry.modes() {
            let table = registry.get(&mode).unwrap();
            for kind in crate::types::GestureKind::ALL {
                if let Some(Action::Key(sym)) = table.get(kind) {
                    assert!(key_code(sym).is_some(), "{} sin código en {}", sym, mode);
                }
            }
        }
    }

    #[test]
    fn letters_digits_and_function_keys() {
        assert!(matches!(char_code('q'), Some(keyboard::Key::Q)));
        assert!(matches!(char_code('7'), Some(keyboard::Key::_7)));
        assert!(char_code('!').is_none());
        assert!(matches!(key_code(KeySym::F(12)), Some(keyboard::Key::F12)));
        assert!(key_code(KeySym::F(0)).is_none());
        assert!(matches!(modifier_code(Modifier::Ctrl), keyboard::Key::LeftControl));
    }
}
