//! Translate winit window events into [`NativeEvent`]s.
//!
//! winit reports modifiers as a separate `ModifiersChanged` event while the
//! editor wants them attached to every button and key event, so each
//! window keeps one [`EventTranslator`] that tracks the current state.
//!
//! Events with no editor meaning (resize, move, scale factor, redraw) are
//! dropped here: the host drives size through `size_changed` and the
//! render thread draws continuously.

use keyboard_types::{Key as KbKey, Modifiers};
use sonido_editor::input::POINTS_PER_LINE;
use sonido_editor::{MouseButton, NativeEvent};
use winit::event::{ElementState, KeyEvent, MouseButton as WinitButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{Key as WinitKey, ModifiersState, NamedKey};
use winit::platform::scancode::PhysicalKeyExtScancode;

/// Per-window translation state.
#[derive(Debug, Default)]
pub struct EventTranslator {
    modifiers: Modifiers,
}

impl EventTranslator {
    /// Translate one event, calling `emit` for each resulting [`NativeEvent`].
    pub fn translate(&mut self, event: WindowEvent, mut emit: impl FnMut(NativeEvent)) {
        match event {
            WindowEvent::CloseRequested => emit(NativeEvent::CloseRequested),
            WindowEvent::Focused(focused) => {
                if !focused {
                    self.modifiers = Modifiers::empty();
                }
                emit(NativeEvent::Focus(focused));
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = map_modifiers(modifiers.state());
            }
            WindowEvent::CursorEntered { .. } => emit(NativeEvent::CursorEnter(true)),
            WindowEvent::CursorLeft { .. } => emit(NativeEvent::CursorEnter(false)),
            WindowEvent::CursorMoved { position, .. } => emit(NativeEvent::CursorPos {
                x: position.x,
                y: position.y,
            }),
            WindowEvent::MouseInput { state, button, .. } => emit(NativeEvent::MouseButton {
                button: map_mouse_button(button),
                pressed: state == ElementState::Pressed,
                modifiers: self.modifiers,
            }),
            WindowEvent::MouseWheel { delta, .. } => {
                let (x, y) = scroll_lines(delta);
                emit(NativeEvent::Scroll { x, y });
            }
            WindowEvent::KeyboardInput { event, .. } => self.key(&event, &mut emit),
            _ => {}
        }
    }

    fn key(&self, event: &KeyEvent, emit: &mut impl FnMut(NativeEvent)) {
        let pressed = event.state == ElementState::Pressed;
        emit(NativeEvent::Key {
            key: map_key(&event.logical_key),
            scancode: event.physical_key.to_scancode(),
            pressed,
            repeat: event.repeat,
            modifiers: self.modifiers,
        });
        if pressed {
            if let Some(text) = &event.text {
                for c in text.chars() {
                    emit(NativeEvent::Char(c));
                }
            }
        }
    }

    /// Modifier keys currently held.
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }
}

/// Map winit modifier state.
pub fn map_modifiers(state: ModifiersState) -> Modifiers {
    let mut modifiers = Modifiers::empty();
    modifiers.set(Modifiers::SHIFT, state.shift_key());
    modifiers.set(Modifiers::CONTROL, state.control_key());
    modifiers.set(Modifiers::ALT, state.alt_key());
    modifiers.set(Modifiers::META, state.super_key());
    modifiers
}

/// Map a winit mouse button. Back and forward become the first two extras.
pub fn map_mouse_button(button: WinitButton) -> MouseButton {
    match button {
        WinitButton::Left => MouseButton::Left,
        WinitButton::Right => MouseButton::Right,
        WinitButton::Middle => MouseButton::Middle,
        WinitButton::Back => MouseButton::Other(3),
        WinitButton::Forward => MouseButton::Other(4),
        WinitButton::Other(n) => MouseButton::Other(n),
    }
}

/// Scroll delta in lines; pixel deltas (touchpads) are divided by the
/// same points-per-line factor the input layer multiplies by.
pub fn scroll_lines(delta: MouseScrollDelta) -> (f32, f32) {
    match delta {
        MouseScrollDelta::LineDelta(x, y) => (x, y),
        MouseScrollDelta::PixelDelta(position) => (
            position.x as f32 / POINTS_PER_LINE,
            position.y as f32 / POINTS_PER_LINE,
        ),
    }
}

/// Map a winit logical key.
pub fn map_key(key: &WinitKey) -> KbKey {
    match key {
        WinitKey::Character(text) => KbKey::Character(text.to_string()),
        WinitKey::Named(named) => map_named_key(*named),
        WinitKey::Dead(_) => KbKey::Dead,
        WinitKey::Unidentified(_) => KbKey::Unidentified,
    }
}

fn map_named_key(key: NamedKey) -> KbKey {
    match key {
        NamedKey::Space => KbKey::Character(" ".to_owned()),
        NamedKey::Enter => KbKey::Enter,
        NamedKey::Tab => KbKey::Tab,
        NamedKey::Backspace => KbKey::Backspace,
        NamedKey::Escape => KbKey::Escape,
        NamedKey::Delete => KbKey::Delete,
        NamedKey::Insert => KbKey::Insert,
        NamedKey::Home => KbKey::Home,
        NamedKey::End => KbKey::End,
        NamedKey::PageUp => KbKey::PageUp,
        NamedKey::PageDown => KbKey::PageDown,
        NamedKey::ArrowUp => KbKey::ArrowUp,
        NamedKey::ArrowDown => KbKey::ArrowDown,
        NamedKey::ArrowLeft => KbKey::ArrowLeft,
        NamedKey::ArrowRight => KbKey::ArrowRight,
        NamedKey::Shift => KbKey::Shift,
        NamedKey::Control => KbKey::Control,
        NamedKey::Alt => KbKey::Alt,
        NamedKey::Super => KbKey::Meta,
        NamedKey::F1 => KbKey::F1,
        NamedKey::F2 => KbKey::F2,
        NamedKey::F3 => KbKey::F3,
        NamedKey::F4 => KbKey::F4,
        NamedKey::F5 => KbKey::F5,
        NamedKey::F6 => KbKey::F6,
        NamedKey::F7 => KbKey::F7,
        NamedKey::F8 => KbKey::F8,
        NamedKey::F9 => KbKey::F9,
        NamedKey::F10 => KbKey::F10,
        NamedKey::F11 => KbKey::F11,
        NamedKey::F12 => KbKey::F12,
        _ => KbKey::Unidentified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;

    fn collect(translator: &mut EventTranslator, event: WindowEvent) -> Vec<NativeEvent> {
        let mut out = Vec::new();
        translator.translate(event, |e| out.push(e));
        out
    }

    #[test]
    fn close_and_focus_pass_through() {
        let mut translator = EventTranslator::default();
        assert_eq!(
            collect(&mut translator, WindowEvent::CloseRequested),
            vec![NativeEvent::CloseRequested]
        );
        assert_eq!(
            collect(&mut translator, WindowEvent::Focused(true)),
            vec![NativeEvent::Focus(true)]
        );
    }

    #[test]
    fn unrelated_events_are_dropped() {
        let mut translator = EventTranslator::default();
        assert!(collect(&mut translator, WindowEvent::RedrawRequested).is_empty());
        assert!(collect(&mut translator, WindowEvent::Destroyed).is_empty());
    }

    #[test]
    fn modifier_state_maps_each_flag() {
        let state = ModifiersState::SHIFT | ModifiersState::SUPER;
        assert_eq!(map_modifiers(state), Modifiers::SHIFT | Modifiers::META);
        assert_eq!(map_modifiers(ModifiersState::empty()), Modifiers::empty());
    }

    #[test]
    fn back_and_forward_become_extra_buttons() {
        assert_eq!(map_mouse_button(WinitButton::Back), MouseButton::Other(3));
        assert_eq!(map_mouse_button(WinitButton::Forward), MouseButton::Other(4));
        assert_eq!(map_mouse_button(WinitButton::Other(9)), MouseButton::Other(9));
    }

    #[test]
    fn pixel_scroll_converts_to_lines() {
        assert_eq!(scroll_lines(MouseScrollDelta::LineDelta(0.0, -2.0)), (0.0, -2.0));
        let (x, y) = scroll_lines(MouseScrollDelta::PixelDelta(PhysicalPosition::new(48.0, 12.0)));
        assert!((x - 2.0).abs() < f32::EPSILON);
        assert!((y - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn named_and_character_keys() {
        assert_eq!(map_key(&WinitKey::Named(NamedKey::Enter)), KbKey::Enter);
        assert_eq!(map_key(&WinitKey::Named(NamedKey::F7)), KbKey::F7);
        assert_eq!(
            map_key(&WinitKey::Named(NamedKey::Space)),
            KbKey::Character(" ".to_owned())
        );
        assert_eq!(
            map_key(&WinitKey::Character("q".into())),
            KbKey::Character("q".to_owned())
        );
        assert_eq!(map_key(&WinitKey::Named(NamedKey::MediaPlay)), KbKey::Unidentified);
    }
}
