//! Input entry points of the rendering library.
//!
//! Each function translates one native event into egui's [`RawInput`]
//! format and appends it to the pending input of the calling thread's
//! *current* context, the way an immediate-mode GUI backend feeds its
//! ambient context. Without an active context the event is rejected with
//! [`ContextError::NotActive`]; callers activate first (see
//! [`EventCallbackRouter`](crate::EventCallbackRouter)).
//!
//! # Coordinate system
//!
//! The windowing library reports physical pixel coordinates. They are
//! divided by the context's scale to get egui's logical coordinates
//! (matching `pixels_per_point`).
//!
//! [`RawInput`]: egui::RawInput

use egui::{Event as EguiEvent, Modifiers, PointerButton, Pos2, Vec2};
use keyboard_types::{Key as KbKey, Modifiers as KbModifiers};

use crate::context::{ContextError, RenderContextRegistry};
use crate::platform::{MouseButton, NativeEvent};

/// Logical points scrolled per wheel line.
pub const POINTS_PER_LINE: f32 = 24.0;

/// Typed character. Control characters are dropped.
pub fn char_input(c: char) -> Result<(), ContextError> {
    RenderContextRegistry::with_current(|ctx| {
        if c.is_control() {
            return;
        }
        ctx.with_input(|input| input.raw.events.push(EguiEvent::Text(c.to_string())));
    })
}

/// Cursor entered or left the window.
pub fn cursor_enter(entered: bool) -> Result<(), ContextError> {
    RenderContextRegistry::with_current(|ctx| {
        // egui infers presence from pointer movement; only leaving is reported.
        if !entered {
            ctx.with_input(|input| input.raw.events.push(EguiEvent::PointerGone));
        }
    })
}

/// Mouse button press or release at the last known cursor position.
pub fn mouse_button(
    button: MouseButton,
    pressed: bool,
    modifiers: KbModifiers,
) -> Result<(), ContextError> {
    RenderContextRegistry::with_current(|ctx| {
        ctx.with_input(|input| {
            input.raw.modifiers = map_modifiers(modifiers);
            if let Some(button) = map_mouse_button(button) {
                input.raw.events.push(EguiEvent::PointerButton {
                    pos: input.pointer,
                    button,
                    pressed,
                    modifiers: input.raw.modifiers,
                });
            }
        });
    })
}

/// Wheel motion in lines.
pub fn scroll(x: f32, y: f32) -> Result<(), ContextError> {
    RenderContextRegistry::with_current(|ctx| {
        ctx.with_input(|input| {
            input.raw.events.push(EguiEvent::MouseWheel {
                unit: egui::MouseWheelUnit::Point,
                delta: Vec2::new(x * POINTS_PER_LINE, y * POINTS_PER_LINE),
                modifiers: input.raw.modifiers,
            });
        });
    })
}

/// Key press or release. Keys egui has no name for only update modifiers.
pub fn key(
    key: &KbKey,
    pressed: bool,
    repeat: bool,
    modifiers: KbModifiers,
) -> Result<(), ContextError> {
    RenderContextRegistry::with_current(|ctx| {
        ctx.with_input(|input| {
            input.raw.modifiers = map_modifiers(modifiers);
            if let Some(key) = map_key(key) {
                input.raw.events.push(EguiEvent::Key {
                    key,
                    physical_key: None,
                    pressed,
                    repeat,
                    modifiers: input.raw.modifiers,
                });
            }
        });
    })
}

/// Cursor moved to physical position `(x, y)`.
pub fn cursor_pos(x: f64, y: f64) -> Result<(), ContextError> {
    RenderContextRegistry::with_current(|ctx| {
        ctx.with_input(|input| {
            let scale_recip = 1.0 / input.scale;
            let pos = Pos2::new(x as f32 * scale_recip, y as f32 * scale_recip);
            input.pointer = pos;
            input.raw.events.push(EguiEvent::PointerMoved(pos));
        });
    })
}

/// Window gained or lost keyboard focus.
pub fn focus(focused: bool) -> Result<(), ContextError> {
    RenderContextRegistry::with_current(|ctx| {
        ctx.with_input(|input| {
            input.raw.focused = focused;
            input.raw.events.push(EguiEvent::WindowFocused(focused));
        });
    })
}

/// Forward a native event to the matching entry point.
///
/// Returns `Ok(false)` for events that are not input ([`NativeEvent::CloseRequested`]).
pub fn forward(event: &NativeEvent) -> Result<bool, ContextError> {
    match event {
        NativeEvent::Char(c) => char_input(*c)?,
        NativeEvent::CursorEnter(entered) => cursor_enter(*entered)?,
        NativeEvent::MouseButton {
            button,
            pressed,
            modifiers,
        } => mouse_button(*button, *pressed, *modifiers)?,
        NativeEvent::Scroll { x, y } => scroll(*x, *y)?,
        NativeEvent::Key {
            key: k,
            pressed,
            repeat,
            modifiers,
            ..
        } => key(k, *pressed, *repeat, *modifiers)?,
        NativeEvent::CursorPos { x, y } => cursor_pos(*x, *y)?,
        NativeEvent::Focus(focused) => focus(*focused)?,
        NativeEvent::CloseRequested => return Ok(false),
    }
    Ok(true)
}

/// Map keyboard-types modifier flags to egui [`Modifiers`].
fn map_modifiers(mods: KbModifiers) -> Modifiers {
    let ctrl = mods.contains(KbModifiers::CONTROL);
    let meta = mods.contains(KbModifiers::META);
    let mac = cfg!(target_os = "macos");
    Modifiers {
        alt: mods.contains(KbModifiers::ALT),
        ctrl,
        shift: mods.contains(KbModifiers::SHIFT),
        mac_cmd: mac && meta,
        command: if mac { meta } else { ctrl },
    }
}

/// Map a native mouse button to an egui [`PointerButton`].
fn map_mouse_button(button: MouseButton) -> Option<PointerButton> {
    match button {
        MouseButton::Left => Some(PointerButton::Primary),
        MouseButton::Right => Some(PointerButton::Secondary),
        MouseButton::Middle => Some(PointerButton::Middle),
        MouseButton::Other(3) => Some(PointerButton::Extra1),
        MouseButton::Other(4) => Some(PointerButton::Extra2),
        MouseButton::Other(_) => None,
    }
}

/// Map a logical key to an egui [`egui::Key`].
fn map_key(key: &KbKey) -> Option<egui::Key> {
    use egui::Key as E;
    let mapped = match key {
        KbKey::Character(s) => return E::from_name(s),
        KbKey::Enter => E::Enter,
        KbKey::Tab => E::Tab,
        KbKey::Backspace => E::Backspace,
        KbKey::Escape => E::Escape,
        KbKey::Delete => E::Delete,
        KbKey::Insert => E::Insert,
        KbKey::Home => E::Home,
        KbKey::End => E::End,
        KbKey::PageUp => E::PageUp,
        KbKey::PageDown => E::PageDown,
        KbKey::ArrowUp => E::ArrowUp,
        KbKey::ArrowDown => E::ArrowDown,
        KbKey::ArrowLeft => E::ArrowLeft,
        KbKey::ArrowRight => E::ArrowRight,
        KbKey::F1 => E::F1,
        KbKey::F2 => E::F2,
        KbKey::F3 => E::F3,
        KbKey::F4 => E::F4,
        KbKey::F5 => E::F5,
        KbKey::F6 => E::F6,
        KbKey::F7 => E::F7,
        KbKey::F8 => E::F8,
        KbKey::F9 => E::F9,
        KbKey::F10 => E::F10,
        KbKey::F11 => E::F11,
        KbKey::F12 => E::F12,
        _ => return None,
    };
    Some(mapped)
}
