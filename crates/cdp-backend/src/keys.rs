//! Key descriptors for `Input.dispatchKeyEvent`.

/// DOM key identity plus the legacy fields Chromium still keys shortcuts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub key: String,
    pub code: String,
    pub windows_virtual_key_code: i64,
    /// Text payload for the `char` event, when the key produces one.
    pub text: Option<String>,
}

impl KeyDescriptor {
    /// Resolve a named key (Enter, Escape, Tab, arrows) or a single
    /// printable character. Unknown multi-character names are rejected by
    /// returning `None` so callers can surface a parse error.
    pub fn resolve(key: &str) -> Option<Self> {
        let named = match key {
            "Enter" => Some(("Enter", "Enter", 13, Some("\r"))),
            "Tab" => Some(("Tab", "Tab", 9, None)),
            "Escape" => Some(("Escape", "Escape", 27, None)),
            "Backspace" => Some(("Backspace", "Backspace", 8, None)),
            "Delete" => Some(("Delete", "Delete", 46, None)),
            "ArrowUp" => Some(("ArrowUp", "ArrowUp", 38, None)),
            "ArrowDown" => Some(("ArrowDown", "ArrowDown", 40, None)),
            "ArrowLeft" => Some(("ArrowLeft", "ArrowLeft", 37, None)),
            "ArrowRight" => Some(("ArrowRight", "ArrowRight", 39, None)),
            "Home" => Some(("Home", "Home", 36, None)),
            "End" => Some(("End", "End", 35, None)),
            "PageUp" => Some(("PageUp", "PageUp", 33, None)),
            "PageDown" => Some(("PageDown", "PageDown", 34, None)),
            " " => Some((" ", "Space", 32, Some(" "))),
            _ => None,
        };
        if let Some((k, code, vk, text)) = named {
            return Some(Self {
                key: k.to_string(),
                code: code.to_string(),
                windows_virtual_key_code: vk,
                text: text.map(str::to_string),
            });
        }

        let mut chars = key.chars();
        let ch = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Some(Self::for_char(ch))
    }

    /// Descriptor for one printable character, as typed text dispatches it.
    pub fn for_char(ch: char) -> Self {
        let upper = ch.to_ascii_uppercase();
        let code = if ch.is_ascii_alphabetic() {
            format!("Key{upper}")
        } else if ch.is_ascii_digit() {
            format!("Digit{ch}")
        } else {
            String::new()
        };
        let vk = if ch.is_ascii_alphanumeric() {
            upper as i64
        } else {
            0
        };
        Self {
            key: ch.to_string(),
            code,
            windows_virtual_key_code: vk,
            text: Some(ch.to_string()),
        }
    }
}
