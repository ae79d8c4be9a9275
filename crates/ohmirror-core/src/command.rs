// ── Item commands ──
//
// Commands are sent as plain-text POST bodies to the item link. Each
// item kind accepts a fixed subset; anything else fails before a
// request is made.

use rust_decimal::Decimal;

use crate::convert::parse_decimal;
use crate::error::CoreError;
use crate::model::{Hsb, ItemKind, Value};

/// A command that can be sent to an item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemCommand {
    On,
    Off,
    Toggle,
    Increase,
    Decrease,
    Stop,
    Move,
    Up,
    Down,
    /// Set the item to a value of its own state type.
    Set(Value),
    /// Brightness percentage for color items.
    Percent(Decimal),
    /// Full color for color items.
    Hsb(Hsb),
    /// Start a call to this number.
    Call(String),
}

impl ItemCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Toggle => "TOGGLE",
            Self::Increase => "INCREASE",
            Self::Decrease => "DECREASE",
            Self::Stop => "STOP",
            Self::Move => "MOVE",
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Set(_) => "set",
            Self::Percent(_) => "set percent",
            Self::Hsb(_) => "set color",
            Self::Call(_) => "call",
        }
    }

    pub fn is_supported_by(&self, kind: ItemKind) -> bool {
        match self {
            Self::On | Self::Off => {
                matches!(kind, ItemKind::Switch | ItemKind::Color | ItemKind::Dimmer)
            }
            Self::Toggle => matches!(
                kind,
                ItemKind::Switch | ItemKind::Dimmer | ItemKind::Rollershutter
            ),
            Self::Increase | Self::Decrease => matches!(kind, ItemKind::Color | ItemKind::Dimmer),
            Self::Stop | Self::Move | Self::Up | Self::Down => kind == ItemKind::Rollershutter,
            Self::Set(_) => matches!(
                kind,
                ItemKind::Switch
                    | ItemKind::Dimmer
                    | ItemKind::Number
                    | ItemKind::Rollershutter
                    | ItemKind::String
                    | ItemKind::Group
            ),
            Self::Percent(_) | Self::Hsb(_) => kind == ItemKind::Color,
            Self::Call(_) => kind == ItemKind::Call,
        }
    }

    /// Validate against `kind` and produce the request body.
    pub fn to_wire(&self, kind: ItemKind) -> Result<String, CoreError> {
        if !self.is_supported_by(kind) {
            return Err(CoreError::Unsupported {
                operation: self.name().to_owned(),
                item_type: kind,
            });
        }
        let wire = match self {
            Self::Set(v) if kind == ItemKind::Group => v.to_string(),
            Self::Set(v) => {
                let v = kind.validate(v.clone())?;
                kind.encode(Some(&v))
            }
            Self::Percent(p) => p.to_string(),
            Self::Hsb(c) => c.to_string(),
            Self::Call(number) => number.clone(),
            keyword => keyword.name().to_owned(),
        };
        Ok(wire)
    }

    /// State to assume locally once the server accepted this command,
    /// for kinds whose state follows the command directly.
    pub fn optimistic_state(&self, kind: ItemKind, current: Option<&Value>) -> Option<Value> {
        match (kind, self) {
            (ItemKind::Switch, Self::On) => Some(Value::Bool(true)),
            (ItemKind::Switch, Self::Off) => Some(Value::Bool(false)),
            (ItemKind::Switch, Self::Toggle) => {
                let on = current.and_then(Value::as_bool).unwrap_or(false);
                Some(Value::Bool(!on))
            }
            (
                ItemKind::Switch
                | ItemKind::Dimmer
                | ItemKind::Number
                | ItemKind::Rollershutter
                | ItemKind::String,
                Self::Set(v),
            ) => kind.validate(v.clone()).ok(),
            _ => None,
        }
    }

    /// Parse a command typed by a user for an item of `kind`.
    ///
    /// Keywords (`ON`, `toggle`, ...) win when the kind supports them;
    /// otherwise the text is read as a value of the kind's state type.
    pub fn parse(kind: ItemKind, raw: &str) -> Result<Self, CoreError> {
        let raw = raw.trim();
        let keyword = match raw.to_ascii_uppercase().as_str() {
            "ON" => Some(Self::On),
            "OFF" => Some(Self::Off),
            "TOGGLE" => Some(Self::Toggle),
            "INCREASE" => Some(Self::Increase),
            "DECREASE" => Some(Self::Decrease),
            "STOP" => Some(Self::Stop),
            "MOVE" => Some(Self::Move),
            "UP" => Some(Self::Up),
            "DOWN" => Some(Self::Down),
            _ => None,
        };
        if let Some(cmd) = keyword.filter(|c| c.is_supported_by(kind)) {
            return Ok(cmd);
        }

        let mismatch = || CoreError::TypeMismatch {
            item_type: kind,
            expected: kind.expected(),
        };
        match kind {
            ItemKind::Dimmer | ItemKind::Number | ItemKind::Rollershutter => parse_decimal(raw)
                .map(|d| Self::Set(Value::Decimal(d)))
                .map_err(|_| mismatch()),
            ItemKind::Color if raw.contains(',') => raw
                .parse::<Hsb>()
                .map(Self::Hsb)
                .map_err(|_| mismatch()),
            ItemKind::Color => parse_decimal(raw)
                .map(Self::Percent)
                .map_err(|_| mismatch()),
            ItemKind::String | ItemKind::Group => Ok(Self::Set(Value::from(raw))),
            ItemKind::Call => Ok(Self::Call(raw.to_owned())),
            ItemKind::Switch => Err(mismatch()),
            ItemKind::Contact | ItemKind::DateTime | ItemKind::Location => {
                Err(CoreError::Unsupported {
                    operation: "commands".to_owned(),
                    item_type: kind,
                })
            }
        }
    }
}
