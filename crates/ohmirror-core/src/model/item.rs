// ── Items ──
//
// An item is the controllable or observable thing behind a widget.
// Items are shared by name across the whole server: every widget that
// references "Kitchen_Light" points at the same `Item`.

use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use serde_json::Value as Json;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::debug;
use url::Url;

use ohmirror_api::{JsonResponse, RestClient};

use super::color::Hsb;
use super::value::{DATETIME_FORMAT, Value};
use crate::command::ItemCommand;
use crate::convert::{opt_str, parse_decimal};
use crate::error::CoreError;
use crate::observer::Observer;
use crate::store::{ChangeSet, Observed, Tracked, lock};

// ── Item kinds ──────────────────────────────────────────────────────

/// The item types the mirror understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum ItemKind {
    Call,
    Color,
    Contact,
    DateTime,
    Dimmer,
    Group,
    Location,
    Number,
    #[strum(to_string = "Rollershutter", serialize = "RollerShutter")]
    Rollershutter,
    String,
    Switch,
}

impl ItemKind {
    /// Resolve a wire type tag. Accepts `Number:Temperature` style
    /// dimensions and the legacy `SwitchItem` spelling.
    pub fn from_type(raw: &str) -> Option<Self> {
        let base = raw.split(':').next().unwrap_or(raw);
        let base = base.strip_suffix("Item").unwrap_or(base);
        base.parse().ok()
    }

    /// Decode a wire state. `NULL`/`UNDEF` mean "no value".
    pub fn decode(self, raw: &str) -> Result<Option<Value>, CoreError> {
        if matches!(raw, "NULL" | "UNDEF") {
            return Ok(None);
        }
        let ctx = || format!("{self} state");
        let value = match self {
            // Unknown switch states are tolerated as "no value".
            Self::Switch => match raw {
                "ON" => Value::Bool(true),
                "OFF" => Value::Bool(false),
                _ => return Ok(None),
            },
            Self::Contact => {
                if raw.eq_ignore_ascii_case("open") {
                    Value::Bool(true)
                } else if raw.eq_ignore_ascii_case("closed") {
                    Value::Bool(false)
                } else {
                    return Err(CoreError::decode(ctx(), format!("'{raw}' is not OPEN/CLOSED")));
                }
            }
            Self::Dimmer | Self::Rollershutter => {
                Value::Decimal(parse_decimal(raw).map_err(|e| CoreError::decode(ctx(), e))?)
            }
            // Quantity states carry a unit after the number ("22.5 °C").
            Self::Number => {
                let number = raw.split_whitespace().next().unwrap_or(raw);
                Value::Decimal(parse_decimal(number).map_err(|e| CoreError::decode(ctx(), e))?)
            }
            Self::Color => Value::Hsb(raw.parse::<Hsb>().map_err(|e| CoreError::decode(ctx(), e))?),
            Self::DateTime => Value::DateTime(parse_datetime(raw).map_err(|e| CoreError::decode(ctx(), e))?),
            Self::Call | Self::Group | Self::Location | Self::String => Value::Text(raw.to_owned()),
        };
        Ok(Some(value))
    }

    /// Encode a state for the wire. `None` becomes `UNDEF`.
    pub fn encode(self, state: Option<&Value>) -> String {
        match (self, state) {
            (_, None) => "UNDEF".to_owned(),
            (Self::Switch, Some(Value::Bool(b))) => String::from(if *b { "ON" } else { "OFF" }),
            (Self::Contact, Some(Value::Bool(b))) => {
                String::from(if *b { "OPEN" } else { "CLOSED" })
            }
            (_, Some(v)) => v.to_string(),
        }
    }

    /// Check that `candidate` is an acceptable state for this kind.
    /// Integers are widened to decimals for numeric kinds.
    pub fn validate(self, candidate: Value) -> Result<Value, CoreError> {
        match (self, candidate) {
            (Self::Group, v)
            | (Self::Switch | Self::Contact, v @ Value::Bool(_))
            | (Self::Dimmer | Self::Number | Self::Rollershutter, v @ Value::Decimal(_))
            | (Self::Color, v @ Value::Hsb(_))
            | (Self::DateTime, v @ Value::DateTime(_))
            | (Self::Call | Self::Location | Self::String, v @ Value::Text(_)) => Ok(v),
            (Self::Dimmer | Self::Number | Self::Rollershutter, Value::Int(i)) => {
                Ok(Value::Decimal(i.into()))
            }
            (kind, _) => Err(CoreError::TypeMismatch {
                item_type: kind,
                expected: kind.expected(),
            }),
        }
    }

    /// Parse a user-typed state (e.g. from the command line).
    pub fn parse_state(self, raw: &str) -> Result<Value, CoreError> {
        let mismatch = || CoreError::TypeMismatch {
            item_type: self,
            expected: self.expected(),
        };
        match self.decode(raw.trim()) {
            Ok(Some(v)) => Ok(v),
            Ok(None) | Err(CoreError::Decode { .. }) => Err(mismatch()),
            Err(e) => Err(e),
        }
    }

    pub fn expected(self) -> &'static str {
        match self {
            Self::Switch | Self::Contact => "a boolean",
            Self::Dimmer | Self::Number | Self::Rollershutter => "a decimal",
            Self::Color => "an HSB triple",
            Self::DateTime => "a date-time",
            Self::Call | Self::Location | Self::String => "text",
            Self::Group => "any value",
        }
    }
}

/// Parse a wire date-time, dropping fractional seconds and any offset.
fn parse_datetime(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let head = raw.split_once('.').map_or(raw, |(h, _)| h);
    let head = head.get(..19).unwrap_or(head);
    NaiveDateTime::parse_from_str(head, DATETIME_FORMAT)
}

// ── Item entity ─────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct ItemState {
    attrs: ChangeSet,
}

impl Tracked for ItemState {
    fn attrs(&self) -> &ChangeSet {
        &self.attrs
    }
    fn attrs_mut(&mut self) -> &mut ChangeSet {
        &mut self.attrs
    }
}

#[derive(Debug)]
pub struct Item {
    name: String,
    kind: ItemKind,
    type_name: String,
    link: Url,
    client: RestClient,
    tracked: Observed<ItemState>,
    tracking_id: Mutex<Option<String>>,
}

impl Item {
    pub(crate) fn new(
        name: &str,
        kind: ItemKind,
        type_name: &str,
        link: Url,
        client: RestClient,
    ) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            type_name: type_name.to_owned(),
            link,
            client,
            tracked: Observed::new(ItemState {
                attrs: ChangeSet::new("item_"),
            }),
            tracking_id: Mutex::new(None),
        }
    }

    /// Apply an item payload. The state is decoded before anything is
    /// written, so a bad payload leaves the item untouched.
    pub fn init(&self, json: &Json) -> Result<(), CoreError> {
        let state = match json.get("state") {
            None | Some(Json::Null) => None,
            Some(Json::String(s)) => self.kind.decode(s)?,
            Some(other) => self.kind.decode(&other.to_string())?,
        };
        let label = opt_str(json, "label");

        self.tracked.apply(|s| {
            s.attrs.set_opt("state", state);
            if let Some(label) = label {
                s.attrs.set("label", label);
            }
        });
        Ok(())
    }

    // ── Accessors ──

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Type tag as sent by the server (e.g. `Number:Temperature`).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn link(&self) -> &Url {
        &self.link
    }

    pub fn state(&self) -> Option<Value> {
        self.attr("state")
    }

    /// Current state in wire form (`UNDEF` when unset).
    pub fn encoded_state(&self) -> String {
        self.tracked
            .read(|s| self.kind.encode(s.attrs.get("state")))
    }

    pub fn label(&self) -> Option<String> {
        self.attr("label").and_then(|v| v.as_str().map(str::to_owned))
    }

    pub fn attr(&self, key: &str) -> Option<Value> {
        self.tracked.read(|s| s.attrs.get(key).cloned())
    }

    pub fn snapshot(&self) -> indexmap::IndexMap<String, Value> {
        self.tracked.read(|s| s.attrs.snapshot())
    }

    // ── Observers ──

    pub fn subscribe<O: Observer + 'static>(&self, observer: &Arc<O>) {
        self.tracked.subscribe(observer);
    }

    pub(crate) fn subscribe_shared(&self, observer: &Arc<dyn Observer>) {
        self.tracked.subscribe_shared(observer);
    }

    pub fn unsubscribe<O: Observer + ?Sized + 'static>(&self, observer: &Arc<O>) -> bool {
        self.tracked.unsubscribe(observer)
    }

    // ── Commands ──

    /// Send a command. Kinds that model state optimistically update the
    /// local state once the server accepted the command.
    pub async fn execute(&self, command: ItemCommand) -> Result<(), CoreError> {
        let wire = command.to_wire(self.kind)?;
        self.client.send_command(&self.link, &wire).await?;

        self.tracked.apply(|s| {
            if let Some(next) = command.optimistic_state(self.kind, s.attrs.get("state")) {
                s.attrs.set("state", next);
            }
        });
        Ok(())
    }

    pub async fn cmd_on(&self) -> Result<(), CoreError> {
        self.execute(ItemCommand::On).await
    }

    pub async fn cmd_off(&self) -> Result<(), CoreError> {
        self.execute(ItemCommand::Off).await
    }

    pub async fn cmd_toggle(&self) -> Result<(), CoreError> {
        self.execute(ItemCommand::Toggle).await
    }

    pub async fn cmd_increase(&self) -> Result<(), CoreError> {
        self.execute(ItemCommand::Increase).await
    }

    pub async fn cmd_decrease(&self) -> Result<(), CoreError> {
        self.execute(ItemCommand::Decrease).await
    }

    pub async fn cmd_stop(&self) -> Result<(), CoreError> {
        self.execute(ItemCommand::Stop).await
    }

    pub async fn cmd_move(&self) -> Result<(), CoreError> {
        self.execute(ItemCommand::Move).await
    }

    pub async fn cmd_up(&self) -> Result<(), CoreError> {
        self.execute(ItemCommand::Up).await
    }

    pub async fn cmd_down(&self) -> Result<(), CoreError> {
        self.execute(ItemCommand::Down).await
    }

    pub async fn cmd_set(&self, value: impl Into<Value>) -> Result<(), CoreError> {
        self.execute(ItemCommand::Set(value.into())).await
    }

    pub async fn cmd_set_pct(&self, percent: rust_decimal::Decimal) -> Result<(), CoreError> {
        self.execute(ItemCommand::Percent(percent)).await
    }

    pub async fn cmd_set_hsb(&self, color: Hsb) -> Result<(), CoreError> {
        self.execute(ItemCommand::Hsb(color)).await
    }

    pub async fn cmd_call(&self, number: &str) -> Result<(), CoreError> {
        self.execute(ItemCommand::Call(number.to_owned())).await
    }

    /// Set the state directly (sensor-style update). The local state
    /// changes first; the server only hears about actual changes.
    pub async fn set_state(&self, value: impl Into<Value>) -> Result<(), CoreError> {
        if self.kind == ItemKind::Group {
            return Err(CoreError::Unsupported {
                operation: "set_state".to_owned(),
                item_type: self.kind,
            });
        }
        let value = self.kind.validate(value.into())?;
        let wire = self.kind.encode(Some(&value));

        let changed = self.tracked.apply(|s| s.attrs.set("state", value));
        if changed {
            self.client.put_state(&self.link, &wire).await?;
        } else {
            debug!(item = %self.name, "state unchanged, not sending");
        }
        Ok(())
    }

    // ── Refresh ──

    /// Fetch the item again. With `long_poll`, the request blocks until
    /// the server reports a change (or its hold window ends).
    pub async fn refresh(&self, long_poll: bool) -> Result<(), CoreError> {
        let resp = self.fetch(long_poll).await?;
        self.apply_response(&resp)
    }

    pub(crate) async fn fetch(&self, long_poll: bool) -> Result<JsonResponse, CoreError> {
        let resp = if long_poll {
            let tracking = lock(&self.tracking_id).clone();
            self.client.long_poll(&self.link, tracking.as_deref()).await?
        } else {
            self.client.fetch_json(&self.link, None).await?
        };
        Ok(resp)
    }

    /// Payloads without a `state` only advance the tracking id.
    pub(crate) fn apply_response(&self, resp: &JsonResponse) -> Result<(), CoreError> {
        if resp.body.get("state").is_some() {
            self.init(&resp.body)?;
        }
        *lock(&self.tracking_id) = resp.tracking_id().map(str::to_owned);
        Ok(())
    }

    pub fn tracking_id(&self) -> Option<String> {
        lock(&self.tracking_id).clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use serde_json::json;
    use strum::IntoEnumIterator;

    use ohmirror_api::TransportConfig;

    use super::*;
    use crate::observer::RecordingObserver;

    fn item(kind: ItemKind) -> Item {
        Item::new(
            "Test",
            kind,
            kind.as_ref(),
            Url::parse("http://127.0.0.1:1/rest/items/Test").unwrap(),
            RestClient::new(
                Url::parse("http://127.0.0.1:1/").unwrap(),
                &TransportConfig::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn kind_from_type_tags() {
        assert_eq!(ItemKind::from_type("Switch"), Some(ItemKind::Switch));
        assert_eq!(ItemKind::from_type("SwitchItem"), Some(ItemKind::Switch));
        assert_eq!(ItemKind::from_type("Number:Temperature"), Some(ItemKind::Number));
        assert_eq!(ItemKind::from_type("Rollershutter"), Some(ItemKind::Rollershutter));
        assert_eq!(ItemKind::from_type("RollerShutter"), Some(ItemKind::Rollershutter));
        assert_eq!(ItemKind::from_type("Player"), None);
        assert_eq!(ItemKind::Rollershutter.to_string(), "Rollershutter");
    }

    #[test]
    fn sentinels_decode_to_none_everywhere() {
        for kind in ItemKind::iter() {
            assert_eq!(kind.decode("NULL").unwrap(), None, "{kind}");
            assert_eq!(kind.decode("UNDEF").unwrap(), None, "{kind}");
            assert_eq!(kind.encode(None), "UNDEF");
        }
    }

    #[test]
    fn number_decodes_exactly() {
        let v = ItemKind::Number.decode("22.5").unwrap().unwrap();
        assert_eq!(v, Value::Decimal(Decimal::from_str("22.5").unwrap()));
        assert_eq!(ItemKind::Number.encode(Some(&v)), "22.5");

        let with_unit = ItemKind::Number.decode("21.25 °C").unwrap().unwrap();
        assert_eq!(with_unit.to_string(), "21.25");
        assert!(ItemKind::Dimmer.decode("bright").is_err());
    }

    #[test]
    fn switch_is_lenient_contact_is_not() {
        assert_eq!(ItemKind::Switch.decode("ON").unwrap(), Some(Value::Bool(true)));
        assert_eq!(ItemKind::Switch.decode("OFF").unwrap(), Some(Value::Bool(false)));
        // documented leniency: unknown switch strings become "no value"
        assert_eq!(ItemKind::Switch.decode("DIM").unwrap(), None);

        assert_eq!(ItemKind::Contact.decode("OPEN").unwrap(), Some(Value::Bool(true)));
        assert_eq!(ItemKind::Contact.decode("closed").unwrap(), Some(Value::Bool(false)));
        assert!(ItemKind::Contact.decode("AJAR").is_err());
        assert_eq!(ItemKind::Contact.encode(Some(&Value::Bool(false))), "CLOSED");
    }

    #[test]
    fn round_trips_per_kind() {
        let cases = [
            (ItemKind::Switch, "ON"),
            (ItemKind::Contact, "OPEN"),
            (ItemKind::Dimmer, "42"),
            (ItemKind::Rollershutter, "0.5"),
            (ItemKind::Color, "240,100,50.5"),
            (ItemKind::DateTime, "2024-03-01T07:30:00"),
            (ItemKind::String, "hello"),
            (ItemKind::Location, "52.5,13.4,34"),
            (ItemKind::Call, "+4912345"),
            (ItemKind::Group, "ON"),
        ];
        for (kind, wire) in cases {
            let decoded = kind.decode(wire).unwrap();
            assert_eq!(kind.encode(decoded.as_ref()), wire, "{kind}");
        }
    }

    #[test]
    fn datetime_drops_fraction_and_offset() {
        let v = ItemKind::DateTime
            .decode("2024-03-01T07:30:00.123+0100")
            .unwrap()
            .unwrap();
        assert_eq!(ItemKind::DateTime.encode(Some(&v)), "2024-03-01T07:30:00");
        let v = ItemKind::DateTime.decode("2024-03-01T07:30:00+0100").unwrap().unwrap();
        assert_eq!(v.to_string(), "2024-03-01T07:30:00");
        assert!(ItemKind::DateTime.decode("yesterday").is_err());
    }

    #[test]
    fn validate_rejects_wrong_types() {
        assert!(ItemKind::Switch.validate(Value::from("ON")).is_err());
        assert_eq!(
            ItemKind::Dimmer.validate(Value::Int(50)).unwrap(),
            Value::Decimal(Decimal::from(50))
        );
        assert!(matches!(
            ItemKind::Number.validate(Value::Bool(true)),
            Err(CoreError::TypeMismatch { item_type: ItemKind::Number, .. })
        ));
        assert!(ItemKind::Group.validate(Value::Bool(true)).is_ok());
    }

    #[test]
    fn parse_state_maps_undecodable_to_mismatch() {
        assert_eq!(ItemKind::Switch.parse_state("ON").unwrap(), Value::Bool(true));
        assert!(matches!(
            ItemKind::Switch.parse_state("maybe"),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ItemKind::Number.parse_state("warm"),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn init_notifies_and_bad_payload_leaves_state() {
        let it = item(ItemKind::Number);
        it.init(&json!({"state": "20"})).unwrap();
        let rec = RecordingObserver::new();
        it.subscribe(&rec);

        assert!(it.init(&json!({"state": "hot"})).is_err());
        assert_eq!(it.state(), Some(Value::Decimal(Decimal::from(20))));
        assert_eq!(rec.count(), 1);

        it.init(&json!({"state": "NULL"})).unwrap();
        let updates = rec.updates();
        assert!(updates[1].1.contains("item_state"));
        assert_eq!(it.encoded_state(), "UNDEF");
    }

    #[tokio::test]
    async fn validation_failure_sends_nothing() {
        // The link points at a closed port: reaching the network would
        // produce a connection error instead of a type mismatch.
        let it = item(ItemKind::Switch);
        let err = it.set_state("ON").await.unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
        let err = it.execute(ItemCommand::Stop).await.unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { .. }));
        assert_eq!(it.state(), None);
    }

    #[tokio::test]
    async fn group_set_state_is_unsupported() {
        let it = item(ItemKind::Group);
        assert!(matches!(
            it.set_state("x").await,
            Err(CoreError::Unsupported { .. })
        ));
    }
}
