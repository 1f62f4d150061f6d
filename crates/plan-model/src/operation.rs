//! Edit operations: the closed set of actions an edit plan may contain.
//!
//! On the wire each operation is `{id, action, start, end?, params, z_order?}`
//! with `params` shaped by `action`. Here the action and its params are a
//! single tagged enum so every consumer matches exhaustively.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::easing::Easing;
use crate::error::PlanError;
use crate::geometry::{PixelPoint, PixelRect, Rgb};

/// Operation identifier as declared by the planner (numbers are stringified).
pub type OpId = String;

/// Default on-screen duration for a zoom without `end` (seconds).
pub const DEFAULT_ZOOM_SECS: f64 = 0.5;
/// Default on-screen duration for a highlight without `end` (seconds).
pub const DEFAULT_HIGHLIGHT_SECS: f64 = 1.0;
/// Default on-screen duration for a caption without `end` (seconds).
pub const DEFAULT_TEXT_SECS: f64 = 2.0;
/// Fixed ripple animation length (seconds).
pub const DEFAULT_RIPPLE_SECS: f64 = 0.4;

/// Discriminant of an [`EditAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Cut,
    Speed,
    Zoom,
    Highlight,
    ClickEffect,
    Text,
    Transition,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::Cut,
        OperationKind::Speed,
        OperationKind::Zoom,
        OperationKind::Highlight,
        OperationKind::ClickEffect,
        OperationKind::Text,
        OperationKind::Transition,
    ];

    pub fn parse(action: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == action)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Cut => "cut",
            OperationKind::Speed => "speed",
            OperationKind::Zoom => "zoom",
            OperationKind::Highlight => "highlight",
            OperationKind::ClickEffect => "click_effect",
            OperationKind::Text => "text",
            OperationKind::Transition => "transition",
        }
    }

    /// Cut and speed partition or modulate the base timeline.
    pub fn is_temporal(self) -> bool {
        matches!(self, OperationKind::Cut | OperationKind::Speed)
    }

    /// Layered visual effects clipped to the segments they intersect.
    pub fn is_overlay(self) -> bool {
        matches!(
            self,
            OperationKind::Zoom
                | OperationKind::Highlight
                | OperationKind::ClickEffect
                | OperationKind::Text
        )
    }
}

/// Remove a source range from the output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutParams {
    /// Planner's note of the removed duration (informational).
    pub duration: Option<f64>,
    pub reason: Option<String>,
}

/// Play a source range faster or slower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedParams {
    #[serde(alias = "factor", alias = "speed")]
    pub speed_multiplier: f64,
    pub reason: Option<String>,
}

impl Default for SpeedParams {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            reason: None,
        }
    }
}

/// Animated crop toward a target box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomParams {
    /// Region to zoom toward; frame center when absent.
    pub target_bbox: Option<PixelRect>,
    /// Magnification at full zoom (1.0 = none).
    pub zoom_scale: f64,
    /// Easing for the zoom-in and zoom-out ramps.
    pub animation: Easing,
    /// Length of each ramp in seconds.
    pub ramp_secs: f64,
}

impl Default for ZoomParams {
    fn default() -> Self {
        Self {
            target_bbox: None,
            zoom_scale: 1.3,
            animation: Easing::EaseInOut,
            ramp_secs: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightStyle {
    #[default]
    Glow,
    Outline,
}

/// Glow drawn around a target box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightParams {
    pub bbox: Option<PixelRect>,
    pub effect: HighlightStyle,
    pub color: String,
    /// Peak opacity in `[0, 1]`.
    pub intensity: f64,
    /// Fade-in and fade-out length in seconds.
    pub ramp_secs: f64,
}

impl Default for HighlightParams {
    fn default() -> Self {
        Self {
            bbox: None,
            effect: HighlightStyle::Glow,
            color: "#4A90E2".to_string(),
            intensity: 0.8,
            ramp_secs: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickStyle {
    #[default]
    Ripple,
}

/// Expanding ripple at a click position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickEffectParams {
    pub position: Option<PixelPoint>,
    pub effect_type: ClickStyle,
    /// Animation length in seconds.
    pub duration: f64,
    /// Radius reached at the end of the animation, in source pixels.
    pub max_radius: f64,
}

impl Default for ClickEffectParams {
    fn default() -> Self {
        Self {
            position: None,
            effect_type: ClickStyle::Ripple,
            duration: DEFAULT_RIPPLE_SECS,
            max_radius: 30.0,
        }
    }
}

/// Caption burned in at a fixed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextParams {
    pub text: String,
    /// Anchor in source pixels; bottom center of the viewport when absent.
    pub position: Option<PixelPoint>,
    pub font_size: u32,
    pub color: String,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            text: String::new(),
            position: None,
            font_size: 36,
            color: "#FFFFFF".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    #[default]
    Crossfade,
}

/// Crossfade between the two kept segments meeting at `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionParams {
    /// Overlap consumed from both neighbors, in output seconds.
    pub duration: f64,
    pub style: TransitionStyle,
}

impl Default for TransitionParams {
    fn default() -> Self {
        Self {
            duration: 0.5,
            style: TransitionStyle::Crossfade,
        }
    }
}

/// An action with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum EditAction {
    Cut(CutParams),
    Speed(SpeedParams),
    Zoom(ZoomParams),
    Highlight(HighlightParams),
    ClickEffect(ClickEffectParams),
    Text(TextParams),
    Transition(TransitionParams),
}

impl EditAction {
    pub fn kind(&self) -> OperationKind {
        match self {
            EditAction::Cut(_) => OperationKind::Cut,
            EditAction::Speed(_) => OperationKind::Speed,
            EditAction::Zoom(_) => OperationKind::Zoom,
            EditAction::Highlight(_) => OperationKind::Highlight,
            EditAction::ClickEffect(_) => OperationKind::ClickEffect,
            EditAction::Text(_) => OperationKind::Text,
            EditAction::Transition(_) => OperationKind::Transition,
        }
    }
}

/// A validated edit operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditOperation {
    pub id: OpId,
    /// Position in the plan; later-declared operations win same-kind ties.
    #[serde(skip)]
    pub index: usize,
    pub start: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_order: Option<i32>,
    #[serde(flatten)]
    pub action: EditAction,
}

/// An operation as it appears on the wire, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOperation {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub start: Option<Value>,
    #[serde(default)]
    pub end: Option<Value>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub z_order: Option<i32>,
}

impl EditOperation {
    pub fn kind(&self) -> OperationKind {
        self.action.kind()
    }

    /// Validate field presence and per-kind params.
    ///
    /// Range checks against the source duration happen later, when the
    /// timeline is built.
    pub fn from_raw(index: usize, raw: RawOperation) -> Result<Self, PlanError> {
        let id = match &raw.id {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Null) | None => index.to_string(),
            Some(other) => {
                return Err(PlanError::validation(
                    index.to_string(),
                    format!("id must be a string or number, got {other}"),
                ))
            }
        };

        let action_name = raw
            .action
            .as_deref()
            .ok_or_else(|| PlanError::validation(&id, "missing field `action`"))?;
        let kind = OperationKind::parse(action_name)
            .ok_or_else(|| PlanError::validation(&id, format!("unknown action `{action_name}`")))?;

        let start = match &raw.start {
            None | Some(Value::Null) => {
                return Err(PlanError::validation(&id, "missing field `start`"))
            }
            Some(v) => time_value(&id, "start", v)?,
        };
        if start < 0.0 {
            return Err(PlanError::validation(
                &id,
                format!("start must be >= 0, got {start}"),
            ));
        }

        let end = match &raw.end {
            None | Some(Value::Null) => None,
            Some(v) => Some(time_value(&id, "end", v)?),
        };
        if let Some(end) = end {
            if end <= start {
                return Err(PlanError::validation(
                    &id,
                    format!("end ({end}) must be greater than start ({start})"),
                ));
            }
        }

        let params = match raw.params {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(v) => v,
        };
        let action = parse_action(&id, kind, params)?;

        Ok(Self {
            id,
            index,
            start,
            end,
            z_order: raw.z_order,
            action,
        })
    }

    /// End of the operation in source time, with per-kind defaults applied.
    ///
    /// Cuts and speed changes without `end` run to the end of the source.
    /// Overlays without `end` get a kind-specific duration, clamped to the source.
    /// Transitions are instantaneous markers.
    pub fn resolved_end(&self, source_duration: f64) -> f64 {
        match &self.action {
            EditAction::Cut(_) | EditAction::Speed(_) => self.end.unwrap_or(source_duration),
            EditAction::Transition(_) => self.start,
            EditAction::Zoom(_) => self
                .end
                .unwrap_or((self.start + DEFAULT_ZOOM_SECS).min(source_duration)),
            EditAction::Highlight(_) => self
                .end
                .unwrap_or((self.start + DEFAULT_HIGHLIGHT_SECS).min(source_duration)),
            EditAction::ClickEffect(p) => self
                .end
                .unwrap_or((self.start + p.duration).min(source_duration)),
            EditAction::Text(_) => self
                .end
                .unwrap_or((self.start + DEFAULT_TEXT_SECS).min(source_duration)),
        }
    }
}

fn time_value(id: &str, field: &str, value: &Value) -> Result<f64, PlanError> {
    let secs = value
        .as_f64()
        .ok_or_else(|| PlanError::validation(id, format!("`{field}` must be a number")))?;
    if !secs.is_finite() {
        return Err(PlanError::validation(id, format!("`{field}` must be finite")));
    }
    Ok(secs)
}

fn decode<T: serde::de::DeserializeOwned>(
    id: &str,
    kind: OperationKind,
    params: Value,
) -> Result<T, PlanError> {
    serde_json::from_value(params).map_err(|e| {
        PlanError::validation(id, format!("invalid {} params: {e}", kind.as_str()))
    })
}

fn require(id: &str, ok: bool, msg: impl Into<String>) -> Result<(), PlanError> {
    if ok {
        Ok(())
    } else {
        Err(PlanError::validation(id, msg))
    }
}

fn parse_action(id: &str, kind: OperationKind, params: Value) -> Result<EditAction, PlanError> {
    let action = match kind {
        OperationKind::Cut => EditAction::Cut(decode(id, kind, params)?),
        OperationKind::Speed => {
            let p: SpeedParams = decode(id, kind, params)?;
            require(
                id,
                p.speed_multiplier.is_finite() && p.speed_multiplier > 0.0,
                format!("speed_multiplier must be > 0, got {}", p.speed_multiplier),
            )?;
            EditAction::Speed(p)
        }
        OperationKind::Zoom => {
            let p: ZoomParams = decode(id, kind, params)?;
            require(
                id,
                p.zoom_scale.is_finite() && p.zoom_scale >= 1.0,
                format!("zoom_scale must be >= 1.0, got {}", p.zoom_scale),
            )?;
            require(
                id,
                p.ramp_secs.is_finite() && p.ramp_secs >= 0.0,
                "ramp_secs must be >= 0",
            )?;
            if let Some(bbox) = &p.target_bbox {
                require(id, bbox.is_valid(), "target_bbox must satisfy x1 < x2, y1 < y2")?;
            }
            EditAction::Zoom(p)
        }
        OperationKind::Highlight => {
            let p: HighlightParams = decode(id, kind, params)?;
            match &p.bbox {
                Some(bbox) => {
                    require(id, bbox.is_valid(), "bbox must satisfy x1 < x2, y1 < y2")?
                }
                None => return Err(PlanError::validation(id, "highlight requires `bbox`")),
            }
            require(
                id,
                (0.0..=1.0).contains(&p.intensity),
                format!("intensity must be within [0, 1], got {}", p.intensity),
            )?;
            require(
                id,
                p.ramp_secs.is_finite() && p.ramp_secs >= 0.0,
                "ramp_secs must be >= 0",
            )?;
            require(
                id,
                Rgb::parse_hex(&p.color).is_some(),
                format!("color must be #RRGGBB, got `{}`", p.color),
            )?;
            EditAction::Highlight(p)
        }
        OperationKind::ClickEffect => {
            let p: ClickEffectParams = decode(id, kind, params)?;
            match &p.position {
                Some(pos) => require(id, pos.is_finite(), "position must be finite")?,
                None => return Err(PlanError::validation(id, "click_effect requires `position`")),
            }
            require(
                id,
                p.duration.is_finite() && p.duration > 0.0,
                "duration must be > 0",
            )?;
            require(
                id,
                p.max_radius.is_finite() && p.max_radius > 0.0,
                "max_radius must be > 0",
            )?;
            EditAction::ClickEffect(p)
        }
        OperationKind::Text => {
            let p: TextParams = decode(id, kind, params)?;
            require(id, !p.text.trim().is_empty(), "text must not be empty")?;
            require(id, p.font_size > 0, "font_size must be > 0")?;
            if let Some(pos) = &p.position {
                require(id, pos.is_finite(), "position must be finite")?;
            }
            require(
                id,
                Rgb::parse_hex(&p.color).is_some(),
                format!("color must be #RRGGBB, got `{}`", p.color),
            )?;
            EditAction::Text(p)
        }
        OperationKind::Transition => {
            let p: TransitionParams = decode(id, kind, params)?;
            require(
                id,
                p.duration.is_finite() && p.duration > 0.0,
                format!("transition duration must be > 0, got {}", p.duration),
            )?;
            EditAction::Transition(p)
        }
    };
    Ok(action)
}
