//! Model name → upstream platform/action resolution.

use std::collections::HashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use crate::error::GatewayError;

pub const CHANNEL_TYPE_ALI: u32 = 17;
pub const CHANNEL_TYPE_GEMINI: u32 = 24;
pub const CHANNEL_TYPE_MINIMAX: u32 = 35;
pub const CHANNEL_TYPE_VERTEX_AI: u32 = 41;
pub const CHANNEL_TYPE_KLING: u32 = 50;
pub const CHANNEL_TYPE_JIMENG: u32 = 51;
pub const CHANNEL_TYPE_VIDU: u32 = 52;
pub const CHANNEL_TYPE_DOUBAO_VIDEO: u32 = 54;
pub const CHANNEL_TYPE_SORA: u32 = 55;

pub const PLATFORM_SUNO: &str = "suno";

pub const ACTION_GENERATE: &str = "generate";
pub const ACTION_TEXT_GENERATE: &str = "textGenerate";
pub const ACTION_SUNO_MUSIC: &str = "MUSIC";
pub const ACTION_SUNO_LYRICS: &str = "LYRICS";

/// A registered entry. Either `platform` or `channel_type` identifies the upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
  pub platform: Option<String>,
  pub action: String,
  pub channel_type: u32,
}

impl RouteEntry {
  pub fn channel(channel_type: u32, action: &str) -> Self {
    Self { platform: None, action: action.to_string(), channel_type }
  }

  pub fn platform(platform: &str, action: &str) -> Self {
    Self { platform: Some(platform.to_string()), action: action.to_string(), channel_type: 0 }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
  pub platform: String,
  pub action: String,
  pub channel_type: u32,
}

/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RoutingTable {
  entries: HashMap<String, RouteEntry>,
}

impl RoutingTable {
  pub fn new(entries: impl IntoIterator<Item = (String, RouteEntry)>) -> Self {
    Self { entries: entries.into_iter().collect() }
  }

  pub fn resolve(&self, model: &str) -> Result<Route, GatewayError> {
    let entry = self.entries
      .get(model)
      .ok_or_else(|| GatewayError::UnsupportedModel(model.to_string()))?;
    let platform = match &entry.platform {
      Some(p) if !p.is_empty() => p.clone(),
      _ => entry.channel_type.to_string(),
    };
    Ok(Route {
      platform,
      action: entry.action.clone(),
      channel_type: entry.channel_type,
    })
  }

  /// Every routable model name, in no particular order.
  pub fn supported_models(&self) -> Vec<String> {
    self.entries.keys().cloned().collect()
  }

  /// Confirms the model is routable and hands the input through untouched.
  pub fn admit_input(&self, model: &str, input: Option<Map<String, Value>>) -> Result<Map<String, Value>, GatewayError> {
    self.resolve(model)?;
    Ok(input.unwrap_or_default())
  }
}

impl Default for RoutingTable {
  fn default() -> Self {
    let channel = |model: &str, ct: u32, action: &str| (model.to_string(), RouteEntry::channel(ct, action));
    Self::new([
      channel("sora-2-pro-text-to-video", CHANNEL_TYPE_SORA, ACTION_GENERATE),
      channel("sora-2-text-to-video", CHANNEL_TYPE_SORA, ACTION_GENERATE),
      channel("kling-v1", CHANNEL_TYPE_KLING, ACTION_TEXT_GENERATE),
      channel("kling-v1-6", CHANNEL_TYPE_KLING, ACTION_TEXT_GENERATE),
      channel("kling-v2-master", CHANNEL_TYPE_KLING, ACTION_TEXT_GENERATE),
      ("suno_music".to_string(), RouteEntry::platform(PLATFORM_SUNO, ACTION_SUNO_MUSIC)),
      ("suno_lyrics".to_string(), RouteEntry::platform(PLATFORM_SUNO, ACTION_SUNO_LYRICS)),
      channel("cogvideox-text-to-video", CHANNEL_TYPE_ALI, ACTION_TEXT_GENERATE),
      channel("cogvideox-image-to-video", CHANNEL_TYPE_ALI, ACTION_GENERATE),
      channel("gemini-2.0-flash-exp", CHANNEL_TYPE_GEMINI, ACTION_TEXT_GENERATE),
      channel("gemini-exp-1206", CHANNEL_TYPE_GEMINI, ACTION_TEXT_GENERATE),
      channel("gemini-2.0-flash-thinking-exp", CHANNEL_TYPE_GEMINI, ACTION_TEXT_GENERATE),
      channel("hailuo-v1", CHANNEL_TYPE_MINIMAX, ACTION_TEXT_GENERATE),
      channel("minimax-video", CHANNEL_TYPE_MINIMAX, ACTION_TEXT_GENERATE),
      channel("vidu-1", CHANNEL_TYPE_VIDU, ACTION_TEXT_GENERATE),
      channel("vidu-1-stable", CHANNEL_TYPE_VIDU, ACTION_TEXT_GENERATE),
      channel("doubao-video-pro", CHANNEL_TYPE_DOUBAO_VIDEO, ACTION_TEXT_GENERATE),
      channel("doubao-video-lite", CHANNEL_TYPE_DOUBAO_VIDEO, ACTION_TEXT_GENERATE),
      channel("doubao-video-turbo", CHANNEL_TYPE_DOUBAO_VIDEO, ACTION_TEXT_GENERATE),
      channel("jimeng-v2", CHANNEL_TYPE_JIMENG, ACTION_TEXT_GENERATE),
      channel("jimeng-1.5-pro", CHANNEL_TYPE_JIMENG, ACTION_TEXT_GENERATE),
      channel("vertex-imagen-3", CHANNEL_TYPE_VERTEX_AI, ACTION_TEXT_GENERATE),
    ])
  }
}
