//! Ephemeral view state behind the HUD panels: conversation log,
//! status gauges, grounding sources and the active media artifact.

use std::time::{SystemTime, UNIX_EPOCH};

use jarvis_realtime::types::GroundingSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One role-tagged line in the append-only conversation log. Entries
/// are never mutated; the only removal is clearing `in_progress`
/// placeholders once their final result arrives.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub text: String,
    pub timestamp_ms: u64,
    pub in_progress: bool,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The eight aspect ratios the image capability accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "2:3")]
    TwoByThree,
    #[serde(rename = "3:2")]
    ThreeByTwo,
    #[serde(rename = "3:4")]
    ThreeByFour,
    #[serde(rename = "4:3")]
    FourByThree,
    #[serde(rename = "9:16")]
    NineBySixteen,
    #[serde(rename = "16:9")]
    SixteenByNine,
    #[serde(rename = "21:9")]
    UltraWide,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 8] = [
        AspectRatio::Square,
        AspectRatio::TwoByThree,
        AspectRatio::ThreeByTwo,
        AspectRatio::ThreeByFour,
        AspectRatio::FourByThree,
        AspectRatio::NineBySixteen,
        AspectRatio::SixteenByNine,
        AspectRatio::UltraWide,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::TwoByThree => "2:3",
            AspectRatio::ThreeByTwo => "3:2",
            AspectRatio::ThreeByFour => "3:4",
            AspectRatio::FourByThree => "4:3",
            AspectRatio::NineBySixteen => "9:16",
            AspectRatio::SixteenByNine => "16:9",
            AspectRatio::UltraWide => "21:9",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.as_str() == s)
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio::SixteenByNine
    }
}

/// The active visual artifact produced by the image capability.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeneratedMedia {
    pub mime_type: String,
    /// Base64 payload as returned by the capability.
    pub data: String,
    pub prompt: String,
}

/// Status gauges rendered in the HUD side panel.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub online: bool,
    pub cpu: u8,
    pub memory: u8,
    pub tools: Vec<String>,
    seed: u64,
}

impl SystemStatus {
    pub fn new() -> Self {
        Self {
            online: false,
            cpu: 0,
            memory: 0,
            tools: vec![
                "PRO_THINK".to_string(),
                "VEO_ANIMATE".to_string(),
                "LIVE_VOICE".to_string(),
                "TTS_SYNC".to_string(),
                "FAST_LITE".to_string(),
            ],
            seed: 0x9e3779b97f4a7c15,
        }
    }

    /// Advances the pseudo-random cpu/memory gauges one tick. Pure
    /// cosmetics; xorshift keeps it dependency-free and deterministic
    /// per seed.
    pub fn tick(&mut self) {
        self.seed ^= self.seed << 13;
        self.seed ^= self.seed >> 7;
        self.seed ^= self.seed << 17;
        self.cpu = 5 + (self.seed % 15) as u8;
        self.memory = 20 + ((self.seed >> 8) % 5) as u8;
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct HudState {
    logs: Vec<ConversationEntry>,
    grounding_sources: Vec<GroundingSource>,
    active_media: Option<GeneratedMedia>,
    pub selected_ratio: AspectRatio,
    pub status: SystemStatus,
}

impl HudState {
    pub fn new() -> Self {
        Self {
            logs: Vec::new(),
            grounding_sources: Vec::new(),
            active_media: None,
            selected_ratio: AspectRatio::default(),
            status: SystemStatus::new(),
        }
    }

    pub fn push_log(&mut self, role: Role, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("[{:?}] {}", role, text);
        self.logs.push(ConversationEntry {
            role,
            text,
            timestamp_ms: now_ms(),
            in_progress: false,
        });
    }

    /// Appends a transient "thinking" placeholder.
    pub fn push_placeholder(&mut self) {
        self.logs.push(ConversationEntry {
            role: Role::Assistant,
            text: "Thinking...".to_string(),
            timestamp_ms: now_ms(),
            in_progress: true,
        });
    }

    /// Clears any in-progress placeholder and appends the final entry.
    pub fn resolve_placeholder(&mut self, role: Role, text: impl Into<String>) {
        self.logs.retain(|entry| !entry.in_progress);
        self.push_log(role, text);
    }

    pub fn logs(&self) -> &[ConversationEntry] {
        &self.logs
    }

    pub fn last_log(&self) -> Option<&ConversationEntry> {
        self.logs.last()
    }

    pub fn set_grounding_sources(&mut self, sources: Vec<GroundingSource>) {
        self.grounding_sources = sources;
    }

    pub fn grounding_sources(&self) -> &[GroundingSource] {
        &self.grounding_sources
    }

    pub fn set_active_media(&mut self, media: GeneratedMedia) {
        self.active_media = Some(media);
    }

    pub fn clear_active_media(&mut self) {
        self.active_media = None;
    }

    pub fn active_media(&self) -> Option<&GeneratedMedia> {
        self.active_media.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_resolution_keeps_log_additive() {
        let mut hud = HudState::new();
        hud.push_log(Role::User, "hello");
        hud.push_placeholder();
        assert_eq!(hud.logs().len(), 2);
        assert!(hud.logs()[1].in_progress);

        hud.resolve_placeholder(Role::Assistant, "At your service.");
        assert_eq!(hud.logs().len(), 2);
        assert_eq!(hud.logs()[0].text, "hello");
        assert_eq!(hud.logs()[1].text, "At your service.");
        assert!(!hud.logs()[1].in_progress);
    }

    #[test]
    fn aspect_ratio_parse_round_trips() {
        for ratio in AspectRatio::ALL {
            assert_eq!(AspectRatio::parse(ratio.as_str()), Some(ratio));
        }
        assert_eq!(AspectRatio::parse("5:4"), None);
        assert_eq!(AspectRatio::default().as_str(), "16:9");
    }

    #[test]
    fn status_tick_stays_in_gauge_range() {
        let mut status = SystemStatus::new();
        for _ in 0..100 {
            status.tick();
            assert!((5..20).contains(&status.cpu));
            assert!((20..25).contains(&status.memory));
        }
    }
}
