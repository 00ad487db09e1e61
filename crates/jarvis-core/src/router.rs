//! Routes a single text command to the capability it needs: vision
//! analysis, image generation, or tiered chat. First match wins, and
//! classification is a pure function of the input text.

use crate::capability::{Capability, ModelTier};
use crate::hud::{HudState, Role};

pub const MISSING_ATTACHMENT_MSG: &str = "Sir, please upload a visual node for analysis.";
pub const VISION_START_MSG: &str = "Initiating optical recognition protocols...";
pub const CHAT_FAULT_MSG: &str = "Neural link failure.";
pub const ANALYSIS_FALLBACK_MSG: &str = "Analysis inconclusive, Sir.";

/// A file selected for the vision path.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Classification policy. The complexity threshold and cue lists are
/// configuration, not behavior baked into the router.
#[derive(Debug, Clone)]
pub struct RouterPolicy {
    pub complexity_threshold: usize,
    pub interrogative_cues: Vec<String>,
    pub vision_cues: Vec<String>,
    pub image_cues: Vec<String>,
}

impl Default for RouterPolicy {
    fn default() -> Self {
        Self {
            complexity_threshold: 50,
            interrogative_cues: vec![
                "?".to_string(),
                "calculate".to_string(),
                "why".to_string(),
            ],
            vision_cues: vec!["analyze".to_string(), "what is in this".to_string()],
            image_cues: vec!["generate image".to_string(), "create image".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Vision,
    Image,
    Chat(ModelTier),
}

/// What the caller still has to do after a dispatch: forward a chat
/// reply to the speech-synthesis path.
#[derive(Debug, Default)]
pub struct RouteReport {
    pub speak: Option<String>,
}

pub struct Router {
    policy: RouterPolicy,
}

impl Router {
    pub fn new(policy: RouterPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RouterPolicy {
        &self.policy
    }

    /// Pure classification, re-evaluated independently per command.
    pub fn classify(&self, command: &str) -> Route {
        let lower = command.to_lowercase();
        if self.policy.vision_cues.iter().any(|cue| lower.contains(cue)) {
            return Route::Vision;
        }
        if self.policy.image_cues.iter().any(|cue| lower.contains(cue)) {
            return Route::Image;
        }
        let complex = command.len() > self.policy.complexity_threshold
            || self
                .policy
                .interrogative_cues
                .iter()
                .any(|cue| lower.contains(cue));
        if complex {
            Route::Chat(ModelTier::Deep)
        } else {
            Route::Chat(ModelTier::Fast)
        }
    }

    /// Dispatches one command. Side effects are strictly additive to
    /// the conversation log; only a matching in-progress placeholder is
    /// ever cleared.
    pub async fn dispatch(
        &self,
        command: &str,
        attachment: Option<&Attachment>,
        capability: &dyn Capability,
        hud: &mut HudState,
    ) -> RouteReport {
        match self.classify(command) {
            Route::Vision => self.dispatch_vision(command, attachment, capability, hud).await,
            Route::Image => self.dispatch_image(command, capability, hud).await,
            Route::Chat(tier) => self.dispatch_chat(command, tier, capability, hud).await,
        }
    }

    async fn dispatch_vision(
        &self,
        command: &str,
        attachment: Option<&Attachment>,
        capability: &dyn Capability,
        hud: &mut HudState,
    ) -> RouteReport {
        let Some(file) = attachment else {
            // Input error: no capability call is attempted.
            hud.push_log(Role::System, MISSING_ATTACHMENT_MSG);
            return RouteReport::default();
        };

        hud.push_log(Role::System, VISION_START_MSG);
        hud.push_placeholder();
        match capability
            .analyze_image(&file.bytes, &file.mime_type, command)
            .await
        {
            Ok(description) => {
                let text = if description.trim().is_empty() {
                    ANALYSIS_FALLBACK_MSG.to_string()
                } else {
                    description
                };
                hud.resolve_placeholder(Role::Assistant, text);
            }
            Err(e) => {
                hud.resolve_placeholder(Role::System, format!("Vision error: {}", e));
            }
        }
        RouteReport::default()
    }

    async fn dispatch_image(
        &self,
        command: &str,
        capability: &dyn Capability,
        hud: &mut HudState,
    ) -> RouteReport {
        let ratio = hud.selected_ratio;
        match capability.generate_image(command, ratio).await {
            Ok(media) => {
                hud.set_active_media(media);
                hud.push_log(Role::System, "Visual manifest rendered.");
            }
            Err(e) => {
                // Any previous artifact stays untouched.
                hud.push_log(Role::System, format!("Gen-Image error: {}", e));
            }
        }
        RouteReport::default()
    }

    async fn dispatch_chat(
        &self,
        command: &str,
        tier: ModelTier,
        capability: &dyn Capability,
        hud: &mut HudState,
    ) -> RouteReport {
        hud.push_placeholder();
        match capability.generate_text(command, tier).await {
            Ok(text) => {
                hud.resolve_placeholder(Role::Assistant, text.clone());
                RouteReport { speak: Some(text) }
            }
            Err(e) => {
                tracing::error!("chat capability failed: {:?}", e);
                hud.resolve_placeholder(Role::System, CHAT_FAULT_MSG);
                RouteReport::default()
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::MockCapability;
    use crate::hud::GeneratedMedia;

    fn router() -> Router {
        Router::default()
    }

    #[test]
    fn short_plain_commands_take_the_fast_tier() {
        assert_eq!(
            router().classify("turn on the lights"),
            Route::Chat(ModelTier::Fast)
        );
    }

    #[test]
    fn interrogative_cues_select_the_deep_tier() {
        let r = router();
        assert_eq!(r.classify("what time is it?"), Route::Chat(ModelTier::Deep));
        assert_eq!(
            r.classify("calculate the escape velocity"),
            Route::Chat(ModelTier::Deep)
        );
        assert_eq!(
            r.classify("why do markets crash"),
            Route::Chat(ModelTier::Deep)
        );
    }

    #[test]
    fn long_commands_select_the_deep_tier() {
        let long = "summarize the quarterly engineering report and highlight risks";
        assert!(long.len() > RouterPolicy::default().complexity_threshold);
        assert_eq!(router().classify(long), Route::Chat(ModelTier::Deep));
    }

    #[test]
    fn cue_phrases_pick_vision_and_image_paths_first() {
        let r = router();
        assert_eq!(r.classify("analyze this schematic?"), Route::Vision);
        assert_eq!(r.classify("What is in this photo"), Route::Vision);
        assert_eq!(r.classify("generate image of a red sunset"), Route::Image);
        assert_eq!(r.classify("please Create Image of a castle"), Route::Image);
    }

    #[test]
    fn threshold_is_policy_not_constant() {
        let mut policy = RouterPolicy::default();
        policy.complexity_threshold = 5;
        let r = Router::new(policy);
        assert_eq!(r.classify("turn off"), Route::Chat(ModelTier::Deep));
    }

    #[tokio::test]
    async fn vision_without_attachment_makes_no_capability_call() {
        let mut capability = MockCapability::new();
        capability.expect_analyze_image().times(0);

        let mut hud = HudState::new();
        let report = router()
            .dispatch("analyze the blueprint", None, &capability, &mut hud)
            .await;

        assert!(report.speak.is_none());
        assert_eq!(hud.last_log().unwrap().text, MISSING_ATTACHMENT_MSG);
    }

    #[tokio::test]
    async fn vision_success_replaces_placeholder() {
        let mut capability = MockCapability::new();
        capability
            .expect_analyze_image()
            .times(1)
            .returning(|_, _, _| Ok("A schematic of an arc reactor.".to_string()));

        let mut hud = HudState::new();
        let attachment = Attachment {
            name: "reactor.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        };
        router()
            .dispatch("analyze this", Some(&attachment), &capability, &mut hud)
            .await;

        assert!(hud.logs().iter().all(|l| !l.in_progress));
        assert_eq!(
            hud.last_log().unwrap().text,
            "A schematic of an arc reactor."
        );
    }

    #[tokio::test]
    async fn image_failure_leaves_previous_artifact() {
        let mut capability = MockCapability::new();
        capability
            .expect_generate_image()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("quota exhausted")));

        let mut hud = HudState::new();
        let previous = GeneratedMedia {
            mime_type: "image/png".to_string(),
            data: "AAAA".to_string(),
            prompt: "old prompt".to_string(),
        };
        hud.set_active_media(previous.clone());

        router()
            .dispatch("generate image of a nebula", None, &capability, &mut hud)
            .await;

        assert_eq!(hud.active_media(), Some(&previous));
        assert!(hud.last_log().unwrap().text.contains("Gen-Image error"));
    }

    #[tokio::test]
    async fn chat_success_is_logged_and_forwarded_to_speech() {
        let mut capability = MockCapability::new();
        capability
            .expect_generate_text()
            .times(1)
            .returning(|_, _| Ok("All systems nominal.".to_string()));

        let mut hud = HudState::new();
        let report = router()
            .dispatch("status report", None, &capability, &mut hud)
            .await;

        assert_eq!(report.speak.as_deref(), Some("All systems nominal."));
        assert_eq!(hud.last_log().unwrap().text, "All systems nominal.");
    }

    #[tokio::test]
    async fn chat_failure_appends_generic_fault() {
        let mut capability = MockCapability::new();
        capability
            .expect_generate_text()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("503 from upstream")));

        let mut hud = HudState::new();
        let report = router()
            .dispatch("status report", None, &capability, &mut hud)
            .await;

        assert!(report.speak.is_none());
        assert_eq!(hud.last_log().unwrap().text, CHAT_FAULT_MSG);
        assert!(hud.logs().iter().all(|l| !l.in_progress));
    }
}
