//! Generated content shapes. These double as OpenAI structured-output
//! schemas, so every field is required from the model's point of view.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContentIdea {
    pub title: String,
    /// First-three-seconds hook for the video.
    pub hook: String,
    pub angle: String,
    /// Which brand pillar this idea serves.
    pub pillar: String,
}

/// Wrapper so the model returns a single object, not a bare array.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IdeaBatch {
    pub ideas: Vec<ContentIdea>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    pub description: String,
    pub voiceover: String,
    pub duration_seconds: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoOutline {
    pub title: String,
    pub hook: String,
    pub scenes: Vec<Scene>,
    pub call_to_action: String,
}

impl VideoOutline {
    /// Flatten the outline into the script format render providers take.
    pub fn script(&self) -> String {
        let mut script = format!("{}\n\n", self.hook);
        for (i, scene) in self.scenes.iter().enumerate() {
            script.push_str(&format!(
                "Scene {} ({}s): {}\nVO: {}\n\n",
                i + 1,
                scene.duration_seconds,
                scene.description,
                scene.voiceover
            ));
        }
        script.push_str(&self.call_to_action);
        script
    }

    pub fn total_duration_seconds(&self) -> f32 {
        self.scenes.iter().map(|s| s.duration_seconds).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Shot {
    pub scene_number: u32,
    pub camera_direction: String,
    pub props: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProductionGuide {
    pub shot_list: Vec<Shot>,
    pub equipment: Vec<String>,
    pub editing_notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SeoPackage {
    pub title: String,
    pub description: String,
    pub hashtags: Vec<String>,
    pub keywords: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_renders_scenes_in_order() {
        let outline = VideoOutline {
            title: "Candle care".into(),
            hook: "Stop ruining your candles.".into(),
            scenes: vec![
                Scene {
                    description: "Close-up of tunneled candle".into(),
                    voiceover: "This is tunneling.".into(),
                    duration_seconds: 3.0,
                },
                Scene {
                    description: "Trimming the wick".into(),
                    voiceover: "Trim to a quarter inch.".into(),
                    duration_seconds: 5.0,
                },
            ],
            call_to_action: "Follow for more.".into(),
        };

        let script = outline.script();
        assert!(script.starts_with("Stop ruining your candles."));
        assert!(script.contains("Scene 1 (3s)"));
        assert!(script.contains("Scene 2 (5s)"));
        assert!(script.ends_with("Follow for more."));
        assert_eq!(outline.total_duration_seconds(), 8.0);
    }
}
