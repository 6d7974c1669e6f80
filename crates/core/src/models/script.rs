//! Script model
//!
//! A script is an ordered list of lines. Line order is cue order and never
//! changes for the life of a production.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// A named speaking role (a distinct speaker label)
pub type PartId = String;

/// Section key that selects the whole script
pub const ALL_SECTIONS: &str = "All";

/// One line of dialogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLine {
    #[serde(rename = "s")]
    pub speaker: PartId,
    #[serde(rename = "t")]
    pub text: String,
    /// `act.scene.line`
    #[serde(rename = "l", default)]
    pub scene_ref: String,
}

impl ScriptLine {
    pub fn new(
        speaker: impl Into<PartId>,
        text: impl Into<String>,
        scene_ref: impl Into<String>,
    ) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            scene_ref: scene_ref.into(),
        }
    }
}

/// Ordered script lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script {
    lines: Vec<ScriptLine>,
}

impl Script {
    pub fn new(lines: Vec<ScriptLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[ScriptLine] {
        &self.lines
    }

    pub fn line(&self, number: usize) -> Option<&ScriptLine> {
        self.lines.get(number)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of cues per part, in the order each part first speaks
    pub fn cue_counts(&self) -> Vec<(PartId, usize)> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut counts: Vec<(PartId, usize)> = Vec::new();

        for line in &self.lines {
            match index.get(line.speaker.as_str()) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    index.insert(&line.speaker, counts.len());
                    counts.push((line.speaker.clone(), 1));
                }
            }
        }

        counts
    }

    pub fn has_part(&self, part: &str) -> bool {
        self.lines.iter().any(|l| l.speaker == part)
    }

    /// Selectable sections keyed by scene-ref prefix.
    ///
    /// Always contains `"All"`; acts are keyed `"1"` and scenes `"1.2"`.
    pub fn sections(&self) -> BTreeMap<String, String> {
        let mut sections = BTreeMap::new();
        sections.insert(ALL_SECTIONS.to_string(), ALL_SECTIONS.to_string());

        for line in &self.lines {
            let mut parts = line.scene_ref.split('.');
            let (Some(act), Some(scene)) = (parts.next(), parts.next()) else {
                continue;
            };
            if act.is_empty() || scene.is_empty() {
                continue;
            }
            sections.insert(act.to_string(), format!("Act {}", act));
            sections.insert(
                format!("{}.{}", act, scene),
                format!("Act {} Scene {}", act, scene),
            );
        }

        sections
    }

    /// Lines belonging to a section key from [`Script::sections`]
    pub fn in_section(&self, section: &str) -> Script {
        if section == ALL_SECTIONS {
            return self.clone();
        }

        let prefix = format!("{}.", section);
        Script::new(
            self.lines
                .iter()
                .filter(|l| l.scene_ref == section || l.scene_ref.starts_with(&prefix))
                .cloned()
                .collect(),
        )
    }
}

impl From<Vec<ScriptLine>> for Script {
    fn from(lines: Vec<ScriptLine>) -> Self {
        Self::new(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Script {
        Script::new(vec![
            ScriptLine::new("First Witch", "When shall we three meet again", "1.1.1"),
            ScriptLine::new("Second Witch", "When the hurlyburly's done", "1.1.3"),
            ScriptLine::new("First Witch", "Where the place?", "1.1.6"),
            ScriptLine::new("Duncan", "What bloody man is that?", "1.2.1"),
            ScriptLine::new("Macbeth", "So foul and fair a day", "1.3.38"),
            ScriptLine::new("Macbeth", "Is this a dagger", "2.1.33"),
        ])
    }

    #[test]
    fn test_cue_counts_in_encounter_order() {
        let counts = sample().cue_counts();
        assert_eq!(
            counts,
            vec![
                ("First Witch".to_string(), 2),
                ("Second Witch".to_string(), 1),
                ("Duncan".to_string(), 1),
                ("Macbeth".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_sections() {
        let sections = sample().sections();
        assert_eq!(sections.get("All").map(String::as_str), Some("All"));
        assert_eq!(sections.get("1").map(String::as_str), Some("Act 1"));
        assert_eq!(sections.get("1.2").map(String::as_str), Some("Act 1 Scene 2"));
        assert_eq!(sections.get("2.1").map(String::as_str), Some("Act 2 Scene 1"));
        assert_eq!(sections.len(), 7);
    }

    #[test]
    fn test_in_section() {
        let script = sample();
        assert_eq!(script.in_section("All").len(), 6);
        assert_eq!(script.in_section("1").len(), 5);
        assert_eq!(script.in_section("1.1").len(), 3);
        assert_eq!(script.in_section("2").len(), 1);
        // "1" must not match act 10
        let extra = Script::new(vec![ScriptLine::new("A", "x", "10.1.1")]);
        assert!(extra.in_section("1").is_empty());
    }

    #[test]
    fn test_wire_format() {
        let json = r#"[{"s":"Puck","t":"Lord, what fools","l":"3.2.115"}]"#;
        let script: Script = serde_json::from_str(json).unwrap();
        assert_eq!(script.line(0).unwrap().speaker, "Puck");
        assert_eq!(serde_json::to_string(&script).unwrap(), json);
    }
}
