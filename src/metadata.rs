use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upload-ready title, description and tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

pub fn generate_metadata(topic: &str, duration_seconds: f64, date: NaiveDate) -> VideoMetadata {
    let minutes = (duration_seconds / 60.0).round().max(1.0) as u32;
    let unit = if minutes == 1 { "Minute" } else { "Minutes" };
    VideoMetadata {
        title: format!("{} — Explained in {} {}", topic, minutes, unit),
        description: format!(
            "Quick summary of {}. Generated automatically on {}.",
            topic,
            date.format("%Y-%m-%d")
        ),
        tags: vec![
            topic.to_lowercase(),
            "explainer".to_string(),
            "trending".to_string(),
            "news".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_for_five_minute_video() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let meta = generate_metadata("Mars Rover", 301.2, date);
        assert_eq!(meta.title, "Mars Rover — Explained in 5 Minutes");
        assert_eq!(
            meta.description,
            "Quick summary of Mars Rover. Generated automatically on 2026-03-14."
        );
        assert_eq!(meta.tags, vec!["mars rover", "explainer", "trending", "news"]);
    }

    #[test]
    fn short_videos_round_up_to_one_minute() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(generate_metadata("x", 12.0, date).title.ends_with("in 1 Minute"));
    }
}
