//! Templated narration script for a topic.

use rand::Rng;
use rand::seq::SliceRandom;

const KEY_POINTS: usize = 3;

fn segments() -> Vec<String> {
    (1..=KEY_POINTS)
        .map(|i| {
            format!(
                "Key point {}: What happened and why it matters. \
                 Here's the background, the main story, and what comes next. \
                 It's fascinating how these trends shape our world.",
                i
            )
        })
        .collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Intro, key points and outro, padded with repeated key points until the
/// script reaches `min_words`.
pub fn generate_script<R: Rng + ?Sized>(topic: &str, min_words: usize, rng: &mut R) -> String {
    let intro = format!(
        "Welcome! Today we're talking about {}. Let's break it down in a few minutes.",
        topic
    );
    let outro = "Thanks for watching! Subscribe for more quick insights like this every day.";
    let segments = segments();

    let mut script = format!("{}\n\n{}\n\n{}", intro, segments.join("\n\n"), outro);
    let mut words = word_count(&script);
    while words < min_words {
        let Some(extra) = segments.choose(rng) else {
            break;
        };
        script.push(' ');
        script.push_str(extra);
        words += word_count(extra);
    }
    script
}
