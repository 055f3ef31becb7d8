//! Generative backfill
//!
//! Builds the prompt from the user's taste, parses the model's answer into
//! joke candidates and persists generated jokes in bulk.

use std::sync::Arc;
use std::time::Duration;

use crate::data::{Joke, JokeCandidate, JokeStore};
use crate::error::AppError;
use crate::metrics::{GENERATION_DURATION_SECONDS, GENERATION_REQUESTS_TOTAL, JOKES_SAVED_TOTAL};
use crate::providers::TextGenerator;

/// `creator_id` of every generated joke
pub const GENERATED_CREATOR_ID: &str = "gemini";

const MAX_PROMPT_EXAMPLES: usize = 5;
const MAX_HEURISTIC_JOKES: usize = 10;

/// Words that open a setup line in free-form model output.
/// English only.
const SETUP_KEYWORDS: &[&str] = &[
    "why", "what", "how", "when", "where", "did", "do", "does", "is",
];

/// Parameters of one generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub age_range: Option<&'a str>,
    pub scenario: Option<&'a str>,
    pub count: usize,
    pub liked: &'a [Joke],
    pub disliked: &'a [Joke],
}

/// Bridge between the feed and the text provider
pub struct JokeGenerator {
    text: Arc<dyn TextGenerator>,
    store: Arc<dyn JokeStore>,
    timeout: Duration,
}

impl JokeGenerator {
    pub fn new(text: Arc<dyn TextGenerator>, store: Arc<dyn JokeStore>, timeout: Duration) -> Self {
        Self {
            text,
            store,
            timeout,
        }
    }

    /// Ask the provider for `request.count` jokes
    ///
    /// Fails with `AppError::Generation` when the provider fails, times out
    /// or returns nothing that parses as a joke.
    pub async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<Vec<JokeCandidate>, AppError> {
        let prompt = build_prompt(&request);
        let timer = GENERATION_DURATION_SECONDS.start_timer();

        let result = match tokio::time::timeout(self.timeout, self.text.generate_text(&prompt)).await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::Generation(format!(
                "provider did not answer within {}s",
                self.timeout.as_secs()
            ))),
        };
        timer.observe_duration();

        let candidates = result.and_then(|text| {
            let mut candidates = parse_candidates(&text);
            if candidates.is_empty() {
                return Err(AppError::Generation(
                    "response contained no usable jokes".to_string(),
                ));
            }
            candidates.truncate(request.count.max(1));
            Ok(candidates)
        });

        match &candidates {
            Ok(jokes) => {
                GENERATION_REQUESTS_TOTAL
                    .with_label_values(&["success"])
                    .inc();
                tracing::info!(count = jokes.len(), "Jokes generated");
            }
            Err(error) => {
                GENERATION_REQUESTS_TOTAL.with_label_values(&["error"]).inc();
                tracing::warn!(%error, "Joke generation failed");
            }
        }

        candidates
    }

    /// Swap generated jokes for the stored rows they duplicate
    ///
    /// A joke whose setup and punchline already exist takes the stored id,
    /// with its tags merged in, so the id handed to the caller is the one
    /// the save keeps. Repeats within the batch are dropped. A failed
    /// lookup keeps the generated joke.
    pub async fn reuse_stored(&self, jokes: Vec<Joke>) -> Vec<Joke> {
        let mut resolved: Vec<Joke> = Vec::with_capacity(jokes.len());

        for joke in jokes {
            let repeated = resolved
                .iter()
                .any(|j| j.setup == joke.setup && j.punchline == joke.punchline);
            if repeated {
                continue;
            }

            match self.store.find_by_text(&joke.setup, &joke.punchline).await {
                Ok(Some(mut stored)) => {
                    tracing::debug!(joke_id = %stored.id, "Generated joke already stored");
                    merge_tags(&mut stored.scenarios, &joke.scenarios);
                    merge_tags(&mut stored.age_range, &joke.age_range);
                    resolved.push(stored);
                }
                Ok(None) => resolved.push(joke),
                Err(error) => {
                    tracing::warn!(%error, "Duplicate lookup failed; keeping generated joke");
                    resolved.push(joke);
                }
            }
        }

        resolved
    }

    /// Save generated jokes, merging duplicates into existing rows
    ///
    /// Returns how many jokes were written or merged. A failed item is
    /// logged and skipped.
    pub async fn save_batch(&self, jokes: &[Joke]) -> usize {
        let mut saved = 0;

        for joke in jokes {
            match self.store.save_joke(joke).await {
                Ok(outcome) => {
                    saved += 1;
                    let label = if outcome.merged { "merged" } else { "inserted" };
                    JOKES_SAVED_TOTAL.with_label_values(&[label]).inc();
                }
                Err(error) => {
                    JOKES_SAVED_TOTAL.with_label_values(&["error"]).inc();
                    tracing::warn!(joke_id = %joke.id, %error, "Failed to save generated joke");
                }
            }
        }

        tracing::debug!(saved, total = jokes.len(), "Generated jokes saved");
        saved
    }
}

fn merge_tags(target: &mut Vec<String>, incoming: &[String]) {
    for tag in incoming {
        if !target.contains(tag) {
            target.push(tag.clone());
        }
    }
}

/// Tag list for a generated joke. "all" and blank values give no tag.
pub fn tag_list(value: Option<&str>) -> Vec<String> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() && !value.eq_ignore_ascii_case("all") => {
            vec![value.to_string()]
        }
        _ => Vec::new(),
    }
}

/// Turn candidates into jokes with fresh ids, ready to serve and save
pub fn materialize(
    candidates: Vec<JokeCandidate>,
    age_range: Option<&str>,
    scenario: Option<&str>,
) -> Vec<Joke> {
    let scenarios = tag_list(scenario);
    let ages = tag_list(age_range);

    candidates
        .into_iter()
        .map(|candidate| {
            let mut joke = Joke::new(
                uuid::Uuid::new_v4().to_string(),
                candidate.setup.trim(),
                candidate.punchline.trim(),
                GENERATED_CREATOR_ID,
                false,
            );
            joke.content = candidate.content.filter(|c| !c.trim().is_empty());
            joke.emoji = candidate.emoji.filter(|e| !e.trim().is_empty());
            joke.scenarios = scenarios.clone();
            joke.age_range = ages.clone();
            joke
        })
        .collect()
}

fn describe(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() && !value.eq_ignore_ascii_case("all") => value,
        _ => "any",
    }
}

fn push_examples(prompt: &mut String, heading: &str, jokes: &[Joke]) {
    if jokes.is_empty() {
        return;
    }
    prompt.push_str(heading);
    prompt.push('\n');
    for joke in jokes.iter().take(MAX_PROMPT_EXAMPLES) {
        prompt.push_str(&format!("- {} / {}\n", joke.setup.trim(), joke.punchline.trim()));
    }
}

pub fn build_prompt(request: &GenerationRequest<'_>) -> String {
    let mut prompt = format!(
        "Write {count} original, family-friendly jokes for kids.\n\
         Age range: {age}\nScenario: {scenario}\n",
        count = request.count,
        age = describe(request.age_range),
        scenario = describe(request.scenario),
    );

    push_examples(
        &mut prompt,
        "The listener liked these jokes. Write in a similar style:",
        request.liked,
    );
    push_examples(
        &mut prompt,
        "The listener disliked these jokes. Avoid this style:",
        request.disliked,
    );

    prompt.push_str(&format!(
        "Answer with only a JSON array of exactly {} objects with the keys \
         \"joke_setup\", \"joke_punchline\", \"joke_content\" (the full joke as \
         one line) and \"emoji\" (a single emoji).",
        request.count
    ));
    prompt
}

/// Parse the provider's answer
///
/// A JSON array of jokes is preferred. Anything else goes through the
/// line heuristic.
pub fn parse_candidates(text: &str) -> Vec<JokeCandidate> {
    let strict = parse_json_array(text);
    if !strict.is_empty() {
        return strict;
    }

    let recovered = parse_heuristic(text);
    if !recovered.is_empty() {
        tracing::warn!(
            count = recovered.len(),
            "Generation output was not JSON; recovered jokes line by line"
        );
    }
    recovered
}

fn parse_json_array(text: &str) -> Vec<JokeCandidate> {
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    serde_json::from_str::<Vec<JokeCandidate>>(&text[start..=end])
        .map(|candidates| {
            candidates
                .into_iter()
                .filter(|c| !c.setup.trim().is_empty() && !c.punchline.trim().is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Drop list markers and "Setup:"-style labels from a line
fn clean_line(line: &str) -> &str {
    let line = line
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(['.', ')', '-', '*', '•'])
        .trim();

    let labels = ["setup:", "punchline:", "question:", "answer:", "q:", "a:"];
    for label in labels {
        let matched = line
            .get(..label.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(label));
        if matched {
            return line[label.len()..].trim();
        }
    }
    line
}

fn opens_setup(line: &str) -> bool {
    let first = line
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    SETUP_KEYWORDS.contains(&first.as_str())
}

fn parse_heuristic(text: &str) -> Vec<JokeCandidate> {
    let lines: Vec<&str> = text
        .lines()
        .map(clean_line)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .collect();

    let mut jokes = Vec::new();
    let mut index = 0;
    while index + 1 < lines.len() && jokes.len() < MAX_HEURISTIC_JOKES {
        if opens_setup(lines[index]) {
            jokes.push(JokeCandidate {
                setup: lines[index].to_string(),
                punchline: lines[index + 1].to_string(),
                content: None,
                emoji: None,
            });
            index += 2;
        } else {
            index += 1;
        }
    }
    jokes
}
