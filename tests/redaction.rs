//! Journal text never leaves the scorer: incidents, intervention records and
//! notifications carry severity and concern categories only.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use lifeline::dispatch::{ChannelSender, Notification, SendError};
use lifeline::responders::{Channel, ContactPoint, Responder};
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Mutex;

use common::{request, roster};

const CRISIS_PHRASES: &[&str] = &[
    "I want to kill myself",
    "I feel suicidal",
    "I keep cutting myself",
    "there is no reason to live",
    "I can't go on",
    "I have a plan",
];

/// Serializes every notification it is asked to send.
#[derive(Default)]
struct CapturingSender {
    payloads: Mutex<Vec<String>>,
}

#[async_trait]
impl ChannelSender for CapturingSender {
    async fn send(
        &self,
        _responder: &Responder,
        _contact: &ContactPoint,
        notification: &Notification,
    ) -> Result<String, SendError> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| SendError::Transport(e.to_string()))?;
        self.payloads.lock().unwrap().push(payload);
        Ok("captured".into())
    }

    fn name(&self) -> &str {
        "capturing"
    }
}

fn random_token(rng: &mut impl Rng) -> String {
    let body: String = rng
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("zq{}", body.to_lowercase())
}

#[tokio::test(start_paused = true)]
async fn test_no_journal_text_in_any_output() {
    let sender = Arc::new(CapturingSender::default());
    let config = lifeline::config::LifelineConfig {
        responders: roster(),
        ..Default::default()
    };
    let mut builder = lifeline::engine::Engine::builder(config)
        .with_clock(Arc::new(lifeline::clock::TokioClock::new()));
    for channel in Channel::ALL {
        builder = builder.with_sender(channel, sender.clone());
    }
    let engine = builder.build().unwrap();
    let mut rng = rand::thread_rng();

    for _ in 0..25 {
        let count = rng.gen_range(3..10);
        let tokens: Vec<String> = (0..count).map(|_| random_token(&mut rng)).collect();
        let phrase = *CRISIS_PHRASES.choose(&mut rng).unwrap();
        let mut words: Vec<String> = tokens.clone();
        let at = rng.gen_range(0..=words.len());
        words.insert(at, phrase.to_string());
        let text = words.join(" ");

        let submission = engine.submit(request(&text)).await.unwrap();
        let Some(id) = submission.incident_id else {
            continue;
        };

        tokio::time::sleep(std::time::Duration::from_secs(rng.gen_range(0..400))).await;
        engine.resolve(id).await.unwrap();
        engine.wait(id).await.unwrap();

        let incident = serde_json::to_string(&engine.incident_status(id).await.unwrap()).unwrap();
        let record = serde_json::to_string(&engine.intervention_record(id).await.unwrap()).unwrap();
        let returned = serde_json::to_string(&submission).unwrap();
        let payloads = sender.payloads.lock().unwrap().join("\n");

        for output in [&incident, &record, &returned, &payloads] {
            for token in &tokens {
                assert!(!output.contains(token.as_str()), "token {token} leaked");
            }
            assert!(!output.contains(phrase), "phrase {phrase:?} leaked");
        }
    }
}

#[test]
fn test_request_debug_never_shows_text() {
    let mut rng = rand::thread_rng();
    let token = random_token(&mut rng);
    let shown = format!("{:?}", request(&format!("I feel suicidal {token}")));
    assert!(!shown.contains(&token));
    assert!(!shown.contains("suicidal"));
}
