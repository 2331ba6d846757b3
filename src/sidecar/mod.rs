/// 번역/음성 합성 사이드 이펙트 워커
/// BidPlaced 이벤트를 소비해 번역과 음성 URL 생성을 요청한다
/// 전부 best-effort — 실패와 지연은 본 연산에 영향을 주지 않는다
// region:    --- Imports
use crate::events::NegotiationEvent;
use crate::message_broker::{KafkaConsumer, EVENTS_TOPIC};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// endregion: --- Imports

// region:    --- Side Channel Client
/// 외부 제공자 호출 한도 (느린 제공자가 전이를 붙잡지 못하게)
const SIDE_CHANNEL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Deserialize)]
struct SpeakResponse {
    audio_url: String,
}

/// 번역/음성 제공자 HTTP 클라이언트
#[derive(Clone)]
pub struct SideChannelClient {
    http: reqwest::Client,
    translator_url: String,
    speech_url: String,
    target_lang: String,
}

impl SideChannelClient {
    pub fn new(translator_url: String, speech_url: String, target_lang: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(SIDE_CHANNEL_TIMEOUT)
            .build()
            .expect("HTTP client build error");
        Self {
            http,
            translator_url,
            speech_url,
            target_lang,
        }
    }

    /// 환경 변수로부터 생성
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("TRANSLATOR_URL")
                .unwrap_or_else(|_| "http://localhost:8081/translate".to_string()),
            std::env::var("SPEECH_URL")
                .unwrap_or_else(|_| "http://localhost:8082/speak".to_string()),
            std::env::var("TARGET_LANG").unwrap_or_else(|_| "en".to_string()),
        )
    }

    /// (text, source, target) -> translated_text
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, String> {
        let response = self
            .http
            .post(&self.translator_url)
            .json(&json!({ "text": text, "source_lang": source, "target_lang": target }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        let body: TranslateResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.translated_text)
    }

    /// (text, lang) -> audio_url
    async fn synthesize(&self, text: &str, lang: &str) -> Result<String, String> {
        let response = self
            .http
            .post(&self.speech_url)
            .json(&json!({ "text": text, "lang": lang }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        let body: SpeakResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.audio_url)
    }
}
// endregion: --- Side Channel Client

// region:    --- Side Effect Worker
/// 사이드 이펙트 워커
pub struct SideEffectWorker {
    consumer: Arc<KafkaConsumer>,
    client: SideChannelClient,
}

impl SideEffectWorker {
    pub fn new(consumer: Arc<KafkaConsumer>, client: SideChannelClient) -> Self {
        Self { consumer, client }
    }

    /// 소비 루프 시작
    pub async fn start(&self) {
        let client = self.client.clone();
        if let Err(e) = self
            .consumer
            .consume_events(EVENTS_TOPIC, move |event: NegotiationEvent| {
                let client = client.clone();
                Box::pin(async move {
                    Self::process_event(&client, event).await;
                    Ok(())
                })
            })
            .await
        {
            error!("{:<12} --> 이벤트 소비 오류: {:?}", "SideEffect", e);
        }
    }

    /// 이벤트 처리 — 실패는 전부 로그로 끝난다
    async fn process_event(client: &SideChannelClient, event: NegotiationEvent) {
        if let NegotiationEvent::BidPlaced {
            negotiation_id,
            message: Some(message),
            language,
            ..
        } = event
        {
            match client
                .translate(&message, &language, &client.target_lang)
                .await
            {
                Ok(translated) => {
                    info!(
                        "{:<12} --> 번역 완료: negotiation={} -> {}",
                        "SideEffect", negotiation_id, translated
                    );
                    match client.synthesize(&translated, &client.target_lang).await {
                        Ok(audio_url) => info!(
                            "{:<12} --> 음성 합성 완료: negotiation={} url={}",
                            "SideEffect", negotiation_id, audio_url
                        ),
                        Err(e) => warn!(
                            "{:<12} --> 음성 합성 실패 (무시): negotiation={} / {}",
                            "SideEffect", negotiation_id, e
                        ),
                    }
                }
                Err(e) => warn!(
                    "{:<12} --> 번역 실패 (무시): negotiation={} / {}",
                    "SideEffect", negotiation_id, e
                ),
            }
        }
    }
}
// endregion: --- Side Effect Worker
